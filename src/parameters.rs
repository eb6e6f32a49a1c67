//! Hierarchical parameter retrieval.
//!
//! Runtime parameters live under a path prefix such as `/commute`:
//!
//! ```text
//! /commute/database/host
//! /commute/database/stats/table
//! /commute/config/routes
//! ```
//!
//! A [`ParameterSource`] returns every parameter below a path. Two sources
//! are provided: process environment variables (`COMMUTE_DATABASE_HOST`) and
//! a JSON file mapping full parameter names to values.

use crate::constants::{
    CONFIG_CATEGORY, DATABASE_CATEGORY, DEFAULT_MYSQL_PORT, REQUIRED_DATABASE_KEYS,
    ROUTES_PARAMETER,
};
use crate::error::{CommuteError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// Lookup of parameters by hierarchical path
pub trait ParameterSource {
    /// Every parameter whose name starts with `path/`
    fn parameters_by_path(&self, path: &str) -> Result<Vec<Parameter>>;
}

fn under<'a>(name: &'a str, path: &str) -> Option<&'a str> {
    name.strip_prefix(path.trim_end_matches('/'))?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

/// Parameters taken from environment variables.
///
/// `/commute/database/stats/table` is read from
/// `COMMUTE_DATABASE_STATS_TABLE`. Since `/` and `_` both map to `_`, a
/// variable is turned back into a name by matching it against the keys the
/// processor asks for.
#[derive(Debug, Clone, Default)]
pub struct EnvParameterSource {
    vars: BTreeMap<String, String>,
}

impl EnvParameterSource {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Environment variable name for a parameter name
    pub fn variable_name(name: &str) -> String {
        name.trim_matches('/')
            .split('/')
            .map(str::to_uppercase)
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl ParameterSource for EnvParameterSource {
    fn parameters_by_path(&self, path: &str) -> Result<Vec<Parameter>> {
        let path = path.trim_end_matches('/');
        let candidates: Vec<String> = if path.ends_with(DATABASE_CATEGORY) {
            REQUIRED_DATABASE_KEYS
                .iter()
                .copied()
                .chain(["port"])
                .map(|key| format!("{path}/{key}"))
                .collect()
        } else if path.ends_with(CONFIG_CATEGORY) {
            vec![format!("{path}/{ROUTES_PARAMETER}")]
        } else {
            Vec::new()
        };

        Ok(candidates
            .into_iter()
            .filter_map(|name| {
                self.vars
                    .get(&Self::variable_name(&name))
                    .map(|value| Parameter {
                        name,
                        value: value.clone(),
                    })
            })
            .collect())
    }
}

/// Parameters read from a JSON object of `{"<full name>": <value>}`
#[derive(Debug, Clone)]
pub struct FileParameterSource {
    values: BTreeMap<String, String>,
}

impl FileParameterSource {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CommuteError::configuration(format!(
                "cannot read parameter file {}: {e}",
                path.display()
            ))
        })?;
        let document: BTreeMap<String, serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| {
                CommuteError::configuration(format!(
                    "malformed parameter file {}: {e}",
                    path.display()
                ))
            })?;

        let values = document
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();

        debug!(path = %path.display(), "loaded parameter file");
        Ok(Self { values })
    }
}

impl ParameterSource for FileParameterSource {
    fn parameters_by_path(&self, path: &str) -> Result<Vec<Parameter>> {
        Ok(self
            .values
            .iter()
            .filter(|(name, _)| under(name, path).is_some())
            .map(|(name, value)| Parameter {
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }
}

/// MySQL connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

/// Parameters resolved for one run, keyed relative to the category
/// (`host`, `stats/table`, ...)
#[derive(Clone, PartialEq)]
pub struct Parameters {
    database: BTreeMap<String, String>,
    routes: Option<serde_json::Value>,
}

impl Parameters {
    /// Fetch and check the parameters under `prefix`
    pub fn load<S: ParameterSource + ?Sized>(source: &S, prefix: &str) -> Result<Self> {
        let prefix = prefix.trim_end_matches('/');

        let database_path = format!("{prefix}/{DATABASE_CATEGORY}");
        let database: BTreeMap<String, String> = source
            .parameters_by_path(&database_path)?
            .into_iter()
            .filter_map(|parameter| {
                under(&parameter.name, &database_path)
                    .map(str::to_string)
                    .map(|key| (key, parameter.value))
            })
            .collect();

        let missing: Vec<&str> = REQUIRED_DATABASE_KEYS
            .iter()
            .copied()
            .filter(|key| !database.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(CommuteError::configuration(format!(
                "missing parameters under {database_path}: {}",
                missing.join(", ")
            )));
        }

        let config_path = format!("{prefix}/{CONFIG_CATEGORY}");
        let routes = source
            .parameters_by_path(&config_path)?
            .into_iter()
            .find(|parameter| under(&parameter.name, &config_path) == Some(ROUTES_PARAMETER))
            .map(|parameter| {
                serde_json::from_str::<serde_json::Value>(&parameter.value).map_err(|e| {
                    CommuteError::configuration(format!("malformed routes JSON in {}: {e}", parameter.name))
                })
            })
            .transpose()?;

        let parameters = Self { database, routes };
        info!(
            prefix,
            routes = parameters.route_count(),
            "parameters: loaded"
        );
        Ok(parameters)
    }

    /// A database parameter by relative key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.database.get(key).map(String::as_str)
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| CommuteError::configuration(format!("missing parameter '{key}'")))
    }

    pub fn database_name(&self) -> Result<&str> {
        self.required("name")
    }

    pub fn samples_table(&self) -> Result<&str> {
        self.required("table")
    }

    pub fn stats_table(&self) -> Result<&str> {
        self.required("stats/table")
    }

    pub fn connection(&self) -> Result<ConnectionParameters> {
        let port = match self.get("port") {
            Some(port) => port.trim().parse().map_err(|_| {
                CommuteError::configuration(format!("invalid database port '{port}'"))
            })?,
            None => DEFAULT_MYSQL_PORT,
        };
        Ok(ConnectionParameters {
            host: self.required("host")?.to_string(),
            port,
            user: self.required("user")?.to_string(),
            pass: self.required("pass")?.to_string(),
        })
    }

    pub fn routes(&self) -> Option<&serde_json::Value> {
        self.routes.as_ref()
    }

    /// Entries in the routes document: array length, object size, else 0/1
    pub fn route_count(&self) -> usize {
        match &self.routes {
            None => 0,
            Some(serde_json::Value::Array(items)) => items.len(),
            Some(serde_json::Value::Object(entries)) => entries.len(),
            Some(serde_json::Value::Null) => 0,
            Some(_) => 1,
        }
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let database: BTreeMap<&str, &str> = self
            .database
            .iter()
            .map(|(key, value)| {
                let shown = if key == "pass" { "***" } else { value.as_str() };
                (key.as_str(), shown)
            })
            .collect();
        f.debug_struct("Parameters")
            .field("database", &database)
            .field("routes", &self.route_count())
            .finish()
    }
}
