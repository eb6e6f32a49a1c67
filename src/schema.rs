//! Schema document loading.
//!
//! The schema document declares the databases, tables and columns the run
//! needs, plus the named schedules used for grouping. Mapping order in the
//! YAML is preserved: column order decides the canonical column strings
//! compared against live tables, and schedule order decides enumeration
//! order.

use crate::database::ColumnSpec;
use crate::error::{CommuteError, Result};
use crate::models::{Schedule, ScheduleWindow};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// Mapping that keeps document order and rejects duplicate keys
#[derive(Debug, Clone, PartialEq)]
struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a mapping")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(OrderedMap::default())
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(existing, _)| *existing == key) {
                        return Err(de::Error::custom(format!("duplicate key '{key}'")));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    databases: OrderedMap<RawDatabase>,
    #[serde(default)]
    schedules: OrderedMap<RawSchedule>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(default)]
    tables: OrderedMap<OrderedMap<ColumnDef>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchedule {
    start: Option<u32>,
    end: Option<u32>,
}

/// A declared column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub options: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<(String, ColumnDef)>,
}

impl TableSchema {
    /// Validated columns in declared order; an empty table is rejected
    pub fn column_specs(&self) -> Result<Vec<ColumnSpec>> {
        if self.columns.is_empty() {
            return Err(CommuteError::invalid_schema(
                &self.name,
                "table declares no columns",
            ));
        }
        self.columns
            .iter()
            .map(|(name, def)| ColumnSpec::new(name, &def.column_type, def.options.as_deref()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: Vec<TableSchema>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Loaded and checked schema document, immutable for a run
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    databases: Vec<DatabaseSchema>,
    schedules: Vec<Schedule>,
}

impl SchemaDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CommuteError::schema_load(path, e.to_string()))?;
        let document = Self::from_yaml(&text).map_err(|e| match e {
            CommuteError::Configuration { message } => CommuteError::schema_load(path, message),
            other => other,
        })?;
        debug!(
            path = %path.display(),
            databases = document.databases.len(),
            schedules = document.schedules.len(),
            "loaded schema document"
        );
        Ok(document)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawDocument = serde_yaml::from_str(text)
            .map_err(|e| CommuteError::configuration(format!("malformed schema document: {e}")))?;

        let databases = raw
            .databases
            .0
            .into_iter()
            .map(|(name, database)| {
                let tables = database
                    .tables
                    .0
                    .into_iter()
                    .map(|(name, columns)| {
                        if columns.0.is_empty() {
                            return Err(CommuteError::invalid_schema(
                                name,
                                "table declares no columns",
                            ));
                        }
                        Ok(TableSchema {
                            name,
                            columns: columns.0,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(DatabaseSchema { name, tables })
            })
            .collect::<Result<Vec<_>>>()?;

        let schedules = raw
            .schedules
            .0
            .into_iter()
            .map(|(name, schedule)| parse_schedule(name, schedule))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            databases,
            schedules,
        })
    }

    pub fn databases(&self) -> &[DatabaseSchema] {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseSchema> {
        self.databases.iter().find(|database| database.name == name)
    }

    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }
}

fn parse_schedule(name: String, raw: RawSchedule) -> Result<Schedule> {
    let window = match (raw.start, raw.end) {
        (None, None) => None,
        (Some(start), Some(end)) => Some(ScheduleWindow::new(start, end).ok_or_else(|| {
            CommuteError::configuration(format!(
                "schedule '{name}' has an invalid window {start}-{end} (hours 0-23, start <= end)"
            ))
        })?),
        _ => {
            return Err(CommuteError::configuration(format!(
                "schedule '{name}' must declare both start and end, or neither"
            )));
        }
    };
    Ok(Schedule::new(name, window))
}
