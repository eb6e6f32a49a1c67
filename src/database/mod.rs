//! Database handle abstraction and statement building.
//!
//! All SQL issued by the processor is described by the closed [`Statement`]
//! enum. A statement renders itself to SQL text plus bound parameters, so
//! every data-derived value travels as a parameter. Only structural names,
//! wrapped in a validated [`Identifier`], are ever interpolated into the text.
//!
//! Backends implement [`Database`]:
//! - [`mysql::MySqlDatabase`] - auto-committing MySQL connection
//! - [`memory::MemoryDatabase`] - in-process engine with the same semantics

pub mod memory;
pub mod mysql;

use crate::error::{CommuteError, Result};
use crate::fingerprint::Fingerprint;
use crate::processor::query::FilterExpression;
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// UTC instant converted by [`Statement::ConvertTimeZone`]
pub const TIME_ZONE_CHECK_INSTANT: &str = "2000-01-01 00:00:00";

/// MySQL limit for database, table and column names
const MAX_IDENTIFIER_LENGTH: usize = 64;

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static COLUMN_TEXT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_(), ]*$").expect("valid column text regex"));

/// Database, table or column name that is safe to interpolate into SQL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.len() > MAX_IDENTIFIER_LENGTH {
            return Err(CommuteError::invalid_identifier(
                value,
                format!("longer than {MAX_IDENTIFIER_LENGTH} characters"),
            ));
        }
        if !IDENTIFIER_PATTERN.is_match(&value) {
            return Err(CommuteError::invalid_identifier(
                value,
                "only ASCII letters, digits and '_' are allowed, and it must not start with a digit",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value exchanged with the database
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Numeric view of the value; text is parsed when it holds a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Float(v) => Some(*v),
            SqlValue::Text(text) => text.trim().parse().ok(),
            SqlValue::Null | SqlValue::DateTime(_) => None,
        }
    }

    /// Text view of the value, as MySQL would print it
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Text(text) => Some(text.clone()),
            SqlValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Timestamp view; text must be `YYYY-MM-DD HH:MM:SS[.fraction]`
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(dt) => Some(*dt),
            SqlValue::Text(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

/// A field value in an upsert
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Number(f64),
    Text(String),
    /// Evaluated by the engine rather than bound as a literal
    Fingerprint(Fingerprint),
}

impl FieldValue {
    /// Render the SQL fragment for this value, pushing its parameters
    pub fn render(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            FieldValue::Fingerprint(fingerprint) => fingerprint.sql_expression(params),
            other => {
                params.push(other.to_sql_value());
                "?".to_string()
            }
        }
    }

    /// The value as it ends up stored
    pub fn to_sql_value(&self) -> SqlValue {
        match self {
            FieldValue::Null => SqlValue::Null,
            FieldValue::Integer(v) => SqlValue::Int(*v),
            FieldValue::Number(v) => SqlValue::Float(*v),
            FieldValue::Text(text) => SqlValue::Text(text.clone()),
            FieldValue::Fingerprint(fingerprint) => SqlValue::Text(fingerprint.digest()),
        }
    }
}

/// A declared column, ready for a `CREATE TABLE` column clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: Identifier,
    pub column_type: String,
    pub options: String,
}

impl ColumnSpec {
    pub fn new(name: &str, column_type: &str, options: Option<&str>) -> Result<Self> {
        let name = Identifier::new(name)?;
        let options = options.unwrap_or_default();

        if column_type.trim().is_empty() {
            return Err(CommuteError::invalid_identifier(
                column_type,
                format!("column {name} has an empty type"),
            ));
        }
        for text in [column_type, options] {
            if !COLUMN_TEXT_PATTERN.is_match(text) {
                return Err(CommuteError::invalid_identifier(
                    text,
                    format!("column {name} type/options may only contain letters, digits, '_', '(', ')', ',' and spaces"),
                ));
            }
        }

        Ok(Self {
            name,
            column_type: column_type.to_string(),
            options: options.to_string(),
        })
    }

    /// `"<name> <type> <options>"`, the trailing space kept when there are
    /// no options
    pub fn definition(&self) -> String {
        format!("{} {} {}", self.name, self.column_type, self.options)
    }

    pub fn is_primary_key(&self) -> bool {
        self.options.contains("PRIMARY KEY")
    }
}

/// One row of `DESCRIBE` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub field: String,
    pub column_type: String,
    pub key: String,
}

impl LiveColumn {
    /// Read a live table descriptor from a `DESCRIBE` result set
    pub fn from_describe(result: &ResultSet) -> Result<Vec<Self>> {
        (0..result.rows.len())
            .map(|row| {
                let text = |column: &str| -> Result<String> {
                    result.value(row, column).and_then(SqlValue::as_text).ok_or_else(|| {
                        CommuteError::database("DESCRIBE", format!("row {row} has no {column} value"))
                    })
                };
                Ok(Self {
                    field: text("Field")?,
                    column_type: text("Type")?,
                    key: result
                        .value(row, "Key")
                        .and_then(SqlValue::as_text)
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Comparable form, same shape as [`ColumnSpec::definition`]
    pub fn definition(&self) -> String {
        format!(
            "{} {} {}",
            self.field,
            self.column_type,
            self.key.replace("PRI", "PRIMARY KEY")
        )
    }
}

/// Every statement the processor can issue
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    ShowDatabases,
    CreateDatabase(Identifier),
    UseDatabase(Identifier),
    ShowTables,
    CreateTable {
        table: Identifier,
        columns: Vec<ColumnSpec>,
    },
    Describe(Identifier),
    /// Convert [`TIME_ZONE_CHECK_INSTANT`] from UTC into the zone; NULL when
    /// the engine cannot resolve the zone name
    ConvertTimeZone(Tz),
    SelectSamples {
        table: Identifier,
        column: Identifier,
        filter: FilterExpression,
    },
    Upsert {
        table: Identifier,
        key: Identifier,
        fields: Vec<(Identifier, FieldValue)>,
    },
}

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn render(&self) -> RenderedStatement {
        let mut params = Vec::new();
        let sql = match self {
            Statement::ShowDatabases => "SHOW DATABASES".to_string(),
            Statement::CreateDatabase(name) => format!("CREATE DATABASE {name}"),
            Statement::UseDatabase(name) => format!("USE {name}"),
            Statement::ShowTables => "SHOW TABLES".to_string(),
            Statement::CreateTable { table, columns } => {
                let clause = columns
                    .iter()
                    .map(ColumnSpec::definition)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("CREATE TABLE {table} ({clause})")
            }
            Statement::Describe(table) => format!("DESCRIBE {table}"),
            Statement::ConvertTimeZone(zone) => {
                params.push(SqlValue::Text(zone.name().to_string()));
                format!("SELECT CONVERT_TZ('{TIME_ZONE_CHECK_INSTANT}', '+00:00', ?)")
            }
            Statement::SelectSamples {
                table,
                column,
                filter,
            } => {
                let predicate = filter.to_sql(&mut params);
                format!("SELECT {column} FROM {table} WHERE {predicate}")
            }
            Statement::Upsert { table, key, fields } => {
                let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
                let values: Vec<String> = fields
                    .iter()
                    .map(|(_, value)| value.render(&mut params))
                    .collect();
                let mut updates: Vec<String> = fields
                    .iter()
                    .filter(|(name, _)| name != key)
                    .map(|(name, _)| format!("{name} = VALUES({name})"))
                    .collect();
                if updates.is_empty() {
                    updates.push(format!("{key} = {key}"));
                }
                format!(
                    "INSERT INTO {table} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
                    names.join(", "),
                    values.join(", "),
                    updates.join(", ")
                )
            }
        };
        RenderedStatement { sql, params }
    }

    /// Short statement kind for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::ShowDatabases => "SHOW DATABASES",
            Statement::CreateDatabase(_) => "CREATE DATABASE",
            Statement::UseDatabase(_) => "USE",
            Statement::ShowTables => "SHOW TABLES",
            Statement::CreateTable { .. } => "CREATE TABLE",
            Statement::Describe(_) => "DESCRIBE",
            Statement::ConvertTimeZone(_) | Statement::SelectSamples { .. } => "SELECT",
            Statement::Upsert { .. } => "INSERT",
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render().sql)
    }
}

/// Rows returned by a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub affected_rows: u64,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: 0,
        }
    }

    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Text of the first column of every row (`SHOW DATABASES`, `SHOW TABLES`)
    pub fn first_column_texts(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_text))
            .collect()
    }
}

/// Execute-and-fetch access to a relational store
pub trait Database {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet>;
}

impl<D: Database + ?Sized> Database for &mut D {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet> {
        (**self).execute(statement)
    }
}

impl<D: Database + ?Sized> Database for Box<D> {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet> {
        (**self).execute(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(Identifier::new("traffic").is_ok());
        assert!(Identifier::new("stats_2020").is_ok());
        assert!(Identifier::new("_hidden").is_ok());

        assert!(Identifier::new("").is_err());
        assert!(Identifier::new("2fast").is_err());
        assert!(Identifier::new("drop table").is_err());
        assert!(Identifier::new("x; DROP DATABASE traffic").is_err());
        assert!(Identifier::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_column_definition_keeps_trailing_space() {
        let column = ColumnSpec::new("duration_in_traffic", "INT", None).unwrap();
        assert_eq!(column.definition(), "duration_in_traffic INT ");

        let key = ColumnSpec::new("id", "CHAR(64)", Some("PRIMARY KEY")).unwrap();
        assert_eq!(key.definition(), "id CHAR(64) PRIMARY KEY");
        assert!(key.is_primary_key());
    }

    #[test]
    fn test_column_text_is_allow_listed() {
        assert!(ColumnSpec::new("price", "DECIMAL(10, 2)", Some("NOT NULL")).is_ok());
        assert!(ColumnSpec::new("name", "VARCHAR(20)", Some("DEFAULT 'x'")).is_err());
        assert!(ColumnSpec::new("name", "INT; DROP TABLE x", None).is_err());
        assert!(ColumnSpec::new("name", "  ", None).is_err());
    }

    #[test]
    fn test_live_column_maps_primary_key_marker() {
        let live = LiveColumn {
            field: "id".to_string(),
            column_type: "char(64)".to_string(),
            key: "PRI".to_string(),
        };
        assert_eq!(live.definition(), "id char(64) PRIMARY KEY");

        let plain = LiveColumn {
            field: "mean".to_string(),
            column_type: "double".to_string(),
            key: String::new(),
        };
        assert_eq!(plain.definition(), "mean double ");
    }

    #[test]
    fn test_live_columns_from_describe() {
        let result = ResultSet::new(
            vec!["Field".into(), "Type".into(), "Null".into(), "Key".into()],
            vec![
                vec![
                    SqlValue::Text("id".into()),
                    SqlValue::Text("char(64)".into()),
                    SqlValue::Text("NO".into()),
                    SqlValue::Text("PRI".into()),
                ],
                vec![
                    SqlValue::Text("mean".into()),
                    SqlValue::Text("double".into()),
                    SqlValue::Text("YES".into()),
                    SqlValue::Null,
                ],
            ],
        );

        let live = LiveColumn::from_describe(&result).unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[1].key, "");
    }

    #[test]
    fn test_render_create_table() {
        let statement = Statement::CreateTable {
            table: Identifier::new("samples").unwrap(),
            columns: vec![
                ColumnSpec::new("timestamp", "DATETIME", None).unwrap(),
                ColumnSpec::new("duration_in_traffic", "INT", None).unwrap(),
            ],
        };
        let rendered = statement.render();
        assert_eq!(
            rendered.sql,
            "CREATE TABLE samples (timestamp DATETIME , duration_in_traffic INT )"
        );
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn test_render_upsert_binds_values() {
        let statement = Statement::Upsert {
            table: Identifier::new("stats").unwrap(),
            key: Identifier::new("id").unwrap(),
            fields: vec![
                (
                    Identifier::new("id").unwrap(),
                    FieldValue::Fingerprint(Fingerprint::new(["a", "b"])),
                ),
                (Identifier::new("mean").unwrap(), FieldValue::Number(10.0)),
                (
                    Identifier::new("month").unwrap(),
                    FieldValue::Text("O'Neil".into()),
                ),
            ],
        };
        let rendered = statement.render();

        assert_eq!(
            rendered.sql,
            "INSERT INTO stats (id, mean, month) VALUES (SHA2(CONCAT_WS('|', ?, ?), 256), ?, ?) \
             ON DUPLICATE KEY UPDATE mean = VALUES(mean), month = VALUES(month)"
        );
        assert_eq!(
            rendered.params,
            vec![
                SqlValue::Text("a".into()),
                SqlValue::Text("b".into()),
                SqlValue::Float(10.0),
                SqlValue::Text("O'Neil".into()),
            ]
        );
        assert!(!rendered.sql.contains("O'Neil"));
    }

    #[test]
    fn test_render_time_zone_conversion() {
        let rendered = Statement::ConvertTimeZone(chrono_tz::Europe::London).render();
        assert_eq!(
            rendered.sql,
            "SELECT CONVERT_TZ('2000-01-01 00:00:00', '+00:00', ?)"
        );
        assert_eq!(rendered.params, vec![SqlValue::Text("Europe/London".into())]);
    }

    #[test]
    fn test_sql_value_views() {
        assert_eq!(SqlValue::Int(10).as_f64(), Some(10.0));
        assert_eq!(SqlValue::Text(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(SqlValue::Text("slow".into()).as_f64(), None);
        assert_eq!(SqlValue::Null.as_f64(), None);

        let parsed = SqlValue::Text("2020-01-06 12:30:00".into()).as_datetime();
        assert!(parsed.is_some());
        assert_eq!(
            SqlValue::DateTime(parsed.unwrap()).as_text().unwrap(),
            "2020-01-06 12:30:00"
        );
    }
}
