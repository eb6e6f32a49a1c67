//! In-process database engine.
//!
//! Interprets [`Statement`] values directly instead of parsing SQL. It keeps
//! the observable behavior the processor relies on: named databases holding
//! tables, `DESCRIBE` output with a `PRI` key marker, primary-key upserts and
//! group predicate evaluation against a timestamp column. Every executed
//! statement is recorded for inspection.

use super::{
    ColumnSpec, Database, FieldValue, Identifier, LiveColumn, ResultSet, SqlValue, Statement,
    TIME_ZONE_CHECK_INSTANT,
};
use crate::error::{CommuteError, Result};
use chrono::{NaiveDateTime, TimeZone};
use std::collections::BTreeMap;
use tracing::trace;

/// A stored row, keyed by column name
pub type Row = BTreeMap<String, SqlValue>;

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<LiveColumn>,
    rows: Vec<Row>,
}

impl Table {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.field == name)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    databases: BTreeMap<String, BTreeMap<String, Table>>,
    active: Option<String>,
    executed: Vec<Statement>,
    upserts: usize,
    fail_upserts_after: Option<usize>,
    missing_time_zone_tables: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with an exact live descriptor, bypassing `CREATE TABLE`
    pub fn create_table_with_columns(
        &mut self,
        database: &str,
        table: &str,
        columns: Vec<LiveColumn>,
    ) {
        self.databases
            .entry(database.to_string())
            .or_default()
            .insert(
                table.to_string(),
                Table {
                    columns,
                    rows: Vec::new(),
                },
            );
    }

    /// Append a row without recording a statement
    pub fn insert_row<I, K>(&mut self, database: &str, table: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        let table = self.table_mut(database, table)?;
        let row: Row = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if let Some(unknown) = row.keys().find(|name| !table.has_column(name)) {
            return Err(CommuteError::database(
                "INSERT",
                format!("unknown column '{unknown}'"),
            ));
        }
        table.rows.push(row);
        Ok(())
    }

    /// Rows of a table, in insertion order
    pub fn rows(&self, database: &str, table: &str) -> Option<&[Row]> {
        self.databases
            .get(database)?
            .get(table)
            .map(|table| table.rows.as_slice())
    }

    pub fn has_database(&self, database: &str) -> bool {
        self.databases.contains_key(database)
    }

    /// Every statement executed so far, oldest first
    pub fn executed(&self) -> &[Statement] {
        &self.executed
    }

    /// Make every upsert after the first `count` fail
    pub fn fail_upserts_after(&mut self, count: usize) {
        self.fail_upserts_after = Some(count);
    }

    /// Answer named-zone conversions with NULL, like a server whose time
    /// zone tables were never loaded
    pub fn without_time_zone_tables(&mut self) {
        self.missing_time_zone_tables = true;
    }

    fn table_mut(&mut self, database: &str, table: &str) -> Result<&mut Table> {
        self.databases
            .get_mut(database)
            .and_then(|tables| tables.get_mut(table))
            .ok_or_else(|| {
                CommuteError::database("lookup", format!("table '{database}.{table}' doesn't exist"))
            })
    }

    fn active_tables(&mut self, statement: &Statement) -> Result<&mut BTreeMap<String, Table>> {
        let name = self
            .active
            .as_ref()
            .ok_or_else(|| CommuteError::database(statement.kind(), "no database selected"))?;
        self.databases
            .get_mut(name)
            .ok_or_else(|| CommuteError::database(statement.kind(), format!("unknown database '{name}'")))
    }

    fn active_table(&mut self, statement: &Statement, table: &Identifier) -> Result<&mut Table> {
        let database = self.active.clone().unwrap_or_default();
        self.active_tables(statement)?
            .get_mut(table.as_str())
            .ok_or_else(|| {
                CommuteError::database(
                    statement.kind(),
                    format!("table '{database}.{table}' doesn't exist"),
                )
            })
    }

    fn apply(&mut self, statement: &Statement) -> Result<ResultSet> {
        match statement {
            Statement::ShowDatabases => Ok(ResultSet::new(
                vec!["Database".to_string()],
                self.databases
                    .keys()
                    .map(|name| vec![SqlValue::Text(name.clone())])
                    .collect(),
            )),

            Statement::CreateDatabase(name) => {
                if self.databases.contains_key(name.as_str()) {
                    return Err(CommuteError::database(
                        statement.kind(),
                        format!("database '{name}' exists"),
                    ));
                }
                self.databases.insert(name.to_string(), BTreeMap::new());
                Ok(ResultSet::affected(1))
            }

            Statement::UseDatabase(name) => {
                if !self.databases.contains_key(name.as_str()) {
                    return Err(CommuteError::database(
                        statement.kind(),
                        format!("unknown database '{name}'"),
                    ));
                }
                self.active = Some(name.to_string());
                Ok(ResultSet::default())
            }

            Statement::ShowTables => {
                let database = self.active.clone().unwrap_or_default();
                let names: Vec<Vec<SqlValue>> = self
                    .active_tables(statement)?
                    .keys()
                    .map(|name| vec![SqlValue::Text(name.clone())])
                    .collect();
                Ok(ResultSet::new(vec![format!("Tables_in_{database}")], names))
            }

            Statement::CreateTable { table, columns } => {
                let tables = self.active_tables(statement)?;
                if tables.contains_key(table.as_str()) {
                    return Err(CommuteError::database(
                        statement.kind(),
                        format!("table '{table}' already exists"),
                    ));
                }
                tables.insert(
                    table.to_string(),
                    Table {
                        columns: columns.iter().map(live_column).collect(),
                        rows: Vec::new(),
                    },
                );
                Ok(ResultSet::default())
            }

            Statement::Describe(table) => {
                let table = self.active_table(statement, table)?;
                let rows = table
                    .columns
                    .iter()
                    .map(|column| {
                        vec![
                            SqlValue::Text(column.field.clone()),
                            SqlValue::Text(column.column_type.clone()),
                            SqlValue::Text(if column.key == "PRI" { "NO" } else { "YES" }.to_string()),
                            SqlValue::Text(column.key.clone()),
                            SqlValue::Null,
                            SqlValue::Text(String::new()),
                        ]
                    })
                    .collect();
                Ok(ResultSet::new(
                    ["Field", "Type", "Null", "Key", "Default", "Extra"]
                        .map(String::from)
                        .to_vec(),
                    rows,
                ))
            }

            Statement::ConvertTimeZone(zone) => {
                let value = if self.missing_time_zone_tables {
                    SqlValue::Null
                } else {
                    let instant =
                        NaiveDateTime::parse_from_str(TIME_ZONE_CHECK_INSTANT, "%Y-%m-%d %H:%M:%S")
                            .map_err(|e| CommuteError::database(statement.kind(), e.to_string()))?;
                    SqlValue::DateTime(zone.from_utc_datetime(&instant).naive_local())
                };
                Ok(ResultSet::new(vec!["converted".to_string()], vec![vec![value]]))
            }

            Statement::SelectSamples {
                table,
                column,
                filter,
            } => {
                let table = self.active_table(statement, table)?;
                for name in [column, &filter.timestamp_column] {
                    if !table.has_column(name.as_str()) {
                        return Err(CommuteError::database(
                            statement.kind(),
                            format!("unknown column '{name}'"),
                        ));
                    }
                }
                let rows = table
                    .rows
                    .iter()
                    .filter(|row| {
                        row.get(filter.timestamp_column.as_str())
                            .and_then(SqlValue::as_datetime)
                            .is_some_and(|timestamp| filter.matches(&timestamp))
                    })
                    .map(|row| vec![row.get(column.as_str()).cloned().unwrap_or(SqlValue::Null)])
                    .collect();
                Ok(ResultSet::new(vec![column.to_string()], rows))
            }

            Statement::Upsert { table, key, fields } => {
                if self
                    .fail_upserts_after
                    .is_some_and(|limit| self.upserts >= limit)
                {
                    return Err(CommuteError::database(statement.kind(), "write rejected"));
                }
                let table = self.active_table(statement, table)?;
                let affected = upsert(table, key, fields).map_err(|reason| {
                    CommuteError::database(statement.kind(), reason)
                })?;
                self.upserts += 1;
                Ok(ResultSet::affected(affected))
            }
        }
    }
}

impl Database for MemoryDatabase {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet> {
        trace!(statement = %statement, "memory: execute");
        self.executed.push(statement.clone());
        self.apply(statement)
    }
}

/// Live descriptor MySQL reports for a created column
fn live_column(spec: &ColumnSpec) -> LiveColumn {
    LiveColumn {
        field: spec.name.to_string(),
        column_type: spec.column_type.clone(),
        key: if spec.is_primary_key() {
            "PRI".to_string()
        } else {
            String::new()
        },
    }
}

/// Insert or update by primary key, returning MySQL's affected-row count:
/// 1 for an insert, 2 for a changed row, 0 for an identical one
fn upsert(
    table: &mut Table,
    key: &Identifier,
    fields: &[(Identifier, FieldValue)],
) -> std::result::Result<u64, String> {
    if let Some((unknown, _)) = fields.iter().find(|(name, _)| !table.has_column(name.as_str())) {
        return Err(format!("unknown column '{unknown}'"));
    }
    let key_value = fields
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.to_sql_value())
        .ok_or_else(|| format!("no value for primary key '{key}'"))?;

    let row: Row = fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_sql_value()))
        .collect();

    match table
        .rows
        .iter_mut()
        .find(|existing| existing.get(key.as_str()) == Some(&key_value))
    {
        Some(existing) => {
            let mut changed = false;
            for (name, value) in row {
                if existing.get(&name) != Some(&value) {
                    existing.insert(name, value);
                    changed = true;
                }
            }
            Ok(if changed { 2 } else { 0 })
        }
        None => {
            table.rows.push(row);
            Ok(1)
        }
    }
}
