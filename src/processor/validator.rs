//! Schema validation and provisioning.
//!
//! [`ensure`] walks the schema document in declaration order. Missing
//! databases and tables are created; existing tables must describe exactly
//! as declared. The first mismatch aborts with
//! [`CommuteError::SchemaMismatch`]. Nothing created earlier in the same run
//! is rolled back, and no ALTER or DROP statement is ever issued.
//!
//! Every name and column declaration is checked before the first statement
//! runs, so invalid input never leaves partial provisioning behind.

use crate::database::{ColumnSpec, Database, Identifier, LiveColumn, Statement};
use crate::error::{CommuteError, Result};
use crate::schema::SchemaDocument;
use serde::Serialize;
use tracing::{error, info, warn};

/// What [`ensure`] had to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub databases_created: Vec<String>,
    pub tables_created: Vec<String>,
    pub tables_verified: usize,
}

struct PlannedTable {
    name: Identifier,
    columns: Vec<ColumnSpec>,
}

struct PlannedDatabase {
    name: Identifier,
    tables: Vec<PlannedTable>,
}

fn plan(schema: &SchemaDocument) -> Result<Vec<PlannedDatabase>> {
    schema
        .databases()
        .iter()
        .map(|database| {
            let tables = database
                .tables
                .iter()
                .map(|table| {
                    Ok(PlannedTable {
                        name: Identifier::new(&table.name)?,
                        columns: table.column_specs()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(PlannedDatabase {
                name: Identifier::new(&database.name)?,
                tables,
            })
        })
        .collect()
}

/// Make live database state conform to the schema document
pub fn ensure<D: Database + ?Sized>(schema: &SchemaDocument, db: &mut D) -> Result<ValidationReport> {
    let planned = plan(schema)?;
    info!("database: setup");
    let mut report = ValidationReport::default();

    for database in planned {
        let database_name = database.name;

        let existing = db.execute(&Statement::ShowDatabases)?.first_column_texts();
        if existing.iter().any(|name| name == database_name.as_str()) {
            info!(database = %database_name, "database: exists");
        } else {
            warn!(database = %database_name, "database: does not exist, creating");
            db.execute(&Statement::CreateDatabase(database_name.clone()))?;
            report.databases_created.push(database_name.to_string());
        }

        db.execute(&Statement::UseDatabase(database_name.clone()))?;
        let tables = db.execute(&Statement::ShowTables)?.first_column_texts();

        for table in database.tables {
            let table_name = table.name;
            let columns = table.columns;
            let declared: Vec<String> = columns.iter().map(ColumnSpec::definition).collect();

            if tables.iter().any(|name| name == table_name.as_str()) {
                info!(database = %database_name, table = %table_name, "table: exists");
            } else {
                warn!(database = %database_name, table = %table_name, "table: does not exist, creating");
                db.execute(&Statement::CreateTable {
                    table: table_name.clone(),
                    columns,
                })?;
                report
                    .tables_created
                    .push(format!("{database_name}.{table_name}"));
            }

            let described = db.execute(&Statement::Describe(table_name.clone()))?;
            let live: Vec<String> = LiveColumn::from_describe(&described)?
                .iter()
                .map(LiveColumn::definition)
                .collect();

            if live != declared {
                error!(
                    database = %database_name,
                    table = %table_name,
                    ?declared,
                    ?live,
                    "table: columns do not match schema"
                );
                return Err(CommuteError::SchemaMismatch {
                    database: database_name.to_string(),
                    table: table_name.to_string(),
                    declared,
                    live,
                });
            }
            info!(database = %database_name, table = %table_name, "table: columns match schema");
            report.tables_verified += 1;
        }
    }

    Ok(report)
}
