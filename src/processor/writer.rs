//! Upsert writing of computed statistics.
//!
//! Each record becomes one `INSERT ... ON DUPLICATE KEY UPDATE` keyed by the
//! group fingerprint, so reruns for the same group replace the earlier row.
//! Writes auto-commit individually; the first failure stops the remaining
//! writes and earlier rows stay committed.

use crate::constants::fields;
use crate::database::{Database, Identifier, Statement};
use crate::error::{CommuteError, Result};
use crate::models::StatRecord;
use tracing::{debug, error, info};

/// Writer for the statistics results table
#[derive(Debug, Clone)]
pub struct UpsertWriter {
    table: Identifier,
    key: Identifier,
}

impl UpsertWriter {
    pub fn new(table: Identifier) -> Result<Self> {
        Ok(Self {
            table,
            key: Identifier::new(fields::ID)?,
        })
    }

    /// Upsert statement for one record, fields sorted by name
    pub fn statement(&self, record: &StatRecord) -> Result<Statement> {
        let fields = record
            .fields()
            .into_iter()
            .map(|(name, value)| Ok((Identifier::new(name)?, value)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Statement::Upsert {
            table: self.table.clone(),
            key: self.key.clone(),
            fields,
        })
    }

    /// Write every record, returning how many were written
    pub fn save<D: Database + ?Sized>(&self, records: &[StatRecord], db: &mut D) -> Result<usize> {
        info!(table = %self.table, records = records.len(), "writer: saving records");

        for (written, record) in records.iter().enumerate() {
            let statement = self.statement(record)?;
            match db.execute(&statement) {
                Ok(result) => {
                    debug!(
                        id = %record.id,
                        group = %record.key,
                        affected = result.affected_rows,
                        "writer: upserted"
                    );
                }
                Err(e) => {
                    error!(
                        table = %self.table,
                        id = %record.id,
                        group = %record.key,
                        written,
                        "writer: upsert failed: {e}"
                    );
                    return Err(CommuteError::Write {
                        table: self.table.to_string(),
                        record_id: record.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(table = %self.table, written = records.len(), "writer: done");
        Ok(records.len())
    }
}
