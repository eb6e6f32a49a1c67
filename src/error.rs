//! Error handling for commute statistics runs.
//!
//! Provides error types with enough context to identify the offending
//! database, table, statement or record when a run has to abort.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommuteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to load schema document {path}: {reason}")]
    SchemaLoad { path: PathBuf, reason: String },

    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Invalid schema for table {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("Could not connect to database at {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error(
        "Schema mismatch in {database}.{table}: declared columns {declared:?}, live columns {live:?}"
    )]
    SchemaMismatch {
        database: String,
        table: String,
        declared: Vec<String>,
        live: Vec<String>,
    },

    #[error("Database statement failed ({statement}): {reason}")]
    Database { statement: String, reason: String },

    #[error("Upsert of record {record_id} into {table} failed: {reason}")]
    Write {
        table: String,
        record_id: String,
        reason: String,
    },
}

impl CommuteError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a schema load error for the given document path
    pub fn schema_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SchemaLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid schema error naming the table
    pub fn invalid_schema(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error
    pub fn connection(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create a statement failure error
    pub fn database(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any database object was created or written
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::SchemaLoad { .. }
                | Self::InvalidIdentifier { .. }
                | Self::InvalidSchema { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CommuteError>;
