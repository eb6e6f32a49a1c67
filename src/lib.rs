//! Commute Statistics Library
//!
//! Computes descriptive statistics of traffic durations grouped by year,
//! month, weekday and named time-of-day schedule, and upserts them into a
//! MySQL results table.
//!
//! This library provides tools for:
//! - Loading a YAML schema document and provisioning or verifying the
//!   declared databases and tables
//! - Enumerating calendar and schedule groups
//! - Building parameterised, time-zone aware sample queries
//! - Computing a fixed battery of statistics with stable fallbacks
//! - Writing idempotent upserts keyed by a content fingerprint
//! - Optional Parquet export of the computed records

pub mod cli;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod parameters;
pub mod processor;
pub mod schema;

// Re-export commonly used types
pub use config::Config;
pub use database::{Database, Identifier, Statement};
pub use error::{CommuteError, Result};
pub use models::{GroupKey, Schedule, StatRecord};
pub use processor::{Pipeline, PipelineSettings, RunSummary};
pub use schema::SchemaDocument;
