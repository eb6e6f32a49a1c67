//! Statistics pipeline.
//!
//! Orchestrates a run: a read-only preflight (schedules declared, time zone
//! conversion available), schema validation, then for every enumerated group
//! a sample query followed by the statistics battery, and finally one upsert
//! per accumulated record.

pub mod export;
pub mod groups;
pub mod query;
pub mod statistics;
pub mod validator;
pub mod writer;

#[cfg(test)]
mod tests;

use self::groups::{GroupEnumerator, current_year};
use self::query::SampleQuery;
use self::statistics::StatName;
use self::validator::ValidationReport;
use self::writer::UpsertWriter;

use crate::config::Config;
use crate::database::{Database, Identifier, Statement};
use crate::error::{CommuteError, Result};
use crate::models::StatRecord;
use crate::parameters::Parameters;
use crate::schema::SchemaDocument;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a run needs besides the schema and the connection
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub database: Identifier,
    pub samples: SampleQuery,
    pub stats_table: Identifier,
    pub battery: Vec<StatName>,
    pub from_year: i32,
    pub to_year: i32,
    pub write_enabled: bool,
    pub route_count: usize,
}

impl PipelineSettings {
    /// Resolve settings from configuration and parameters; the last year is
    /// the current year in the grouping time zone
    pub fn from_config(config: &Config, parameters: &Parameters) -> Result<Self> {
        config.validate()?;
        let timezone = config.timezone()?;

        Ok(Self {
            database: Identifier::new(parameters.database_name()?)?,
            samples: SampleQuery {
                table: Identifier::new(parameters.samples_table()?)?,
                duration_column: Identifier::new(&config.duration_column)?,
                timestamp_column: Identifier::new(&config.timestamp_column)?,
                timezone,
            },
            stats_table: Identifier::new(parameters.stats_table()?)?,
            battery: config.statistics()?,
            from_year: config.from_year,
            to_year: current_year(timezone),
            write_enabled: config.write_enabled,
            route_count: parameters.route_count(),
        })
    }
}

/// Completion summary of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub database: String,
    pub samples_table: String,
    pub stats_table: String,
    pub from_year: i32,
    pub to_year: i32,
    pub routes: usize,
    pub groups: usize,
    pub samples: usize,
    pub empty_groups: usize,
    /// Statistics reported as 0 because they could not be computed
    pub fallback_statistics: usize,
    pub records_written: usize,
    pub validation: ValidationReport,
    pub elapsed_secs: f64,
}

/// Summary plus the computed records
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub records: Vec<StatRecord>,
}

#[derive(Debug, Default)]
struct ComputeCounts {
    samples: usize,
    empty_groups: usize,
    fallback_statistics: usize,
}

pub struct Pipeline<'a, D: Database> {
    schema: &'a SchemaDocument,
    settings: PipelineSettings,
    db: D,
    show_progress: bool,
}

impl<'a, D: Database> Pipeline<'a, D> {
    pub fn new(schema: &'a SchemaDocument, settings: PipelineSettings, db: D) -> Self {
        Self {
            schema,
            settings,
            db,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn groups(&self) -> GroupEnumerator<'a> {
        GroupEnumerator::new(
            self.settings.from_year,
            self.settings.to_year,
            self.schema.schedules(),
        )
    }

    /// Checks that must pass before anything is created or written
    pub fn preflight(&mut self) -> Result<()> {
        if self.schema.schedules().is_empty() {
            return Err(CommuteError::configuration(
                "schema document declares no schedules, there is nothing to compute",
            ));
        }
        self.settings.samples.check_time_zone(&mut self.db)
    }

    /// Provision and verify the declared schema
    pub fn validate(&mut self) -> Result<ValidationReport> {
        if self.schema.database(self.settings.database.as_str()).is_none() {
            warn!(
                database = %self.settings.database,
                "database: not declared in schema document"
            );
        }
        validator::ensure(self.schema, &mut self.db)
    }

    /// Compute a record for every group
    pub fn compute(&mut self) -> Result<Vec<StatRecord>> {
        self.preflight()?;
        let (records, _) = self.compute_counted()?;
        Ok(records)
    }

    fn compute_counted(&mut self) -> Result<(Vec<StatRecord>, ComputeCounts)> {
        self.db
            .execute(&Statement::UseDatabase(self.settings.database.clone()))?;

        let groups = self.groups();
        info!(
            groups = groups.len(),
            from_year = self.settings.from_year,
            to_year = self.settings.to_year,
            schedules = self.schema.schedules().len(),
            "compute: starting"
        );

        let progress = if self.show_progress {
            let pb = ProgressBar::new(groups.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut counts = ComputeCounts::default();
        let mut records = Vec::with_capacity(groups.len());
        for group in &groups {
            progress.set_message(group.to_string());
            let samples = self.settings.samples.fetch(&mut self.db, &group)?;
            let outcome = statistics::compute(&samples, &self.settings.battery);

            if outcome.used_empty_fallback {
                debug!(group = %group, "compute: no samples, using fallback");
                counts.empty_groups += 1;
            }
            for (stat, reason) in &outcome.fallbacks {
                debug!(group = %group, statistic = %stat, "compute: statistic fell back to 0: {reason}");
            }
            counts.samples += samples.len();
            counts.fallback_statistics += outcome.fallbacks.len();

            records.push(StatRecord::new(group, outcome.values, samples.len()));
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(
            records = records.len(),
            samples = counts.samples,
            empty_groups = counts.empty_groups,
            "compute: done"
        );
        Ok((records, counts))
    }

    /// Upsert records into the statistics table
    pub fn write(&mut self, records: &[StatRecord]) -> Result<usize> {
        UpsertWriter::new(self.settings.stats_table.clone())?.save(records, &mut self.db)
    }

    /// Validate, compute and, when enabled, write
    pub fn run(&mut self) -> Result<RunOutput> {
        let start = Instant::now();
        self.preflight()?;
        let validation = self.validate()?;
        let (records, counts) = self.compute_counted()?;

        let records_written = if self.settings.write_enabled {
            self.write(&records)?
        } else {
            info!(records = records.len(), "writer: writes disabled, skipping");
            0
        };

        let summary = RunSummary {
            database: self.settings.database.to_string(),
            samples_table: self.settings.samples.table.to_string(),
            stats_table: self.settings.stats_table.to_string(),
            from_year: self.settings.from_year,
            to_year: self.settings.to_year,
            routes: self.settings.route_count,
            groups: records.len(),
            samples: counts.samples,
            empty_groups: counts.empty_groups,
            fallback_statistics: counts.fallback_statistics,
            records_written,
            validation,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        Ok(RunOutput { summary, records })
    }
}
