//! Command-line interface components.

use crate::config::Config;
use crate::constants::DATABASE_CATEGORY;
use crate::database::mysql::MySqlDatabase;
use crate::models::StatRecord;
use crate::parameters::{EnvParameterSource, FileParameterSource, ParameterSource, Parameters};
use crate::processor::export::export_parquet;
use crate::processor::validator::{self, ValidationReport};
use crate::processor::{Pipeline, PipelineSettings, RunSummary};
use crate::schema::SchemaDocument;
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug, Clone)]
#[command(name = "commute-stats")]
#[command(about = "Compute grouped traffic-duration statistics and upsert them into MySQL")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Schema document declaring databases, tables and schedules
    #[arg(long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON parameter file (defaults to the environment, then the user config directory)
    #[arg(short, long, value_name = "FILE")]
    pub parameters: Option<PathBuf>,

    /// Parameter name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// First year to compute
    #[arg(long)]
    pub from_year: Option<i32>,

    /// IANA time zone used for grouping
    #[arg(long)]
    pub timezone: Option<String>,

    /// Print every record as a JSON line instead of the completion payload
    #[arg(long)]
    pub batch: bool,

    /// Validate and provision the schema, then exit
    #[arg(long)]
    pub validate_only: bool,

    /// Compute statistics without writing them
    #[arg(long)]
    pub no_write: bool,

    /// Also write the computed records to a Parquet file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Verbose logging (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    /// Configuration file (or defaults) with command-line overrides applied
    pub fn resolve_config(&self) -> crate::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(path) = &self.schema {
            config = config.with_schema_path(path);
        }
        if let Some(prefix) = &self.prefix {
            config = config.with_parameter_prefix(prefix);
        }
        if let Some(year) = self.from_year {
            config = config.with_from_year(year);
        }
        if let Some(timezone) = &self.timezone {
            config = config.with_timezone(timezone);
        }
        if self.no_write {
            config = config.without_writes();
        }
        config.validate()?;
        Ok(config)
    }

    fn show_progress(&self) -> bool {
        !self.quiet && !self.batch
    }
}

/// Set up structured logging on stderr
pub fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("commute_stats={log_level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .context("Failed to initialise logging")?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Pick the parameter source: an explicit file, the environment when it
/// carries the prefix's database parameters, else the user config file
pub fn parameter_source(args: &Args, prefix: &str) -> Result<Box<dyn ParameterSource>> {
    if let Some(path) = &args.parameters {
        return Ok(Box::new(FileParameterSource::load(path)?));
    }

    let env = EnvParameterSource::from_env();
    let probe = format!("{}/{DATABASE_CATEGORY}", prefix.trim_end_matches('/'));
    if !env.parameters_by_path(&probe)?.is_empty() {
        debug!("parameters: using environment");
        return Ok(Box::new(env));
    }

    if let Some(path) = dirs::config_dir()
        .map(|dir| dir.join("commute-stats").join("parameters.json"))
        .filter(|path| path.exists())
    {
        debug!(path = %path.display(), "parameters: using user config file");
        return Ok(Box::new(FileParameterSource::load(&path)?));
    }

    Ok(Box::new(env))
}

/// Successful completion payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub status_code: u16,
    pub body: String,
}

impl Payload {
    pub fn ok<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self {
            status_code: 200,
            body: serde_json::to_string(body).context("Failed to serialise summary")?,
        })
    }
}

/// Run the command described by `args`
pub fn run(args: &Args) -> Result<()> {
    let config = args.resolve_config()?;
    let schema = SchemaDocument::load(&config.schema_path)?;

    let prefix = config.parameter_prefix.as_str();
    let source = parameter_source(args, prefix)?;
    let parameters = Parameters::load(source.as_ref(), prefix)?;
    let settings = PipelineSettings::from_config(&config, &parameters)?;

    let mut db = MySqlDatabase::connect(&parameters.connection()?, config.timeouts())?;

    if args.validate_only {
        let report = validator::ensure(&schema, &mut db)?;
        print_validation(&report);
        println!("{}", serde_json::to_string(&Payload::ok(&report)?)?);
        return Ok(());
    }

    let mut pipeline = Pipeline::new(&schema, settings, &mut db).with_progress(args.show_progress());
    let output = pipeline.run()?;

    if let Some(path) = &args.export {
        export_parquet(
            &output.records,
            &pipeline.settings().battery,
            path,
            config.export_compression,
        )
        .with_context(|| format!("Failed to export records to {}", path.display()))?;
    }

    if args.batch {
        print_records(&output.records)?;
    } else {
        print_summary(&output.summary);
        println!("{}", serde_json::to_string(&Payload::ok(&output.summary)?)?);
    }
    info!(records = output.records.len(), "run complete");
    Ok(())
}

fn print_records(records: &[StatRecord]) -> Result<()> {
    for record in records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

fn print_validation(report: &ValidationReport) {
    eprintln!("\n{}", "Schema validation complete".green().bold());
    eprintln!("   • Databases created: {}", report.databases_created.len());
    eprintln!("   • Tables created: {}", report.tables_created.len());
    eprintln!("   • Tables verified: {}", report.tables_verified);
}

fn print_summary(summary: &RunSummary) {
    eprintln!("\n{}", "Commute statistics complete".green().bold());
    eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "   • Source: {}.{}",
        summary.database.cyan(),
        summary.samples_table.cyan()
    );
    eprintln!("   • Years: {}-{}", summary.from_year, summary.to_year);
    eprintln!("   • Routes: {}", summary.routes);
    eprintln!("   • Groups computed: {}", summary.groups);
    eprintln!("   • Samples read: {}", summary.samples);
    eprintln!("   • Records written: {}", summary.records_written);
    if !summary.validation.tables_created.is_empty() {
        eprintln!(
            "   • Tables created: {}",
            summary.validation.tables_created.join(", ").yellow()
        );
    }
    if summary.empty_groups > 0 {
        eprintln!(
            "{}",
            format!("   • Groups without samples: {}", summary.empty_groups).yellow()
        );
    }
    eprintln!("   • Processing time: {:.2}s", summary.elapsed_secs);
    eprintln!();
}
