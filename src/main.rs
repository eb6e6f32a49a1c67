use clap::Parser;
use commute_stats::CommuteError;
use commute_stats::cli::{self, Args};
use std::process;
use tracing::error;

fn main() {
    let args = Args::parse();

    if let Err(e) = cli::setup_logging(&args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }

    if let Err(error) = cli::run(&args) {
        match error.downcast_ref::<CommuteError>() {
            Some(e) if e.is_configuration() => error!(kind = "configuration", "{error:#}"),
            Some(CommuteError::SchemaMismatch { database, table, .. }) => {
                error!(kind = "schema_mismatch", %database, %table, "{error:#}")
            }
            Some(CommuteError::Write { table, record_id, .. }) => {
                error!(kind = "write", %table, %record_id, "{error:#}")
            }
            _ => error!("{error:#}"),
        }
        process::exit(1);
    }
}
