//! Parquet export of a run's records.

use crate::config::CompressionAlgorithm;
use crate::constants::fields;
use crate::error::Result;
use crate::models::StatRecord;
use crate::processor::statistics::StatName;
use polars::prelude::{Column, DataFrame, ParquetWriter};
use std::path::Path;
use tracing::info;

/// Build a frame with one row per record and one column per field
pub fn records_to_frame(records: &[StatRecord], battery: &[StatName]) -> Result<DataFrame> {
    let text = |f: fn(&StatRecord) -> String| records.iter().map(f).collect::<Vec<String>>();

    let mut columns = vec![
        Column::new(fields::ID.into(), text(|r| r.id.clone())),
        Column::new(
            fields::YEAR.into(),
            records.iter().map(|r| r.key.year).collect::<Vec<i32>>(),
        ),
        Column::new(fields::MONTH.into(), text(|r| r.key.month_name().to_string())),
        Column::new(fields::WEEKDAY.into(), text(|r| r.key.weekday_name().to_string())),
        Column::new(fields::SCHEDULE.into(), text(|r| r.key.schedule.clone())),
        Column::new(
            fields::SCHEDULE_START.into(),
            records
                .iter()
                .map(|r| r.key.window.map(|w| w.start))
                .collect::<Vec<Option<u32>>>(),
        ),
        Column::new(
            fields::SCHEDULE_END.into(),
            records
                .iter()
                .map(|r| r.key.window.map(|w| w.end))
                .collect::<Vec<Option<u32>>>(),
        ),
        Column::new(
            "sample_count".into(),
            records
                .iter()
                .map(|r| r.sample_count as u64)
                .collect::<Vec<u64>>(),
        ),
    ];
    for stat in battery {
        columns.push(Column::new(
            stat.as_str().into(),
            records
                .iter()
                .map(|r| r.statistic(*stat))
                .collect::<Vec<Option<f64>>>(),
        ));
    }

    Ok(DataFrame::new(columns)?)
}

/// Write records to a Parquet file, returning the bytes written
pub fn export_parquet(
    records: &[StatRecord],
    battery: &[StatName],
    path: &Path,
    compression: CompressionAlgorithm,
) -> Result<u64> {
    let mut frame = records_to_frame(records, battery)?;
    let file = std::fs::File::create(path)?;
    let size = ParquetWriter::new(file)
        .with_compression(compression.to_polars_compression())
        .finish(&mut frame)?;
    info!(
        path = %path.display(),
        rows = frame.height(),
        bytes = size,
        "export: wrote parquet"
    );
    Ok(size)
}
