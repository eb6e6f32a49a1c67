//! Integration tests for the processor module
//!
//! Drives validation, computation and writing against the in-memory
//! database with a small traffic schema.


use crate::database::memory::MemoryDatabase;
use crate::database::{Identifier, SqlValue};
use crate::processor::PipelineSettings;
use crate::processor::query::SampleQuery;
use crate::processor::statistics::StatName;
use crate::schema::SchemaDocument;
use chrono::{Duration, NaiveDate, NaiveDateTime};

pub const TRAFFIC_SCHEMA: &str = r#"
databases:
  traffic:
    tables:
      samples:
        timestamp:
          type: datetime
        duration_in_traffic:
          type: int
      stats:
        id:
          type: char(64)
          options: PRIMARY KEY
        year:
          type: int
        month:
          type: varchar(9)
        weekday:
          type: varchar(9)
        schedule:
          type: varchar(32)
        schedule_start:
          type: int
        schedule_end:
          type: int
        min:
          type: double
        max:
          type: double
        mean:
          type: double
        median:
          type: double
        median_low:
          type: double
        median_high:
          type: double
        median_grouped:
          type: double
        mode:
          type: double
        pstdev:
          type: double
        pvariance:
          type: double
        stdev:
          type: double
        variance:
          type: double
schedules:
  morning:
    start: 6
    end: 9
"#;

pub fn id(name: &str) -> Identifier {
    Identifier::new(name).unwrap()
}

pub fn schema() -> SchemaDocument {
    SchemaDocument::from_yaml(TRAFFIC_SCHEMA).unwrap()
}

pub fn settings(from_year: i32, to_year: i32) -> PipelineSettings {
    PipelineSettings {
        database: id("traffic"),
        samples: SampleQuery {
            table: id("samples"),
            duration_column: id("duration_in_traffic"),
            timestamp_column: id("timestamp"),
            timezone: chrono_tz::America::New_York,
        },
        stats_table: id("stats"),
        battery: StatName::ALL.to_vec(),
        from_year,
        to_year,
        write_enabled: true,
        route_count: 0,
    }
}

pub fn utc(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, 0, 0).unwrap()
}

/// Every day of `year` as a date
pub fn days_of(year: i32) -> impl Iterator<Item = NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    (0..)
        .map(move |offset| first + Duration::days(offset))
        .take_while(move |date| chrono::Datelike::year(date) == year)
}

/// Insert one sample per day of `year` at `hour` UTC
pub fn insert_daily(db: &mut MemoryDatabase, year: i32, hour: u32, duration: i64) {
    for date in days_of(year) {
        db.insert_row(
            "traffic",
            "samples",
            [
                ("timestamp", SqlValue::DateTime(utc(date, hour))),
                ("duration_in_traffic", SqlValue::Int(duration)),
            ],
        )
        .unwrap();
    }
}
