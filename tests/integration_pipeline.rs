//! Integration tests for the statistics pipeline
//!
//! Runs the full validate, compute and write flow against the in-memory
//! database, and checks the statistics and enumeration properties over
//! generated inputs.

use chrono::{Duration, NaiveDate};
use commute_stats::database::memory::MemoryDatabase;
use commute_stats::database::{Identifier, SqlValue};
use commute_stats::processor::groups::GroupEnumerator;
use commute_stats::processor::query::SampleQuery;
use commute_stats::processor::statistics::{self, StatName};
use commute_stats::models::ScheduleWindow;
use commute_stats::{Config, Pipeline, PipelineSettings, Schedule, SchemaDocument};
use proptest::prelude::*;
use std::collections::HashSet;
use tempfile::TempDir;

const SCHEMA: &str = r#"
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
        mean:
          type: double
        median:
          type: double
        max:
          type: double
schedules:
  morning:
    start: 6
    end: 9
  all_day: {}
"#;

fn id(name: &str) -> Identifier {
    Identifier::new(name).unwrap()
}

fn settings(battery: Vec<StatName>) -> PipelineSettings {
    PipelineSettings {
        database: id("traffic"),
        samples: SampleQuery {
            table: id("samples"),
            duration_column: id("duration_in_traffic"),
            timestamp_column: id("timestamp"),
            timezone: chrono_tz::America::New_York,
        },
        stats_table: id("stats"),
        battery,
        from_year: 2020,
        to_year: 2020,
        write_enabled: true,
        route_count: 0,
    }
}

#[test]
fn test_schema_file_drives_a_full_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("schema.yml");
    std::fs::write(&path, SCHEMA).unwrap();
    let schema = SchemaDocument::load(&path).unwrap();

    let config = Config::default().with_statistics(["mean", "median", "max"]);
    let battery = config.statistics().unwrap();
    let mut db = MemoryDatabase::new();

    let first = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let empty = Pipeline::new(&schema, settings(battery.clone()), &mut db)
        .run()
        .unwrap();
    assert_eq!(empty.summary.validation.tables_created.len(), 2);
    assert_eq!(empty.summary.empty_groups, 12 * 7 * 2);

    for offset in 0..366 {
        let date = first + Duration::days(offset);
        for (hour, duration) in [(12, 10), (22, 30)] {
            db.insert_row(
                "traffic",
                "samples",
                [
                    (
                        "timestamp",
                        SqlValue::DateTime(date.and_hms_opt(hour, 0, 0).unwrap()),
                    ),
                    ("duration_in_traffic", SqlValue::Int(duration)),
                ],
            )
            .unwrap();
        }
    }

    let mut pipeline = Pipeline::new(&schema, settings(battery.clone()), &mut db);
    let output = pipeline.run().unwrap();
    assert!(output.summary.validation.tables_created.is_empty());
    assert_eq!(output.summary.records_written, 12 * 7 * 2);

    for record in &output.records {
        let mean = record.statistic(StatName::Mean).unwrap();
        match record.key.schedule.as_str() {
            "morning" => assert_eq!(mean, 10.0),
            "all_day" => {
                assert_eq!(mean, 20.0, "{}", record.key);
                assert_eq!(record.statistic(StatName::Max), Some(30.0));
            }
            other => panic!("unexpected schedule {other}"),
        }
    }
    assert_eq!(db.rows("traffic", "stats").unwrap().len(), 12 * 7 * 2);
}

#[test]
fn test_worked_example() {
    let outcome = statistics::compute(&[15.0, 5.0, 10.0], &StatName::ALL);
    assert_eq!(outcome.values[&StatName::Mean], 10.0);
    assert_eq!(outcome.values[&StatName::Median], 10.0);
    assert_eq!(outcome.values[&StatName::Min], 5.0);
    assert_eq!(outcome.values[&StatName::Max], 15.0);
    assert_eq!(outcome.values[&StatName::Stdev], 5.0);
}

proptest! {
    #[test]
    fn prop_statistics_are_ordered_and_deterministic(
        samples in prop::collection::vec(0.0f64..10_000.0, 1..200)
    ) {
        let outcome = statistics::compute(&samples, &StatName::ALL);
        let min = outcome.values[&StatName::Min];
        let median = outcome.values[&StatName::Median];
        let max = outcome.values[&StatName::Max];

        prop_assert!(min <= median && median <= max);
        prop_assert!(max >= min);

        let mut reversed = samples.clone();
        reversed.reverse();
        prop_assert_eq!(statistics::compute(&reversed, &StatName::ALL), outcome);
    }

    #[test]
    fn prop_unequal_samples_have_distinct_extremes(
        low in 0.0f64..1_000.0,
        gap in 0.5f64..1_000.0,
        rest in prop::collection::vec(0.0f64..1.0, 0..20)
    ) {
        let mut samples = vec![low, low + gap];
        samples.extend(rest.iter().map(|fraction| low + fraction * gap));
        let outcome = statistics::compute(&samples, &[StatName::Min, StatName::Max]);
        prop_assert!(outcome.values[&StatName::Max] > outcome.values[&StatName::Min]);
    }

    #[test]
    fn prop_enumeration_count(
        from in 2000i32..2030,
        span in 0i32..5,
        schedule_count in 1usize..5
    ) {
        let schedules: Vec<Schedule> = (0..schedule_count)
            .map(|i| Schedule::new(format!("s{i}"), ScheduleWindow::new(i as u32, 23)))
            .collect();
        let enumerator = GroupEnumerator::new(from, from + span, &schedules);

        let expected = (span as usize + 1) * 12 * 7 * schedule_count;
        prop_assert_eq!(enumerator.len(), expected);

        let keys: HashSet<_> = enumerator.iter().collect();
        prop_assert_eq!(keys.len(), expected);
    }
}
