//! Sample retrieval for a single group.
//!
//! A [`FilterExpression`] selects samples whose UTC timestamp, converted into
//! the target time zone, falls on the group's weekday, month and year and,
//! for windowed schedules, inside the inclusive hour range. The same
//! expression renders to SQL for MySQL and evaluates in process for the
//! memory backend.

use crate::database::{Database, Identifier, SqlValue, Statement};
use crate::error::{CommuteError, Result};
use crate::models::{GroupKey, ScheduleWindow, month_name, weekday_name};
use chrono::{Datelike, Month, NaiveDateTime, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    pub timestamp_column: Identifier,
    pub timezone: Tz,
    pub year: i32,
    pub month: Month,
    pub weekday: Weekday,
    pub hours: Option<ScheduleWindow>,
}

impl FilterExpression {
    /// Render the `WHERE` predicate, pushing bound parameters in placeholder
    /// order
    pub fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        let local = format!("CONVERT_TZ({}, '+00:00', ?)", self.timestamp_column);
        let zone = || SqlValue::Text(self.timezone.name().to_string());

        let mut clauses = vec![
            format!("DAYNAME({local}) = ?"),
            format!("MONTHNAME({local}) = ?"),
            format!("YEAR({local}) = ?"),
        ];
        params.extend([
            zone(),
            SqlValue::Text(weekday_name(self.weekday).to_string()),
            zone(),
            SqlValue::Text(month_name(self.month).to_string()),
            zone(),
            SqlValue::Int(i64::from(self.year)),
        ]);

        if let Some(window) = self.hours {
            clauses.push(format!("HOUR({local}) BETWEEN ? AND ?"));
            params.extend([
                zone(),
                SqlValue::Int(i64::from(window.start)),
                SqlValue::Int(i64::from(window.end)),
            ]);
        }

        clauses.join(" AND ")
    }

    /// Evaluate against a UTC timestamp
    pub fn matches(&self, utc: &NaiveDateTime) -> bool {
        let local = self.timezone.from_utc_datetime(utc);
        local.year() == self.year
            && local.month() == self.month.number_from_month()
            && local.weekday() == self.weekday
            && self.hours.is_none_or(|window| window.contains(local.hour()))
    }
}

/// Build the predicate selecting a group's samples
pub fn build_predicate(
    group: &GroupKey,
    timestamp_column: &Identifier,
    timezone: Tz,
) -> FilterExpression {
    FilterExpression {
        timestamp_column: timestamp_column.clone(),
        timezone,
        year: group.year,
        month: group.month,
        weekday: group.weekday,
        hours: group.window,
    }
}

/// Where samples live and how they are read
#[derive(Debug, Clone)]
pub struct SampleQuery {
    pub table: Identifier,
    pub duration_column: Identifier,
    pub timestamp_column: Identifier,
    pub timezone: Tz,
}

impl SampleQuery {
    pub fn statement(&self, group: &GroupKey) -> Statement {
        Statement::SelectSamples {
            table: self.table.clone(),
            column: self.duration_column.clone(),
            filter: build_predicate(group, &self.timestamp_column, self.timezone),
        }
    }

    /// Fail unless the engine can convert into the grouping time zone.
    /// MySQL yields NULL for a named zone when its time zone tables are not
    /// loaded, and every group would then come back empty.
    pub fn check_time_zone<D: Database + ?Sized>(&self, db: &mut D) -> Result<()> {
        let result = db.execute(&Statement::ConvertTimeZone(self.timezone))?;
        let converted = result.rows.first().and_then(|row| row.first());
        if converted.is_none_or(SqlValue::is_null) {
            return Err(CommuteError::configuration(format!(
                "database cannot convert timestamps into time zone '{}' (are the server's time zone tables loaded?)",
                self.timezone.name()
            )));
        }
        debug!(timezone = self.timezone.name(), "time zone conversion available");
        Ok(())
    }

    /// Retrieve the group's duration samples; an empty result is valid
    pub fn fetch<D: Database + ?Sized>(&self, db: &mut D, group: &GroupKey) -> Result<Vec<f64>> {
        let statement = self.statement(group);
        let result = db.execute(&statement)?;

        let mut samples = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let Some(value) = row.first() else { continue };
            if value.is_null() {
                continue;
            }
            match value.as_f64() {
                Some(sample) if sample.is_finite() => samples.push(sample),
                Some(sample) => {
                    warn!(group = %group, sample, "skipping non-finite sample");
                }
                None => {
                    return Err(CommuteError::database(
                        statement.kind(),
                        format!(
                            "non-numeric value {:?} in {}.{}",
                            value, self.table, self.duration_column
                        ),
                    ));
                }
            }
        }

        debug!(group = %group, samples = samples.len(), "fetched samples");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use chrono::NaiveDate;

    fn group(window: Option<ScheduleWindow>) -> GroupKey {
        GroupKey {
            year: 2020,
            month: Month::January,
            weekday: Weekday::Mon,
            schedule: "morning".to_string(),
            window,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn ts() -> Identifier {
        Identifier::new("timestamp").unwrap()
    }

    #[test]
    fn test_predicate_sql_is_parameterised() {
        let filter = build_predicate(&group(ScheduleWindow::new(6, 9)), &ts(), chrono_tz::America::New_York);
        let mut params = Vec::new();
        let sql = filter.to_sql(&mut params);

        assert_eq!(
            sql,
            "DAYNAME(CONVERT_TZ(timestamp, '+00:00', ?)) = ? \
             AND MONTHNAME(CONVERT_TZ(timestamp, '+00:00', ?)) = ? \
             AND YEAR(CONVERT_TZ(timestamp, '+00:00', ?)) = ? \
             AND HOUR(CONVERT_TZ(timestamp, '+00:00', ?)) BETWEEN ? AND ?"
        );
        assert_eq!(sql.matches('?').count(), params.len());
        assert_eq!(params[0], SqlValue::Text("America/New_York".into()));
        assert_eq!(params[1], SqlValue::Text("Monday".into()));
        assert_eq!(params[3], SqlValue::Text("January".into()));
        assert_eq!(params[5], SqlValue::Int(2020));
        assert_eq!(params[7], SqlValue::Int(6));
        assert_eq!(params[8], SqlValue::Int(9));
    }

    #[test]
    fn test_unwindowed_schedule_has_no_hour_clause() {
        let filter = build_predicate(&group(None), &ts(), chrono_tz::UTC);
        let mut params = Vec::new();
        let sql = filter.to_sql(&mut params);

        assert!(!sql.contains("HOUR("));
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn test_matching_converts_time_zone() {
        let filter = build_predicate(&group(None), &ts(), chrono_tz::America::New_York);

        // Tuesday 2020-01-07 03:00 UTC is still Monday evening in New York
        assert!(filter.matches(&utc(2020, 1, 7, 3, 0)));
        // Monday 2020-01-06 02:00 UTC is Sunday evening in New York
        assert!(!filter.matches(&utc(2020, 1, 6, 2, 0)));
        assert!(filter.matches(&utc(2020, 1, 6, 12, 0)));
    }

    #[test]
    fn test_matching_applies_inclusive_hours() {
        let filter = build_predicate(
            &group(ScheduleWindow::new(6, 9)),
            &ts(),
            chrono_tz::America::New_York,
        );

        // EST is UTC-5 in January
        assert!(filter.matches(&utc(2020, 1, 6, 11, 0))); // 06:00 local
        assert!(filter.matches(&utc(2020, 1, 6, 14, 59))); // 09:59 local
        assert!(!filter.matches(&utc(2020, 1, 6, 15, 0))); // 10:00 local
        assert!(!filter.matches(&utc(2020, 1, 6, 10, 59))); // 05:59 local
    }

    #[test]
    fn test_check_time_zone_needs_conversion_support() {
        let query = SampleQuery {
            table: Identifier::new("samples").unwrap(),
            duration_column: Identifier::new("duration_in_traffic").unwrap(),
            timestamp_column: ts(),
            timezone: chrono_tz::America::New_York,
        };
        let mut db = MemoryDatabase::new();
        assert!(query.check_time_zone(&mut db).is_ok());

        db.without_time_zone_tables();
        match query.check_time_zone(&mut db) {
            Err(CommuteError::Configuration { message }) => {
                assert!(message.contains("America/New_York"));
            }
            other => panic!("Expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_year_boundary() {
        let filter = FilterExpression {
            timestamp_column: ts(),
            timezone: chrono_tz::America::New_York,
            year: 2019,
            month: Month::December,
            weekday: Weekday::Tue,
            hours: None,
        };
        // 2020-01-01 01:00 UTC is 2019-12-31 (a Tuesday) 20:00 in New York
        assert!(filter.matches(&utc(2020, 1, 1, 1, 0)));
    }
}
