//! Core data structures for grouped commute statistics.
//!
//! Defines schedule windows, group keys and the per-group statistic records
//! that are accumulated during a run and written to the results table.

use crate::constants::{MAX_HOUR, MONTH_NAMES, WEEKDAY_NAMES, fields};
use crate::database::FieldValue;
use crate::fingerprint::Fingerprint;
use crate::processor::statistics::StatName;
use chrono::{Month, Weekday};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// English month name, as `MONTHNAME()` returns it
pub fn month_name(month: Month) -> &'static str {
    MONTH_NAMES[month.number_from_month() as usize - 1]
}

/// English weekday name, as `DAYNAME()` returns it
pub fn weekday_name(weekday: Weekday) -> &'static str {
    WEEKDAY_NAMES[weekday.num_days_from_monday() as usize]
}

/// Inclusive hour-of-day range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleWindow {
    pub start: u32,
    pub end: u32,
}

impl ScheduleWindow {
    /// Returns `None` when the bounds are not a valid window
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start <= end && end <= MAX_HOUR).then_some(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        (self.start..=self.end).contains(&hour)
    }
}

/// A named schedule from the schema document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub name: String,
    pub window: Option<ScheduleWindow>,
}

impl Schedule {
    pub fn new(name: impl Into<String>, window: Option<ScheduleWindow>) -> Self {
        Self {
            name: name.into(),
            window,
        }
    }
}

/// One (year, month, weekday, schedule) cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub year: i32,
    pub month: Month,
    pub weekday: Weekday,
    pub schedule: String,
    pub window: Option<ScheduleWindow>,
}

impl GroupKey {
    pub fn month_name(&self) -> &'static str {
        month_name(self.month)
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }

    /// Identity of the group across runs
    pub fn fingerprint(&self) -> Fingerprint {
        let bound = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_default();
        Fingerprint::new([
            self.year.to_string(),
            self.month_name().to_string(),
            self.weekday_name().to_string(),
            self.schedule.clone(),
            bound(self.window.map(|w| w.start)),
            bound(self.window.map(|w| w.end)),
        ])
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.year,
            self.month_name(),
            self.weekday_name(),
            self.schedule
        )?;
        if let Some(window) = self.window {
            write!(f, " [{}-{}]", window.start, window.end)?;
        }
        Ok(())
    }
}

/// Computed statistics for one group
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub id: String,
    pub key: GroupKey,
    pub statistics: BTreeMap<StatName, f64>,
    /// Samples retrieved for the group before any fallback
    pub sample_count: usize,
}

impl StatRecord {
    pub fn new(key: GroupKey, statistics: BTreeMap<StatName, f64>, sample_count: usize) -> Self {
        Self {
            id: key.fingerprint().digest(),
            key,
            statistics,
            sample_count,
        }
    }

    pub fn statistic(&self, name: StatName) -> Option<f64> {
        self.statistics.get(&name).copied()
    }

    /// Flattened `(field, value)` pairs sorted by field name
    pub fn fields(&self) -> Vec<(String, FieldValue)> {
        let bound = |value: Option<u32>| match value {
            Some(hour) => FieldValue::Integer(i64::from(hour)),
            None => FieldValue::Null,
        };

        let mut pairs = vec![
            (
                fields::ID.to_string(),
                FieldValue::Fingerprint(self.key.fingerprint()),
            ),
            (
                fields::YEAR.to_string(),
                FieldValue::Integer(i64::from(self.key.year)),
            ),
            (
                fields::MONTH.to_string(),
                FieldValue::Text(self.key.month_name().to_string()),
            ),
            (
                fields::WEEKDAY.to_string(),
                FieldValue::Text(self.key.weekday_name().to_string()),
            ),
            (
                fields::SCHEDULE.to_string(),
                FieldValue::Text(self.key.schedule.clone()),
            ),
            (
                fields::SCHEDULE_START.to_string(),
                bound(self.key.window.map(|w| w.start)),
            ),
            (
                fields::SCHEDULE_END.to_string(),
                bound(self.key.window.map(|w| w.end)),
            ),
        ];
        pairs.extend(
            self.statistics
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), FieldValue::Number(*value))),
        );
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

impl Serialize for StatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, value) in &fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(schedule: &str, window: Option<ScheduleWindow>) -> GroupKey {
        GroupKey {
            year: 2020,
            month: Month::March,
            weekday: Weekday::Wed,
            schedule: schedule.to_string(),
            window,
        }
    }

    #[test]
    fn test_schedule_window_bounds() {
        assert!(ScheduleWindow::new(6, 9).is_some());
        assert!(ScheduleWindow::new(0, 23).is_some());
        assert!(ScheduleWindow::new(7, 7).is_some());
        assert!(ScheduleWindow::new(9, 6).is_none());
        assert!(ScheduleWindow::new(20, 24).is_none());

        let window = ScheduleWindow::new(6, 9).unwrap();
        assert!(window.contains(6));
        assert!(window.contains(9));
        assert!(!window.contains(10));
        assert!(!window.contains(5));
    }

    #[test]
    fn test_group_names() {
        let group = key("morning", ScheduleWindow::new(6, 9));
        assert_eq!(group.month_name(), "March");
        assert_eq!(group.weekday_name(), "Wednesday");
        assert_eq!(group.to_string(), "2020 March Wednesday morning [6-9]");
    }

    #[test]
    fn test_fingerprint_depends_on_window() {
        let windowed = key("morning", ScheduleWindow::new(6, 9));
        let shifted = key("morning", ScheduleWindow::new(7, 9));
        let open = key("morning", None);

        assert_eq!(windowed.fingerprint(), windowed.clone().fingerprint());
        assert_ne!(windowed.fingerprint().digest(), shifted.fingerprint().digest());
        assert_ne!(windowed.fingerprint().digest(), open.fingerprint().digest());
        assert_eq!(
            open.fingerprint().parts(),
            &["2020", "March", "Wednesday", "morning", "", ""]
        );
    }

    #[test]
    fn test_record_fields_are_sorted() {
        let mut statistics = BTreeMap::new();
        statistics.insert(StatName::Mean, 10.0);
        statistics.insert(StatName::Max, 12.0);
        let record = StatRecord::new(key("all_day", None), statistics, 3);

        let names: Vec<String> = record.fields().into_iter().map(|(name, _)| name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"schedule_start".to_string()));
        assert_eq!(record.statistic(StatName::Max), Some(12.0));
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut statistics = BTreeMap::new();
        statistics.insert(StatName::Mean, 10.0);
        let record = StatRecord::new(key("morning", ScheduleWindow::new(6, 9)), statistics, 4);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], serde_json::Value::String(record.id.clone()));
        assert_eq!(json["month"], "March");
        assert_eq!(json["schedule_start"], 6);
        assert_eq!(json["mean"], 10.0);
    }
}
