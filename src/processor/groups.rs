//! Enumeration of (year, month, weekday, schedule) groups.
//!
//! The enumeration is index based: group `i` is decoded from `i` alone, so
//! iteration is lazy, exact-size and can be restarted with another call to
//! [`GroupEnumerator::iter`].

use crate::models::{GroupKey, Schedule};
use chrono::{Datelike, Month, Utc, Weekday};
use chrono_tz::Tz;

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Current calendar year in the grouping time zone
pub fn current_year(timezone: Tz) -> i32 {
    Utc::now().with_timezone(&timezone).year()
}

#[derive(Debug, Clone)]
pub struct GroupEnumerator<'a> {
    from_year: i32,
    to_year: i32,
    schedules: &'a [Schedule],
}

impl<'a> GroupEnumerator<'a> {
    pub fn new(from_year: i32, to_year: i32, schedules: &'a [Schedule]) -> Self {
        Self {
            from_year,
            to_year,
            schedules,
        }
    }

    pub fn years(&self) -> usize {
        if self.to_year < self.from_year {
            0
        } else {
            (self.to_year - self.from_year) as usize + 1
        }
    }

    /// `years × 12 × 7 × schedules`
    pub fn len(&self) -> usize {
        self.years() * MONTHS.len() * WEEKDAYS.len() * self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Groups<'a> {
        Groups {
            enumerator: self.clone(),
            next: 0,
            len: self.len(),
        }
    }

    fn group_at(&self, index: usize) -> GroupKey {
        let schedules = self.schedules.len();
        let per_weekday = schedules;
        let per_month = WEEKDAYS.len() * per_weekday;
        let per_year = MONTHS.len() * per_month;

        let schedule = &self.schedules[index % schedules];
        GroupKey {
            year: self.from_year + (index / per_year) as i32,
            month: MONTHS[(index % per_year) / per_month],
            weekday: WEEKDAYS[(index % per_month) / per_weekday],
            schedule: schedule.name.clone(),
            window: schedule.window,
        }
    }
}

impl<'a> IntoIterator for &GroupEnumerator<'a> {
    type Item = GroupKey;
    type IntoIter = Groups<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the groups of a [`GroupEnumerator`]
#[derive(Debug, Clone)]
pub struct Groups<'a> {
    enumerator: GroupEnumerator<'a>,
    next: usize,
    len: usize,
}

impl Iterator for Groups<'_> {
    type Item = GroupKey;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let group = self.enumerator.group_at(self.next);
        self.next += 1;
        Some(group)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Groups<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleWindow;
    use std::collections::HashSet;

    fn schedules() -> Vec<Schedule> {
        vec![
            Schedule::new("morning", ScheduleWindow::new(6, 9)),
            Schedule::new("evening", ScheduleWindow::new(16, 19)),
            Schedule::new("all_day", None),
        ]
    }

    #[test]
    fn test_count_matches_cross_product() {
        let schedules = schedules();
        let enumerator = GroupEnumerator::new(2018, 2020, &schedules);

        assert_eq!(enumerator.len(), 3 * 12 * 7 * 3);
        assert_eq!(enumerator.iter().count(), enumerator.len());
        assert_eq!(enumerator.iter().len(), enumerator.len());
    }

    #[test]
    fn test_groups_are_unique() {
        let schedules = schedules();
        let enumerator = GroupEnumerator::new(2019, 2020, &schedules);

        let keys: HashSet<GroupKey> = enumerator.iter().collect();
        assert_eq!(keys.len(), enumerator.len());
    }

    #[test]
    fn test_order_is_year_month_weekday_schedule() {
        let schedules = schedules();
        let enumerator = GroupEnumerator::new(2020, 2021, &schedules);
        let groups: Vec<GroupKey> = enumerator.iter().collect();

        assert_eq!(groups[0].year, 2020);
        assert_eq!(groups[0].month, Month::January);
        assert_eq!(groups[0].weekday, Weekday::Mon);
        assert_eq!(groups[0].schedule, "morning");
        assert_eq!(groups[1].schedule, "evening");
        assert_eq!(groups[2].schedule, "all_day");
        assert_eq!(groups[3].weekday, Weekday::Tue);
        assert_eq!(groups[3 * 7].month, Month::February);
        assert_eq!(groups[3 * 7 * 12].year, 2021);

        let last = groups.last().unwrap();
        assert_eq!(last.year, 2021);
        assert_eq!(last.month, Month::December);
        assert_eq!(last.weekday, Weekday::Sun);
        assert_eq!(last.schedule, "all_day");
    }

    #[test]
    fn test_iteration_restarts() {
        let schedules = schedules();
        let enumerator = GroupEnumerator::new(2020, 2020, &schedules);

        let first: Vec<GroupKey> = enumerator.iter().collect();
        let second: Vec<GroupKey> = (&enumerator).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_ranges() {
        let schedules = schedules();
        assert!(GroupEnumerator::new(2021, 2020, &schedules).is_empty());
        assert_eq!(GroupEnumerator::new(2021, 2020, &schedules).iter().next(), None);
        assert!(GroupEnumerator::new(2020, 2020, &[]).is_empty());
    }

    #[test]
    fn test_current_year_is_plausible() {
        assert!(current_year(chrono_tz::UTC) >= 2024);
    }
}
