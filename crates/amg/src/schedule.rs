//! When a directory is due for its next scan.

use status::{DirStatus, TimeEntry, dir_options};
use time::{Date, OffsetDateTime};

/// Days searched ahead before a schedule is declared unsatisfiable.
///
/// Covers a leap day that only matches on one weekday.
const SEARCH_DAYS: u32 = 366 * 28;

/// Earliest time strictly after `after` that any entry selects.
///
/// Entries without seconds fire at second 0 of a matching minute. Returns
/// `None` for an empty or unsatisfiable schedule (for example 31 February).
#[must_use]
pub fn next_time(entries: &[TimeEntry], after: i64) -> Option<i64> {
    entries
        .iter()
        .filter_map(|entry| next_for_entry(entry, after))
        .min()
}

/// Next scan time for `dir` following a scan at `now`.
///
/// Remote directories without a schedule are polled every
/// `remote_file_check_interval`. Local directories without one are due on
/// every tick, expressed as `now`.
#[must_use]
pub fn next_check_time(dir: &DirStatus, now: i64) -> i64 {
    let schedule = dir.schedule();
    if !schedule.is_empty() {
        if let Some(next) = next_time(schedule, now) {
            return next;
        }
        return i64::MAX;
    }
    if dir.has_option(dir_options::REMOTE_DIR) {
        now + i64::from(dir.remote_file_check_interval.max(1))
    } else {
        now
    }
}

fn next_for_entry(entry: &TimeEntry, after: i64) -> Option<i64> {
    let start = if entry.has_seconds {
        after + 1
    } else {
        (after.div_euclid(60) + 1) * 60
    };
    let start = OffsetDateTime::from_unix_timestamp(start).ok()?;
    let first_day = start.date();
    let mut date = first_day;
    for _ in 0..SEARCH_DAYS {
        if day_matches(entry, date) {
            let same_day = date == first_day;
            let first_hour = if same_day { start.hour() } else { 0 };
            for hour in first_hour..24 {
                if entry.hour & (1 << hour) == 0 {
                    continue;
                }
                let same_hour = same_day && hour == start.hour();
                let first_minute = if same_hour { start.minute() } else { 0 };
                for minute in first_minute..60 {
                    if entry.minute & (1 << minute) == 0 {
                        continue;
                    }
                    let same_minute = same_hour && minute == start.minute();
                    let second = if entry.has_seconds {
                        let first_second = if same_minute { start.second() } else { 0 };
                        match (first_second..60).find(|second| entry.second & (1 << second) != 0) {
                            Some(second) => second,
                            None => continue,
                        }
                    } else {
                        0
                    };
                    let moment = date.with_hms(hour, minute, second).ok()?;
                    return Some(moment.assume_utc().unix_timestamp());
                }
            }
        }
        date = date.next_day()?;
    }
    None
}

fn day_matches(entry: &TimeEntry, date: Date) -> bool {
    let month = u8::from(date.month()) - 1;
    let day = date.day() - 1;
    let weekday = date.weekday().number_days_from_monday();
    entry.month & (1 << month) != 0
        && entry.day_of_month & (1 << day) != 0
        && entry.day_of_week & (1 << weekday) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-01 00:00:00 UTC, a Monday.
    const NEW_YEAR_2024: i64 = 1_704_067_200;

    fn entry(minute: u64, hour: u32) -> TimeEntry {
        TimeEntry {
            minute,
            hour,
            ..TimeEntry::EVERY_MINUTE
        }
    }

    #[test]
    fn every_minute_fires_at_the_next_minute_boundary() {
        let next = next_time(&[TimeEntry::EVERY_MINUTE], NEW_YEAR_2024 + 5).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 60);
        let next = next_time(&[TimeEntry::EVERY_MINUTE], NEW_YEAR_2024).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 60, "strictly after");
    }

    #[test]
    fn hour_and_minute_bits_select_the_slot() {
        // 08:30 every day.
        let next = next_time(&[entry(1 << 30, 1 << 8)], NEW_YEAR_2024).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 8 * 3600 + 30 * 60);
        // Already past 08:30: tomorrow.
        let next = next_time(&[entry(1 << 30, 1 << 8)], NEW_YEAR_2024 + 9 * 3600).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 86_400 + 8 * 3600 + 30 * 60);
    }

    #[test]
    fn weekday_restricts_days() {
        // Sundays at 00:00; 2024-01-07 is the first Sunday.
        let sunday = TimeEntry {
            day_of_week: 1 << 6,
            ..entry(1, 1)
        };
        let next = next_time(&[sunday], NEW_YEAR_2024).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 6 * 86_400);
    }

    #[test]
    fn seconds_are_honoured_when_present() {
        let half_minute = TimeEntry {
            second: 1 << 30,
            has_seconds: true,
            ..TimeEntry::EVERY_MINUTE
        };
        let next = next_time(&[half_minute], NEW_YEAR_2024 + 10).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 30);
        let next = next_time(&[half_minute], NEW_YEAR_2024 + 30).unwrap();
        assert_eq!(next, NEW_YEAR_2024 + 90);
    }

    #[test]
    fn earliest_entry_wins_and_impossible_dates_give_none() {
        let late = entry(1, 1 << 23);
        let early = entry(1, 1 << 1);
        assert_eq!(
            next_time(&[late, early], NEW_YEAR_2024).unwrap(),
            NEW_YEAR_2024 + 3600
        );
        let february_31 = TimeEntry {
            day_of_month: 1 << 30,
            month: 1 << 1,
            ..TimeEntry::EVERY_MINUTE
        };
        assert_eq!(next_time(&[february_31], NEW_YEAR_2024), None);
    }

    #[test]
    fn unscheduled_directories_fall_back_to_interval() {
        let mut dir = DirStatus::new("in", "/in");
        assert_eq!(next_check_time(&dir, 100), 100);
        dir.dir_options |= dir_options::REMOTE_DIR;
        dir.remote_file_check_interval = 30;
        assert_eq!(next_check_time(&dir, 100), 130);
    }
}
