//! `time` directory option: crontab-style schedule entries.
//!
//! Five fields `minute hour day-of-month month day-of-week`, or six with a
//! leading seconds field. Each field is `*`, a number, a range `a-b`, a
//! list `a,b`, and any of these with a `/step`. Weekdays count from Monday
//! as 1; both 0 and 7 mean Sunday.

use status::TimeEntry;

/// Parses one schedule expression.
pub fn parse_time_entry(text: &str) -> Result<TimeEntry, String> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let (seconds, fields) = match fields.len() {
        5 => (None, &fields[..]),
        6 => (Some(fields[0]), &fields[1..]),
        count => return Err(format!("expected 5 or 6 fields, found {count}")),
    };
    let mut entry = TimeEntry {
        minute: field_bits(fields[0], 0, 59, "minute")?,
        hour: field_bits(fields[1], 0, 23, "hour")? as u32,
        day_of_month: (field_bits(fields[2], 1, 31, "day of month")? >> 1) as u32,
        month: (field_bits(fields[3], 1, 12, "month")? >> 1) as u16,
        day_of_week: weekday_bits(fields[4])?,
        second: 1,
        has_seconds: false,
    };
    if let Some(seconds) = seconds {
        entry.second = field_bits(seconds, 0, 59, "second")?;
        entry.has_seconds = true;
    }
    Ok(entry)
}

fn weekday_bits(field: &str) -> Result<u8, String> {
    // Bit n of the raw set is weekday n with Sunday as 0 and 7.
    let raw = field_bits(field, 0, 7, "day of week")?;
    let sunday = raw & 1 != 0 || raw & (1 << 7) != 0;
    let monday_to_saturday = ((raw >> 1) & 0x3f) as u8;
    Ok(monday_to_saturday | if sunday { 1 << 6 } else { 0 })
}

/// Bit set of the values a field selects, bit `n` for value `n`.
fn field_bits(field: &str, min: u32, max: u32, name: &str) -> Result<u64, String> {
    let mut bits = 0_u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|step| *step > 0)
                    .ok_or_else(|| format!("invalid step in {name} field '{field}'"))?;
                (range, step)
            }
            None => (part, 1),
        };
        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (value(low, min, max, name)?, value(high, min, max, name)?)
        } else {
            let single = value(range, min, max, name)?;
            // `n/step` runs from n to the end of the range.
            if step > 1 { (single, max) } else { (single, single) }
        };
        if start > end {
            return Err(format!("empty range '{range}' in {name} field"));
        }
        let mut current = start;
        while current <= end {
            bits |= 1 << current;
            current += step;
        }
    }
    Ok(bits)
}

fn value(text: &str, min: u32, max: u32, name: &str) -> Result<u32, String> {
    text.parse::<u32>()
        .ok()
        .filter(|number| (min..=max).contains(number))
        .ok_or_else(|| format!("{name} value '{text}' not in {min}-{max}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_everywhere_matches_every_minute() {
        assert_eq!(parse_time_entry("* * * * *").unwrap(), TimeEntry::EVERY_MINUTE);
    }

    #[test]
    fn lists_ranges_and_steps() {
        let entry = parse_time_entry("*/15 8-10 1,15 * 1-5").unwrap();
        assert_eq!(entry.minute, 1 | 1 << 15 | 1 << 30 | 1 << 45);
        assert_eq!(entry.hour, 1 << 8 | 1 << 9 | 1 << 10);
        assert_eq!(entry.day_of_month, 1 | 1 << 14);
        assert_eq!(entry.month, (1 << 12) - 1);
        assert_eq!(entry.day_of_week, 0b001_1111);
        assert!(!entry.has_seconds);
    }

    #[test]
    fn sunday_is_both_zero_and_seven() {
        assert_eq!(parse_time_entry("0 0 * * 0").unwrap().day_of_week, 1 << 6);
        assert_eq!(parse_time_entry("0 0 * * 7").unwrap().day_of_week, 1 << 6);
    }

    #[test]
    fn six_fields_add_seconds() {
        let entry = parse_time_entry("0,30 * * * * *").unwrap();
        assert!(entry.has_seconds);
        assert_eq!(entry.second, 1 | 1 << 30);
    }

    #[test]
    fn bad_expressions_are_rejected() {
        assert!(parse_time_entry("* * * *").is_err());
        assert!(parse_time_entry("60 * * * *").is_err());
        assert!(parse_time_entry("*/0 * * * *").is_err());
        assert!(parse_time_entry("5-1 * * * *").is_err());
        assert!(parse_time_entry("* * 0 * *").is_err());
    }
}
