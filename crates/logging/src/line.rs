use time::OffsetDateTime;
use time::macros::format_description;

use crate::Sign;

/// Renders one stream line: `DD HH:MM:SS <S> text`.
///
/// The sign always starts in column 13 so log viewers can filter on it
/// without parsing the timestamp.
#[must_use]
pub fn format_line(unix_time: i64, sign: Sign, text: &str) -> String {
    let format = format_description!("[day] [hour]:[minute]:[second]");
    let stamp = OffsetDateTime::from_unix_timestamp(unix_time)
        .ok()
        .and_then(|moment| moment.format(&format).ok())
        .unwrap_or_else(|| String::from("00 00:00:00"));
    format!("{stamp} {sign} {text}")
}
