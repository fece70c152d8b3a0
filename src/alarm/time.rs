//! Target-time parsing.

/// Parses `"hh:mm"` into `(hour, minute)`.
///
/// Splits on `:` and parses the first two fields; extra fields are ignored
/// (`"7:5:9"` parses as 7:05). Anything else, including a missing colon or
/// non-numeric fields, yields `(None, None)` — a pair that can never equal
/// a real wall-clock reading, so a malformed target silently never matches
/// instead of erroring. Callers that want strict validation do it at their
/// own boundary.
#[must_use]
pub fn parse_time(value: &str) -> (Option<u32>, Option<u32>) {
    if !value.contains(':') {
        return (None, None);
    }
    let mut parts = value.splitn(3, ':');
    let (Some(hour), Some(minute)) = (parts.next(), parts.next()) else {
        return (None, None);
    };
    match (hour.parse::<u32>(), minute.parse::<u32>()) {
        (Ok(hour), Ok(minute)) => (Some(hour), Some(minute)),
        _ => (None, None),
    }
}
