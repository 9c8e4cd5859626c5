//! Duration strings used in policies and task environments ("90s", "1m30s", "500ms").

use std::time::Duration;

/// Parse a duration like "5s", "500ms", "1m30s" or "2h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let value_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if value_len == 0 {
            return None;
        }
        let value: f64 = rest[..value_len].parse().ok()?;
        rest = &rest[value_len..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let secs = match &rest[..unit_len] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total = total.checked_add(Duration::try_from_secs_f64(secs).ok()?)?;
    }
    Some(total)
}

/// Parse an optional boundary. Absent, unparsable or zero means unbounded.
pub fn parse_boundary(s: Option<&str>) -> Option<Duration> {
    s.and_then(parse_duration).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn parse_compound() {
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn parse_plain_number_as_seconds() {
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration("s5"), None);
    }

    #[test]
    fn parse_rejects_overflow() {
        assert_eq!(parse_duration("99999999999999999999999h"), None);
        assert_eq!(parse_duration("5000000000000000h5000000000000000h"), None);
        assert_eq!(parse_boundary(Some("99999999999999999999999h")), None);
    }

    #[test]
    fn zero_boundary_is_unbounded() {
        assert_eq!(parse_boundary(Some("0")), None);
        assert_eq!(parse_boundary(Some("0s")), None);
        assert_eq!(parse_boundary(None), None);
        assert_eq!(parse_boundary(Some("10m")), Some(Duration::from_secs(600)));
    }
}
