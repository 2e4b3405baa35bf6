//! Epoch-millisecond coercion for temporal comparisons: whichever side of
//! a comparison carries a timestamp type, both operands are normalized to
//! a 64-bit epoch-ms value before comparing.
use bson::Bson;

const SECONDS_THRESHOLD: i64 = 10_000_000_000;

/// Coerce a document value to epoch-ms, following the textual/integer/
/// float rules. Returns `None` for a value with no temporal reading.
#[must_use]
pub fn to_epoch_ms(value: &Bson) -> Option<i64> {
    match value {
        Bson::DateTime(dt) => Some((*dt).to_chrono().timestamp_millis()),
        Bson::String(s) => parse_iso8601(s),
        Bson::Int32(i) => Some(normalize_int(i64::from(*i))),
        Bson::Int64(i) => Some(normalize_int(*i)),
        Bson::Double(f) => Some(normalize_float(*f)),
        _ => None,
    }
}

fn normalize_int(i: i64) -> i64 {
    if i.abs() < SECONDS_THRESHOLD { i * 1000 } else { i }
}

fn normalize_float(f: f64) -> i64 {
    if f.trunc().abs() < SECONDS_THRESHOLD as f64 {
        (f * 1000.0).trunc() as i64
    } else {
        f.trunc() as i64
    }
}

fn parse_iso8601(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_are_seconds() {
        assert_eq!(to_epoch_ms(&Bson::Int64(1_000)), Some(1_000_000));
    }

    #[test]
    fn large_integers_are_already_milliseconds() {
        assert_eq!(to_epoch_ms(&Bson::Int64(20_000_000_000)), Some(20_000_000_000));
    }

    #[test]
    fn fractional_seconds_multiply_and_truncate() {
        assert_eq!(to_epoch_ms(&Bson::Double(1.5)), Some(1_500));
    }

    #[test]
    fn iso8601_text_parses() {
        let ms = to_epoch_ms(&Bson::String("2024-01-01T00:00:00Z".to_string())).unwrap();
        assert_eq!(ms, 1_704_067_200_000);
    }

    #[test]
    fn non_temporal_string_has_no_reading() {
        assert_eq!(to_epoch_ms(&Bson::String("not a date".to_string())), None);
    }
}
