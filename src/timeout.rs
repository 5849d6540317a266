//! Encodes and decodes the `grpc-timeout` header (§4.3).

use std::time::Duration;

const MAX_TIMEOUT_SECONDS: u64 = 99_999_999;
const MAX_DIGITS_VALUE: u128 = 99_999_999;

/// Coarsest-unit-first, exact-division-only candidates: a unit is only used
/// if the duration divides it with no remainder, so `2.5s` becomes `2500m`
/// rather than a truncated, lossy `2S`.
const UNITS_NANOS: [(u128, &str); 6] = [
    (3_600_000_000_000, "H"),
    (60_000_000_000, "M"),
    (1_000_000_000, "S"),
    (1_000_000, "m"),
    (1_000, "u"),
    (1, "n"),
];

/// Encodes a duration into a `grpc-timeout` token, choosing the coarsest
/// unit that represents the value exactly (no remainder) within 8 digits.
/// Non-positive durations (represented here as `Duration::ZERO`, since
/// `Duration` cannot be negative) encode as the minimum token `1n`.
pub fn encode_timeout(duration: Duration) -> String {
    if duration.is_zero() {
        return "1n".to_string();
    }

    let nanos = duration.as_nanos();

    for (unit_nanos, suffix) in UNITS_NANOS {
        if nanos % unit_nanos == 0 {
            let quotient = nanos / unit_nanos;
            if quotient >= 1 && quotient <= MAX_DIGITS_VALUE {
                return format!("{quotient}{suffix}");
            }
        }
    }

    format!("{MAX_TIMEOUT_SECONDS}S")
}

/// Encodes a duration for the wire, clamping to the maximum and returning
/// whether clamping occurred (so the caller can emit the
/// "Deadline timeout ... above maximum" log line exactly once).
pub fn encode_timeout_checked(duration: Duration) -> (String, bool) {
    if duration.as_secs() > MAX_TIMEOUT_SECONDS {
        (format!("{MAX_TIMEOUT_SECONDS}S"), true)
    } else {
        (encode_timeout(duration), false)
    }
}

/// Decodes a `grpc-timeout` value into a duration. Returns `None` if the
/// value doesn't match `[0-9]{1,8}(H|M|S|m|u|n)`.
pub fn decode_timeout(raw: &str) -> Option<Duration> {
    if raw.is_empty() || raw.len() > 9 {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    let duration = match unit {
        "H" => Duration::from_secs(value.checked_mul(3600)?),
        "M" => Duration::from_secs(value.checked_mul(60)?),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }
    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn canonical_encodings_from_base_spec_table() {
        assert_eq!(encode_timeout(ms(1)), "1m");
        assert_eq!(encode_timeout(ms(10)), "10m");
        assert_eq!(encode_timeout(ms(100)), "100m");
        assert_eq!(encode_timeout(ms(890)), "890m");
        assert_eq!(encode_timeout(ms(900)), "900m");
        assert_eq!(encode_timeout(ms(901)), "901m");
        assert_eq!(encode_timeout(secs(1)), "1S");
        assert_eq!(encode_timeout(secs(2)), "2S");
        assert_eq!(encode_timeout(ms(2500)), "2500m");
        assert_eq!(encode_timeout(secs(50)), "50S");
        assert_eq!(encode_timeout(secs(59)), "59S");
        assert_eq!(encode_timeout(secs(60)), "1M");
        assert_eq!(encode_timeout(secs(80)), "80S");
        assert_eq!(encode_timeout(secs(90)), "90S");
        assert_eq!(encode_timeout(secs(120)), "2M");
        assert_eq!(encode_timeout(secs(20 * 60)), "20M");
        assert_eq!(encode_timeout(secs(3600)), "1H");
        assert_eq!(encode_timeout(secs(10 * 3600)), "10H");
    }

    #[test]
    fn zero_encodes_to_minimum_token() {
        assert_eq!(encode_timeout(Duration::ZERO), "1n");
    }

    #[test]
    fn excessive_duration_clamps_and_reports() {
        let huge = secs(MAX_TIMEOUT_SECONDS + 1);
        let (token, clamped) = encode_timeout_checked(huge);
        assert_eq!(token, "99999999S");
        assert!(clamped);
    }

    #[test]
    fn within_range_does_not_report_clamping() {
        let (token, clamped) = encode_timeout_checked(secs(5));
        assert_eq!(token, "5S");
        assert!(!clamped);
    }

    #[test]
    fn decode_round_trips_canonical_tokens() {
        assert_eq!(decode_timeout("1m"), Some(ms(1)));
        assert_eq!(decode_timeout("1H"), Some(secs(3600)));
        assert_eq!(decode_timeout("1n"), Some(Duration::from_nanos(1)));
    }

    #[test]
    fn decode_rejects_malformed_values() {
        assert_eq!(decode_timeout(""), None);
        assert_eq!(decode_timeout("123456789S"), None); // 9 digits
        assert_eq!(decode_timeout("12X"), None);
        assert_eq!(decode_timeout("abcS"), None);
    }
}
