//! Backoff policy: exponential delay with bounded jitter, plus parsing of
//! provider rate-limit hints.
//!
//! Everything here is pure except the jitter draw. The effective wait before
//! a retry is `max(hint, backoff)`: a provider hint can lengthen the wait
//! but never shorten it below the computed backoff.

use crate::transport::HttpResponse;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Upper bound on the jitter added to any backoff.
pub const MAX_JITTER_MS: u64 = 250;

/// Headers carrying a reset duration, checked after `retry-after`.
const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset-requests", "x-ratelimit-reset-tokens"];

/// `min(max, base · 2^(attempt−1))`, without jitter. `attempt` 0 counts as 1.
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// Largest jitter allowed on top of an exponential delay.
pub fn jitter_cap(exponential: Duration) -> Duration {
    let fifth = u64::try_from(exponential.as_millis() / 5).unwrap_or(u64::MAX);
    Duration::from_millis(fifth.min(MAX_JITTER_MS))
}

/// Exponential backoff plus uniform jitter in `[0, jitter_cap]`.
pub fn compute_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    compute_backoff_with(attempt, base, max, &mut rand::rng())
}

/// [`compute_backoff`] with a caller-supplied random source.
pub fn compute_backoff_with<R: Rng>(
    attempt: u32,
    base: Duration,
    max: Duration,
    rng: &mut R,
) -> Duration {
    let exponential = exponential_delay(attempt, base, max);
    let cap = u64::try_from(jitter_cap(exponential).as_millis()).unwrap_or(MAX_JITTER_MS);
    let jitter = if cap == 0 { 0 } else { rng.random_range(0..=cap) };
    exponential + Duration::from_millis(jitter)
}

/// Parse a reset duration: a bare number of seconds (`"2"`, `"1.5"`) or
/// numbers with `ms|s|m|h` units (`"500ms"`, `"2s"`, `"6m0s"`).
pub fn parse_retry_delay(value: &str) -> Option<Duration> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    if compact.is_empty() {
        return None;
    }

    if let Ok(seconds) = compact.parse::<f64>() {
        return millis_from_f64(seconds * 1000.0);
    }

    let mut total_ms = 0.0;
    let mut rest = compact.as_str();
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let (unit_ms, unit_len) = if rest.starts_with("ms") {
            (1.0, 2)
        } else if rest.starts_with('s') {
            (1_000.0, 1)
        } else if rest.starts_with('m') {
            (60_000.0, 1)
        } else if rest.starts_with('h') {
            (3_600_000.0, 1)
        } else {
            return None;
        };
        total_ms += amount * unit_ms;
        rest = &rest[unit_len..];
    }

    millis_from_f64(total_ms)
}

/// Obsolete HTTP-date forms: RFC 850 and asctime.
const OBSOLETE_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %d %H:%M:%S %Y"];

/// Parse a `retry-after` value: delay-seconds or an HTTP date in any of
/// the three forms HTTP allows.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<f64>() {
        return millis_from_f64(seconds * 1000.0);
    }

    let date = parse_http_date(value)?;
    let millis = (date - now).num_milliseconds().max(0);
    Some(Duration::from_millis(millis as u64))
}

/// The first parseable hint on a response: `retry-after`, then the
/// `x-ratelimit-reset-*` headers.
pub fn retry_hint(response: &HttpResponse, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(delay) = response
        .header("retry-after")
        .and_then(|v| parse_retry_after(v, now))
    {
        return Some(delay);
    }

    RESET_HEADERS
        .iter()
        .filter_map(|name| response.header(name))
        .find_map(parse_retry_delay)
}

/// The wait actually applied before a retry.
pub fn effective_delay(hint: Option<Duration>, backoff: Duration) -> Duration {
    hint.map_or(backoff, |h| h.max(backoff))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    // asctime pads single-digit days with a space.
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    OBSOLETE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .map(|naive| naive.and_utc())
}

fn millis_from_f64(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Some(Duration::from_millis(ms.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BASE: Duration = Duration::from_millis(750);
    const MAX: Duration = Duration::from_millis(20_000);

    #[test]
    fn exponential_growth_is_capped() {
        assert_eq!(exponential_delay(1, BASE, MAX), Duration::from_millis(750));
        assert_eq!(exponential_delay(2, BASE, MAX), Duration::from_millis(1500));
        assert_eq!(exponential_delay(3, BASE, MAX), Duration::from_millis(3000));
        assert_eq!(exponential_delay(6, BASE, MAX), MAX);
        assert_eq!(exponential_delay(200, BASE, MAX), MAX);
    }

    #[test]
    fn attempt_zero_behaves_like_first_retry() {
        assert_eq!(exponential_delay(0, BASE, MAX), BASE);
    }

    #[test]
    fn backoff_stays_within_bounds() {
        for attempt in 1..=12 {
            let floor = exponential_delay(attempt, BASE, MAX);
            for _ in 0..50 {
                let delay = compute_backoff(attempt, BASE, MAX);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay <= MAX + Duration::from_millis(MAX_JITTER_MS));
                assert!(delay <= floor + jitter_cap(floor));
            }
        }
    }

    #[test]
    fn jitter_is_a_fifth_of_small_delays() {
        assert_eq!(jitter_cap(Duration::from_millis(750)), Duration::from_millis(150));
        assert_eq!(jitter_cap(Duration::from_millis(20_000)), Duration::from_millis(250));
        assert_eq!(jitter_cap(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn zero_base_gives_zero_backoff() {
        let delay = compute_backoff(3, Duration::ZERO, MAX);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn parses_unit_suffixes() {
        assert_eq!(parse_retry_delay("2s"), Some(Duration::from_millis(2000)));
        assert_eq!(parse_retry_delay("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_delay("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_delay("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_retry_delay("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_delay("6m0s"), Some(Duration::from_secs(360)));
        assert_eq!(parse_retry_delay(" 2 S "), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn bare_numbers_are_seconds() {
        assert_eq!(parse_retry_delay("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_delay("0.25"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_retry_delay(""), None);
        assert_eq!(parse_retry_delay("abc"), None);
        assert_eq!(parse_retry_delay("5x"), None);
        assert_eq!(parse_retry_delay("s"), None);
        assert_eq!(parse_retry_delay("-2"), None);
        assert_eq!(parse_retry_delay("1.2.3s"), None);
    }

    #[test]
    fn retry_after_accepts_seconds_and_dates() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(parse_retry_after("4", now), Some(Duration::from_secs(4)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn retry_after_accepts_obsolete_date_forms() {
        let now = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 27).unwrap();
        assert_eq!(
            parse_retry_after("Sunday, 06-Nov-94 08:49:37 GMT", now),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            parse_retry_after("Sun Nov  6 08:49:37 1994", now),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn retry_after_takes_priority_over_reset_headers() {
        let now = Utc::now();
        let response = HttpResponse::new(429, "")
            .with_header("x-ratelimit-reset-requests", "20s")
            .with_header("retry-after", "2");
        assert_eq!(retry_hint(&response, now), Some(Duration::from_secs(2)));
    }

    #[test]
    fn reset_headers_are_checked_in_order() {
        let now = Utc::now();
        let response = HttpResponse::new(429, "")
            .with_header("x-ratelimit-reset-tokens", "900ms")
            .with_header("x-ratelimit-reset-requests", "garbage");
        assert_eq!(retry_hint(&response, now), Some(Duration::from_millis(900)));

        let response = HttpResponse::new(429, "")
            .with_header("x-ratelimit-reset-requests", "1s")
            .with_header("x-ratelimit-reset-tokens", "9s");
        assert_eq!(retry_hint(&response, now), Some(Duration::from_secs(1)));

        assert_eq!(retry_hint(&HttpResponse::new(503, ""), now), None);
    }

    #[test]
    fn hint_only_lengthens_the_wait() {
        let backoff = Duration::from_millis(800);
        assert_eq!(effective_delay(None, backoff), backoff);
        assert_eq!(effective_delay(Some(Duration::from_millis(100)), backoff), backoff);
        assert_eq!(
            effective_delay(Some(Duration::from_secs(5)), backoff),
            Duration::from_secs(5)
        );
    }
}
