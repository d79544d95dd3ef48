//! Classification of API error messages and backoff timing
//!
//! Error responses are JSON objects with a `message` field. Rate limits are told
//! apart by substrings of that message, matched case-insensitively.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use std::time::Duration;

/// Header carrying the epoch second at which the primary quota resets
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Meaning of an API error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiSignal {
    /// Quota exhausted; wait for the reset window
    PrimaryRateLimit,

    /// Abuse throttling; wait a fixed cool-down
    SecondaryRateLimit,

    /// The resource has no content (e.g. an empty repository)
    Empty,

    /// Any other error
    Error(String),
}

/// Classifies the `message` of an error response
pub fn classify_message(message: &str) -> ApiSignal {
    let lowered = message.to_lowercase();

    // Secondary messages also mention "rate limit", so they are checked first
    if lowered.contains("secondary rate") {
        ApiSignal::SecondaryRateLimit
    } else if lowered.contains("rate limit exceeded") {
        ApiSignal::PrimaryRateLimit
    } else if lowered.contains("empty") {
        ApiSignal::Empty
    } else {
        ApiSignal::Error(message.to_string())
    }
}

/// Time to wait after a primary rate limit
///
/// Uses the reset timestamp when the server sent one (plus one second of margin),
/// otherwise waits until the next full hour. Never returns less than one second.
pub fn primary_backoff(reset_header: Option<&str>, now: DateTime<Utc>) -> Duration {
    let resume_at = reset_header
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))
        .map(|reset| reset + ChronoDuration::seconds(1))
        .unwrap_or_else(|| next_hour(now));

    (resume_at - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_secs(1))
}

fn next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(ChronoDuration::hours(1))
        .map(|hour| hour + ChronoDuration::hours(1))
        .unwrap_or(now + ChronoDuration::hours(1))
}
