//! Platform Rate-Limit Error Classification
//!
//! Platform SDKs report throttling in free-form error messages. Everything
//! that inspects those messages lives here so it can be swapped for
//! structured error codes later.

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

/// Fallback wait when a throttling message carries no hint
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Substrings (lowercase) that mark a message as a rate-limit signal
const RATE_LIMIT_MARKERS: [&str; 4] = [
    "rate limit",
    "too many requests",
    "quota exceeded",
    "rate_limit_exceeded",
];

lazy_static! {
    static ref RETRY_AFTER_PATTERN: Regex =
        Regex::new(r"(?i)retry after (\d+)|wait (\d+) seconds").expect("valid retry-after regex");
}

/// Outcome of inspecting a failed unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The platform throttled the call
    RateLimited { retry_after: Duration },
    /// Anything else
    Other,
}

/// Classify an error from a unit of work.
///
/// The full error chain is inspected, so context added with `anyhow` does
/// not hide the platform message.
pub fn classify(error: &anyhow::Error) -> ErrorClass {
    let message = format!("{:#}", error);
    classify_message(&message)
}

/// Classify a raw error message
pub fn classify_message(message: &str) -> ErrorClass {
    if is_rate_limit_message(message) {
        ErrorClass::RateLimited {
            retry_after: extract_retry_after(message),
        }
    } else {
        ErrorClass::Other
    }
}

/// Whether a message reports platform throttling
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Pull a retry hint out of a message, defaulting to 60 seconds
pub fn extract_retry_after(message: &str) -> Duration {
    RETRY_AFTER_PATTERN
        .captures(message)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detects_markers_case_insensitively() {
        assert!(is_rate_limit_message("Rate limit exceeded"));
        assert!(is_rate_limit_message("HTTP 429: Too Many Requests"));
        assert!(is_rate_limit_message("Daily QUOTA EXCEEDED for project"));
        assert!(is_rate_limit_message("error code RATE_LIMIT_EXCEEDED"));
        assert!(!is_rate_limit_message("Connection refused"));
        assert!(!is_rate_limit_message("rate-limited"));
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(extract_retry_after("retry after 60 seconds"), Duration::from_secs(60));
        assert_eq!(extract_retry_after("wait 30 seconds"), Duration::from_secs(30));
        assert_eq!(extract_retry_after("Retry after 120"), Duration::from_secs(120));
        assert_eq!(extract_retry_after("Rate limit exceeded"), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_extract_uses_first_match() {
        assert_eq!(
            extract_retry_after("Please wait 15 seconds, or retry after 90"),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_classify_error_chain() {
        let err = anyhow::anyhow!("Rate limit exceeded, retry after 45")
            .context("google_ads campaigns sync failed");
        assert_eq!(
            classify(&err),
            ErrorClass::RateLimited {
                retry_after: Duration::from_secs(45)
            }
        );
    }

    #[test]
    fn test_classify_other() {
        let err = anyhow::anyhow!("invalid OAuth token");
        assert_eq!(classify(&err), ErrorClass::Other);
    }

    proptest! {
        #[test]
        fn prop_retry_after_roundtrips(n in 0u64..1_000_000) {
            let message = format!("Too many requests, retry after {} seconds", n);
            prop_assert_eq!(
                classify_message(&message),
                ErrorClass::RateLimited { retry_after: Duration::from_secs(n) }
            );
        }

        #[test]
        fn prop_messages_without_markers_are_other(msg in "[a-z0-9 ]{0,40}") {
            prop_assume!(!msg.contains("rate limit") && !msg.contains("too many requests")
                && !msg.contains("quota exceeded"));
            prop_assert_eq!(classify_message(&msg), ErrorClass::Other);
        }
    }
}
