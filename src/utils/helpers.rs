//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application.

use std::sync::OnceLock;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .unwrap_or_else(|_| unreachable!("email pattern is a valid regex"))
    })
}

/// Validate email format
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// Normalize an email for uniqueness comparisons
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// End of the start date (23:59 UTC), used when an event has no explicit end
pub fn default_end_time(start: DateTime<Utc>) -> DateTime<Utc> {
    let end_of_day = start.date_naive().and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default());
    Utc.from_utc_datetime(&end_of_day)
}

/// Format a timestamp for display
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Generate a random uppercase alphanumeric string without ambiguous characters
pub fn generate_random_string(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Truncate text to a maximum length with ellipsis
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("guest@example.com"));
        assert!(is_valid_email("  first.last+rsvp@mail.example.org "));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Guest@Example.COM "), "guest@example.com");
    }

    #[test]
    fn test_default_end_time() {
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 18, 30, 0).unwrap();
        let end = default_end_time(start);
        assert_eq!(end.date_naive(), start.date_naive());
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 0));
    }

    #[test]
    fn test_random_string() {
        let value = generate_random_string(6);
        assert_eq!(value.len(), 6);
        assert!(value.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 8), "hello...");
    }
}
