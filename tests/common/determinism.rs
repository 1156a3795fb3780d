//! Deterministic identifiers and timestamps for reproducible fixtures.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Fixed base timestamp (2024-01-01 00:00:00 UTC)
pub const TEST_TIMESTAMP: &str = "2024-01-01T00:00:00Z";

pub fn test_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(TEST_TIMESTAMP)
        .expect("Invalid test timestamp")
        .with_timezone(&Utc)
}

/// Hands out sequential UUIDs and timestamps one millisecond apart.
pub struct DeterministicClock {
    counter: AtomicU64,
}

impl DeterministicClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    /// Next record ID, as the string form of a sequential UUID.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Uuid::from_u128(n as u128).to_string()
    }

    /// Timestamp for the most recently issued ID.
    pub fn now(&self) -> DateTime<Utc> {
        let n = self.counter.load(Ordering::SeqCst) as i64;
        test_now() + Duration::milliseconds(n)
    }
}

impl Default for DeterministicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_clock_ids_are_sequential_and_distinct() {
        let clock = DeterministicClock::new();
        let first = clock.next_id();
        let second = clock.next_id();
        assert_ne!(first, second);
        assert_eq!(first, Uuid::from_u128(1).to_string());
    }

    #[test]
    fn test_clock_time_advances_with_ids() {
        let clock = DeterministicClock::new();
        clock.next_id();
        let earlier = clock.now();
        clock.next_id();
        assert!(clock.now() > earlier);
        assert_eq!(test_now().year(), 2024);
    }
}
