// Time Provider Port (for testability)

use chrono::{DateTime, TimeZone, Utc};

/// Wall-clock source (allows fixed cycle dates in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Current time as a UTC timestamp
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::*;

    /// Clock frozen at a given instant
    pub struct FixedTimeProvider {
        millis: i64,
    }

    impl FixedTimeProvider {
        pub fn new(millis: i64) -> Self {
            Self { millis }
        }

        /// Midnight UTC of the given date
        pub fn at_date(year: i32, month: u32, day: u32) -> Self {
            let millis = Utc
                .with_ymd_and_hms(year, month, day, 0, 0, 0)
                .single()
                .map(|dt| dt.timestamp_millis())
                .unwrap_or_default();
            Self::new(millis)
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.millis
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::FixedTimeProvider;
    use super::*;

    #[test]
    fn test_fixed_date() {
        let clock = FixedTimeProvider::at_date(2024, 1, 1);
        assert_eq!(clock.now().format("%Y-%m-%d").to_string(), "2024-01-01");
    }
}
