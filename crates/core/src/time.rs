use chrono::{DateTime, Duration, Utc};

/// Source of the timestamps stored in a [`ViolationLog`](crate::model::ViolationLog).
///
/// The countdown runs on the async runtime's timer and never reads this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Frozen(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Frozen(at) => *at,
        }
    }
}

// 2023-11-14T22:13:20Z
const TEST_EPOCH_SECS: i64 = 1_700_000_000;

/// The instant every frozen test clock reports.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(TEST_EPOCH_SECS)
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::Frozen(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_clock_never_moves() {
        let clock = fixed_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().timestamp(), TEST_EPOCH_SECS);
    }

    #[test]
    fn system_clock_is_the_default() {
        assert_eq!(Clock::default(), Clock::System);
        assert!(Clock::System.now() > fixed_now());
    }
}
