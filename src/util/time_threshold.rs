// TimeThreshold - deadline helper with an explicit clock
//
// The beat interpreter and several effects need "has X elapsed since I armed
// this" checks. Taking `Instant` as a parameter instead of sampling the
// system clock keeps the callers deterministic under test.

use std::time::{Duration, Instant};

/// A deadline that can be armed, disarmed and queried against a caller
/// supplied `now`. A disarmed threshold is never met.
#[derive(Debug, Clone, Copy)]
pub struct TimeThreshold {
    deadline: Option<Instant>,
}

impl TimeThreshold {
    /// Create a disarmed threshold.
    pub fn disarmed() -> Self {
        Self { deadline: None }
    }

    /// Create a threshold that is met once `delay` has passed after `now`.
    pub fn armed(now: Instant, delay: Duration) -> Self {
        Self {
            deadline: Some(now + delay),
        }
    }

    /// Arm (or re-arm) the threshold to `now + delay`.
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Disarm the threshold; `is_met` returns false until re-armed.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True if the threshold is armed and its deadline has passed.
    pub fn is_met(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_is_never_met() {
        let threshold = TimeThreshold::disarmed();
        assert!(!threshold.is_armed());
        assert!(!threshold.is_met(Instant::now()));
    }

    #[test]
    fn test_armed_threshold_is_met_after_delay() {
        let start = Instant::now();
        let threshold = TimeThreshold::armed(start, Duration::from_millis(100));

        assert!(threshold.is_armed());
        assert!(!threshold.is_met(start));
        assert!(!threshold.is_met(start + Duration::from_millis(99)));
        assert!(threshold.is_met(start + Duration::from_millis(100)));
        assert!(threshold.is_met(start + Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_delay_is_met_immediately() {
        let start = Instant::now();
        let threshold = TimeThreshold::armed(start, Duration::ZERO);
        assert!(threshold.is_met(start));
    }

    #[test]
    fn test_disarm_then_rearm() {
        let start = Instant::now();
        let mut threshold = TimeThreshold::armed(start, Duration::ZERO);
        assert!(threshold.is_met(start));

        threshold.disarm();
        assert!(!threshold.is_met(start + Duration::from_secs(1)));

        threshold.arm(start, Duration::from_millis(50));
        assert!(threshold.is_met(start + Duration::from_millis(50)));
    }
}
