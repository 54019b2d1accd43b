//! Cooldown gate for motion alerts.
//!
//! The throttle only knows about time. The watcher asks `should_alert` when it
//! sees motion and calls `record_alert` once a dispatch has actually been attempted.

use chrono::{DateTime, Local};
use std::time::Duration;

pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(180);

#[derive(Clone, Debug)]
pub struct AlertThrottle {
    cooldown: Duration,
    last_alert: Option<DateTime<Local>>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_alert(&self) -> Option<DateTime<Local>> {
        self.last_alert
    }

    /// True if no alert was ever recorded, or the cooldown has fully elapsed.
    ///
    /// A clock that steps backwards counts as "not elapsed".
    pub fn should_alert(&self, now: DateTime<Local>) -> bool {
        match self.last_alert {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.cooldown)
                .unwrap_or(false),
        }
    }

    pub fn record_alert(&mut self, now: DateTime<Local>) {
        self.last_alert = Some(now);
    }

    /// Time left before another alert is allowed.
    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        match self.last_alert {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                self.cooldown.saturating_sub(elapsed)
            }
        }
    }
}

impl Default for AlertThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Local> {
        Local
            .timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn first_alert_is_always_allowed() {
        let throttle = AlertThrottle::default();
        assert!(throttle.should_alert(at(0)));
        assert!(throttle.should_alert(at(-1_000_000)));
        assert_eq!(throttle.remaining(at(0)), Duration::ZERO);
    }

    #[test]
    fn cooldown_blocks_until_it_elapses() {
        let mut throttle = AlertThrottle::default();
        throttle.record_alert(at(0));
        for t in [0, 1, 90, 179] {
            assert!(!throttle.should_alert(at(t)), "t={t}");
        }
        assert!(throttle.should_alert(at(180)));
        assert!(throttle.should_alert(at(10_000)));
        assert_eq!(throttle.remaining(at(100)), Duration::from_secs(80));
    }

    #[test]
    fn sub_second_before_cooldown_is_blocked() {
        let mut throttle = AlertThrottle::default();
        throttle.record_alert(at(0));
        let almost = at(179) + chrono::Duration::milliseconds(999);
        assert!(!throttle.should_alert(almost));
    }

    #[test]
    fn backwards_clock_does_not_reopen_the_gate() {
        let mut throttle = AlertThrottle::default();
        throttle.record_alert(at(100));
        assert!(!throttle.should_alert(at(50)));
    }

    #[test]
    fn new_record_restarts_the_window() {
        let mut throttle = AlertThrottle::new(Duration::from_secs(10));
        throttle.record_alert(at(0));
        throttle.record_alert(at(10));
        assert!(!throttle.should_alert(at(15)));
        assert!(throttle.should_alert(at(20)));
        assert_eq!(throttle.last_alert(), Some(at(10)));
    }
}
