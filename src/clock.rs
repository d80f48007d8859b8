//! Wall-clock abstraction.
//!
//! Every time-dependent decision (eligibility, messaging window, dedup day,
//! pacing) goes through a [`Clock`] so batches can be replayed in tests
//! without real waiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};

/// Clinic-local time source plus an awaitable sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current clinic-local date and time.
    fn now(&self) -> NaiveDateTime;

    /// Current calendar day (midnight-normalised "today").
    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Suspend the current batch for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock. `sleep` advances the time instead of waiting.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            slept: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero());
        self.advance(delta);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn manual_sleep_advances_time() {
        let clock = ManualClock::new(at(18, 58));
        clock.sleep(Duration::from_secs(120)).await;
        assert_eq!(clock.now(), at(19, 0));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(120)]);
    }

    #[test]
    fn today_drops_time_of_day() {
        let clock = ManualClock::new(at(23, 59));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }
}
