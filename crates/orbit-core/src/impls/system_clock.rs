//! Clock implementations: the real one and a recording one for tests and dry runs.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ports::Clock;

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that never waits.
///
/// `sleep` records the requested duration, moves `now` forward by it and
/// yields once so other tasks get to run.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every sleep requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps().len()
    }

    pub fn count_of(&self, duration: Duration) -> usize {
        self.sleeps().iter().filter(|d| **d == duration).count()
    }
}

#[async_trait]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        {
            let step = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += step;
            self.sleeps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn fixed_clock_records_and_advances() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(t0);

        clock.sleep(Duration::from_secs(3)).await;
        clock.sleep(Duration::from_secs(60)).await;

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3), Duration::from_secs(60)]);
        assert_eq!(clock.now() - t0, chrono::Duration::seconds(63));
        assert_eq!(clock.count_of(Duration::from_secs(3)), 1);
    }
}
