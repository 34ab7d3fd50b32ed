//! Retry policy: decorrelated jitter around any fallible async call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::ports::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Lower bound of every delay, and the seed for the first one.
    pub base_delay: Duration,

    /// Total attempts, the first one included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_attempts)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Next delay: uniform in `[base, 3 * previous]`.
    ///
    /// Not capped; with the default three attempts the ceiling stays small.
    pub fn next_delay<R: Rng + ?Sized>(&self, previous: Duration, rng: &mut R) -> Duration {
        let low = self.base_delay.as_secs_f64();
        let high = (previous.as_secs_f64() * 3.0).max(low);
        Duration::from_secs_f64(rng.gen_range(low..=high))
    }

    /// Retry every error.
    pub async fn run<T, E, F, Fut>(&self, clock: &dyn Clock, label: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(clock, label, op, |_| true).await
    }

    /// Retry only errors for which `retry_if` holds; others come back at once.
    ///
    /// The final error is returned as the operation produced it.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        clock: &dyn Clock,
        label: &str,
        mut op: F,
        retry_if: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts || !retry_if(&err) => return Err(err),
                Err(err) => {
                    // ThreadRng は Send じゃないので await の前に捨てる
                    delay = self.next_delay(delay, &mut rand::thread_rng());
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying"
                    );
                    clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
