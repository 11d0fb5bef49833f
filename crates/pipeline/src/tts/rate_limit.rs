//! Synthesis API pacing
//!
//! Spaces calls at `60 / max_requests_per_minute` seconds for large jobs and
//! uses a short fixed delay for small ones. The call baseline lives in the
//! limiter, so every job sharing a limiter shares the pacing.

use std::future::Future;
use std::time::Duration;

use karaoke_tts_config::RateLimitConfig;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::SynthesisError;

/// Rate limiter for synthesis calls
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// When the most recent call was issued
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_call: Mutex::new(None),
        }
    }

    /// Minimum spacing between calls for large jobs
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.config.max_requests_per_minute.max(1) as f64)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.config.cooldown_secs)
    }

    /// Delay before call `call_index` of `total_calls`
    pub fn compute_delay(
        &self,
        call_index: usize,
        total_calls: usize,
        elapsed_since_previous: Option<Duration>,
    ) -> Duration {
        if call_index == 0 {
            return Duration::ZERO;
        }
        if total_calls <= self.config.burst_max_calls {
            return Duration::from_millis(self.config.burst_delay_ms);
        }
        match elapsed_since_previous {
            Some(elapsed) => self.min_interval().saturating_sub(elapsed),
            None => Duration::ZERO,
        }
    }

    /// Sleep as needed before a call; returns the delay applied
    pub async fn wait_before_call(
        &self,
        call_index: usize,
        total_calls: usize,
        previous_call: Option<Instant>,
    ) -> Duration {
        let elapsed = previous_call.map(|at| Instant::now().saturating_duration_since(at));
        let delay = self.compute_delay(call_index, total_calls, elapsed);

        if !delay.is_zero() {
            if total_calls <= self.config.burst_max_calls {
                tracing::debug!(call_index, total_calls, "Burst mode delay");
            } else {
                tracing::info!(
                    call_index,
                    total_calls,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limiting delay"
                );
            }
            tokio::time::sleep(delay).await;
        }

        delay
    }

    /// Wait against the limiter's own baseline, then record this call
    pub async fn pace(&self, call_index: usize, total_calls: usize) -> Duration {
        let previous = *self.last_call.lock();
        let delay = self.wait_before_call(call_index, total_calls, previous).await;
        self.mark_call();
        delay
    }

    fn mark_call(&self) {
        *self.last_call.lock() = Some(Instant::now());
    }

    /// Run `op`, retrying exactly once after the cooldown on HTTP 429
    pub async fn call_with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, SynthesisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SynthesisError>>,
    {
        match op().await {
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    cooldown_secs = self.config.cooldown_secs,
                    "Synthesis provider returned 429, retrying once after cooldown"
                );
                tokio::time::sleep(self.cooldown()).await;
                self.mark_call();
                op().await
            }
            other => other,
        }
    }
}
