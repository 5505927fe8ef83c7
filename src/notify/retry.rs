use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

/// Blocking sleep used between attempts; swapped out in tests.
pub type SleepFn = Arc<dyn Fn(Duration) + Send + Sync>;

pub fn thread_sleep() -> SleepFn {
    Arc::new(std::thread::sleep)
}

/// Delay before retry `k` (1-based): `base * 2^(k-1)`.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Runs `operation` until it succeeds or `retries + 1` attempts are spent.
///
/// Returns the first success or the last error. No jitter is applied.
pub fn retry_with_exponential_backoff<T, E, F>(
    label: &str,
    retries: u32,
    base_delay: Duration,
    sleep: &SleepFn,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let attempts = retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    debug!("[retry] {label} succeeded on attempt {attempt}/{attempts}");
                }
                return Ok(value);
            }
            Err(err) if attempt < attempts => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    "[retry] {label} failed (attempt {attempt}/{attempts}), retrying in {}ms: {err}",
                    delay.as_millis()
                );
                sleep(delay);
                attempt += 1;
            }
            Err(err) => {
                warn!("[retry] {label} failed after {attempts} attempt(s): {err}");
                return Err(err);
            }
        }
    }
}
