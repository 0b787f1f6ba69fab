use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Spaces outbound LLM calls at least `min_interval` apart.
///
/// Callers queue on the mutex, so concurrent requests are released one at a
/// time in arrival order.
#[derive(Debug)]
pub struct LlmThrottle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl LlmThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait for the next slot and claim it.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "throttling LLM call"
                );
                sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
