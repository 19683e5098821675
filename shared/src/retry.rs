use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded retry with a fixed delay, for reaching the database and the broker
/// at startup.
#[derive(Debug, Clone, Copy)]
pub struct StartupRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for StartupRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(2000),
        }
    }
}

impl StartupRetry {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Runs `op` until it succeeds or the attempts run out, returning the
    /// last error in that case.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(what, attempt, "connected after retrying");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        what,
                        attempt,
                        attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        "connection failed, retrying: {:#}", e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("{} unreachable after {} attempts", what, attempts)));
                }
            }
        }
    }
}
