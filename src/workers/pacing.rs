use std::time::Duration;
use tokio::time::{sleep, Instant};

// ---------------------------------------------------------------------------
// Fixed-Interval Gate
// ---------------------------------------------------------------------------

/// Enforces a minimum gap between batch items as backpressure against the
/// gateways. The first call passes immediately; each later call sleeps until
/// the configured interval has elapsed since the previous pass.
///
/// One pacer belongs to one batch run. It is not a throughput optimization
/// and must not be bypassed under load.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_pass: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_pass: None,
        }
    }

    /// Waits out the remainder of the interval, then records this pass.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_pass {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        self.last_pass = Some(Instant::now());
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
