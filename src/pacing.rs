//! Request pacing between successive downloads and subjects.

use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Keeps at least `min_interval` between consecutive calls to [`wait`](Pacer::wait).
///
/// The first call never sleeps. A zero interval disables pacing.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Sleep until the interval since the previous call has elapsed.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
