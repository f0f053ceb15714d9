use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

/// Token bucket guarding outbound RPC traffic. Rate and burst are both the
/// configured requests-per-second; this is the only process-wide shared
/// mutable state in the crate.
pub struct RateLimiter {
    state: Mutex<Bucket>,
    rate: u32,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rate = requests_per_second.max(1);
        Self {
            state: Mutex::new(Bucket {
                tokens: rate as f64,
                last_refill: Instant::now(),
            }),
            rate,
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Takes one token, sleeping until the bucket refills. The sleep is a
    /// plain await point, so cancelling the surrounding task releases the
    /// slot immediately.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate as f64).min(self.rate as f64);
                bucket.last_refill = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64(
                        (1.0 - bucket.tokens) / self.rate as f64,
                    ))
                }
            };
            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }

    /// Non-blocking variant; true when a token was available.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate as f64).min(self.rate as f64);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
