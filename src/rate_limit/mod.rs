// Token-bucket admission control for durable pull consumption.
//
// Tokens accumulate at `rate_limit` per second up to `rate_burst`.
// Acquisition happens before each fetch call so that waiting on the
// limiter never consumes acknowledgment-deadline time.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Refills based on elapsed time, capped at capacity.
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token-bucket rate limiter.
///
/// The bucket starts full, so a burst of up to `rate_burst` proceeds
/// immediately after startup.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Creates a limiter with `rate_limit` tokens/second and a bucket
    /// capacity of `rate_burst`. Both must be positive; config validation
    /// guarantees this, and a zero rate limit constructs no limiter at all.
    pub fn new(rate_limit: u32, rate_burst: u32) -> Self {
        Self {
            rate: f64::from(rate_limit),
            capacity: f64::from(rate_burst),
            bucket: Mutex::new(TokenBucket {
                tokens: f64::from(rate_burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Waits until `n` tokens are available, then consumes them.
    ///
    /// Requests larger than the bucket capacity are clamped to it, since
    /// they could otherwise never be satisfied.
    pub async fn acquire(&self, n: u32) {
        let want = f64::from(n).min(self.capacity);
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(self.rate, self.capacity);
                if bucket.tokens >= want {
                    bucket.tokens -= want;
                    return;
                }
                Duration::from_secs_f64((want - bucket.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
