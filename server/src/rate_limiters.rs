use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::error::{AppError, AppResult};

pub const MS_GRAPH_BUCKET: &str = "ms_graph";
pub const CLAUDE_BUCKET: &str = "claude_api";

pub const MS_GRAPH_RATE: f64 = 10.0;
pub const MS_GRAPH_CAPACITY: u32 = 10;

/// Waits longer than this fail immediately instead of blocking the caller.
const MAX_WAIT_SECS: f64 = 20.0;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by an async consume path and a blocking consume path.
///
/// Refill is computed lazily as `elapsed * rate`, capped at `capacity`. The
/// mutex is held only to inspect and update the balance; sleeps happen with
/// the lock released so other consumers can check the bucket meanwhile.
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

enum Take {
    Taken,
    Wait(Duration),
}

impl TokenBucket {
    pub fn new(rate: f64, capacity: u32) -> Self {
        TokenBucket {
            rate,
            capacity: capacity as f64,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn consume(&self, tokens: u32) -> AppResult<()> {
        match self.try_take(tokens)? {
            Take::Taken => Ok(()),
            Take::Wait(wait) => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for token bucket refill");
                tokio::time::sleep(wait).await;
                match self.try_take(tokens)? {
                    Take::Taken => Ok(()),
                    Take::Wait(_) => Err(AppError::RateLimitExceeded(
                        "failed to get enough tokens even after waiting".to_string(),
                    )),
                }
            }
        }
    }

    /// Blocking twin of [`consume`] for callers embedded in worker threads.
    pub fn consume_blocking(&self, tokens: u32) -> AppResult<()> {
        match self.try_take(tokens)? {
            Take::Taken => Ok(()),
            Take::Wait(wait) => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for token bucket refill (blocking)");
                std::thread::sleep(wait);
                match self.try_take(tokens)? {
                    Take::Taken => Ok(()),
                    Take::Wait(_) => Err(AppError::RateLimitExceeded(
                        "failed to get enough tokens even after waiting".to_string(),
                    )),
                }
            }
        }
    }

    pub fn balance(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        Self::refill(&mut state, self.rate, self.capacity);
        state.tokens
    }

    fn try_take(&self, tokens: u32) -> AppResult<Take> {
        let requested = tokens as f64;
        if requested > self.capacity {
            return Err(AppError::RateLimitExceeded(format!(
                "requested tokens ({tokens}) exceed bucket capacity ({})",
                self.capacity
            )));
        }

        let mut state = self.state.lock().unwrap();
        Self::refill(&mut state, self.rate, self.capacity);

        if state.tokens >= requested {
            state.tokens -= requested;
            return Ok(Take::Taken);
        }

        let missing = requested - state.tokens;
        let wait_secs = missing / self.rate;
        if wait_secs > MAX_WAIT_SECS {
            return Err(AppError::RateLimitExceeded(format!(
                "rate limit exceeded, would require {wait_secs:.2}s wait"
            )));
        }

        Ok(Take::Wait(Duration::from_secs_f64(wait_secs)))
    }

    fn refill(state: &mut BucketState, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(capacity);
        state.last_refill = now;
    }
}

// Process-global buckets, discovered by name so every client of the same
// provider shares one budget.
static BUCKETS: Lazy<Mutex<HashMap<String, Arc<TokenBucket>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn get_bucket(name: &str, rate: f64, capacity: u32) -> Arc<TokenBucket> {
    let mut buckets = BUCKETS.lock().unwrap();
    buckets
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(TokenBucket::new(rate, capacity)))
        .clone()
}
