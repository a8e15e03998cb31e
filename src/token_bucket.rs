//! Fixed-capacity token bucket rate limiter (spec §4.1).
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio::time::interval;

/// `{tokens_per_fill, fill_interval, max_tokens}` rate limiter.
///
/// `acquire` is non-blocking and linearizable via a compare-exchange loop on
/// an `AtomicU64`. Refill happens on a background task started by
/// [`TokenBucket::start`]; dropping or [`TokenBucket::close`]-ing the bucket
/// aborts that task. `start`/`close` take `&self` (the refill-task handle is
/// behind a mutex) so a `TokenBucket` can live inside an `Arc`-shared broker
/// without an outer lock.
#[derive(Debug)]
pub struct TokenBucket {
    tokens_per_fill: u64,
    fill_interval: Duration,
    max_tokens: u64,
    tokens: Arc<AtomicU64>,
    refill_task: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucket {
    #[must_use]
    pub fn new(tokens_per_fill: u64, fill_interval: Duration, max_tokens: u64) -> Self {
        Self {
            tokens_per_fill,
            fill_interval,
            max_tokens,
            tokens: Arc::new(AtomicU64::new(max_tokens.min(tokens_per_fill))),
            refill_task: Mutex::new(None),
        }
    }

    /// Begin periodic refill. Idempotent: a second call is a no-op while the
    /// first refill task is still running.
    pub fn start(&self) {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut refill_task = self.refill_task.lock().unwrap();
        if refill_task.is_some() {
            return;
        }
        let tokens = Arc::clone(&self.tokens);
        let tokens_per_fill = self.tokens_per_fill;
        let max_tokens = self.max_tokens;
        let fill_interval = self.fill_interval.max(Duration::from_millis(1));
        *refill_task = Some(tokio::spawn(async move {
            let mut tick = interval(fill_interval);
            loop {
                tick.tick().await;
                tokens
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        Some(current.saturating_add(tokens_per_fill).min(max_tokens))
                    })
                    .ok();
            }
        }));
    }

    /// Attempt to take one token. Returns `true` iff a token was available.
    pub fn acquire(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current >= 1 {
                    Some(current.saturating_sub(1))
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Stop the refill task, if any.
    pub fn close(&self) {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut refill_task = self.refill_task.lock().unwrap();
        if let Some(task) = refill_task.take() {
            task.abort();
        }
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_without_start_drains_initial_grant_then_fails() {
        let bucket = TokenBucket::new(2, Duration::from_secs(1), 2);
        assert!(bucket.acquire());
        assert!(bucket.acquire());
        assert!(!bucket.acquire());
    }

    #[tokio::test]
    async fn start_refills_up_to_max_tokens() {
        let bucket = TokenBucket::new(1, Duration::from_millis(10), 1);
        assert!(bucket.acquire());
        assert!(!bucket.acquire());
        bucket.start();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(bucket.acquire());
        bucket.close();
    }

    #[test]
    fn close_without_start_does_not_panic() {
        let bucket = TokenBucket::new(1, Duration::from_millis(10), 1);
        bucket.close();
    }
}
