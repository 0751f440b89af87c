//! Throttle for async operations.
//!
//! A call runs only if at least `interval` has passed since the last call that
//! ran; otherwise it is dropped and the last completed result is returned.
//! Dropped calls are never replayed later.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct LimiterState<T> {
    last_call: Option<Instant>,
    last_result: Option<T>,
}

/// Per-instance throttle; each coordinator owns its own.
#[derive(Debug)]
pub struct RateLimiter<T> {
    interval: Duration,
    state: Mutex<LimiterState<T>>,
}

impl<T: Clone> RateLimiter<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(LimiterState {
                last_call: None,
                last_result: None,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `f` unless a call ran less than `interval` ago.
    ///
    /// Returns `f`'s output, or the previous completed output when throttled
    /// (`None` if nothing has completed yet).
    pub async fn call<F, Fut>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let now = Instant::now();
        {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(last) = state.last_call {
                if now.duration_since(last) < self.interval {
                    return state.last_result.clone();
                }
            }
            state.last_call = Some(now);
        }

        let result = f().await;
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.last_result = Some(result.clone());
        Some(result)
    }
}
