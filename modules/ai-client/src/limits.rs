use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

fn default_rpm() -> u32 {
    500
}

fn default_tpm() -> u32 {
    150_000
}

/// Requests/tokens-per-minute budget shared by every LLM call in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLimits {
    #[serde(default = "default_rpm")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_tpm")]
    pub max_tokens_per_minute: u32,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_rpm(),
            max_tokens_per_minute: default_tpm(),
        }
    }
}

/// Sliding-window limiter over the last 60 seconds of requests.
pub struct RequestLimiter {
    limits: RequestLimits,
    window: Mutex<VecDeque<(Instant, u32)>>,
}

impl RequestLimiter {
    pub fn new(limits: RequestLimits) -> Self {
        Self {
            limits,
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limits(&self) -> RequestLimits {
        self.limits
    }

    /// Wait until a request of `tokens` fits in the budget, then record it.
    pub async fn acquire(&self, tokens: u32) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                prune(&mut window, now);
                let wait = wait_time(&window, now, self.limits, tokens);
                if wait.is_zero() {
                    window.push_back((now, tokens));
                    return;
                }
                wait
            };
            debug!(wait_ms = wait.as_millis() as u64, tokens, "LLM budget exhausted, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

fn prune(window: &mut VecDeque<(Instant, u32)>, now: Instant) {
    while let Some(&(at, _)) = window.front() {
        if now.duration_since(at) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// How long until a request of `tokens` fits. Zero means it fits now.
///
/// A request larger than the whole token budget is let through once the
/// window is empty.
pub(crate) fn wait_time(
    window: &VecDeque<(Instant, u32)>,
    now: Instant,
    limits: RequestLimits,
    tokens: u32,
) -> Duration {
    if window.is_empty() {
        return Duration::ZERO;
    }

    let requests_ok = (window.len() as u32) < limits.max_requests_per_minute;
    let used: u64 = window.iter().map(|&(_, t)| t as u64).sum();
    let tokens_ok = used + tokens as u64 <= limits.max_tokens_per_minute as u64;
    if requests_ok && tokens_ok {
        return Duration::ZERO;
    }

    // Find the oldest entry whose expiry frees enough room.
    let mut freed_requests = 0u32;
    let mut freed_tokens = 0u64;
    for &(at, t) in window {
        freed_requests += 1;
        freed_tokens += t as u64;
        let requests_fit = window.len() as u32 - freed_requests < limits.max_requests_per_minute;
        let tokens_fit = used - freed_tokens + tokens as u64 <= limits.max_tokens_per_minute as u64
            || freed_requests as usize == window.len();
        if requests_fit && tokens_fit {
            let expires = at + WINDOW;
            return expires.saturating_duration_since(now);
        }
    }
    WINDOW
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: u32, tpm: u32) -> RequestLimits {
        RequestLimits {
            max_requests_per_minute: rpm,
            max_tokens_per_minute: tpm,
        }
    }

    #[test]
    fn empty_window_always_fits() {
        let now = Instant::now();
        assert_eq!(
            wait_time(&VecDeque::new(), now, limits(1, 10), 1_000),
            Duration::ZERO
        );
    }

    #[test]
    fn request_cap_waits_for_oldest_to_expire() {
        let start = Instant::now();
        let window: VecDeque<_> = [(start, 10), (start + Duration::from_secs(10), 10)].into();
        let now = start + Duration::from_secs(20);
        assert_eq!(
            wait_time(&window, now, limits(2, 10_000), 10),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn token_cap_waits_until_enough_tokens_expire() {
        let start = Instant::now();
        let window: VecDeque<_> = [
            (start, 600),
            (start + Duration::from_secs(5), 300),
            (start + Duration::from_secs(30), 50),
        ]
        .into();
        let now = start + Duration::from_secs(31);
        // 950 used, 800 more needs 750 freed: the first two must expire.
        assert_eq!(
            wait_time(&window, now, limits(100, 1_000), 800),
            Duration::from_secs(34)
        );
    }

    #[test]
    fn within_budget_does_not_wait() {
        let start = Instant::now();
        let window: VecDeque<_> = [(start, 100)].into();
        assert_eq!(
            wait_time(&window, start, limits(10, 1_000), 200),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn acquire_records_requests() {
        let limiter = RequestLimiter::new(limits(10, 1_000));
        limiter.acquire(100).await;
        limiter.acquire(100).await;
        assert_eq!(limiter.window.lock().await.len(), 2);
    }
}
