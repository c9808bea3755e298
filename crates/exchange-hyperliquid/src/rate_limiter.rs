//! Outbound request pacing for the Hyperliquid REST API.
//!
//! Two limits apply to every request:
//! - a minimum spacing between consecutive issuances, enforced by a `governor` GCRA quota of one
//!   cell per `min_interval`;
//! - a per-minute cap over a sliding 60 second window. The window is empty again after 60
//!   seconds without an issuance, and a capped caller waits until the oldest counted issuance
//!   leaves the window.
//!
//! The limiter is an ordinary value owned by whoever builds the gateway. Callers share it through
//! an `Arc`; the internal mutex is held across both waits so issuance order is FIFO.

use funding_arb_core::config::RateLimitConfig;
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Length of the sliding cap window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// `governor` clock reading tokio time, so spacing follows paused time in tests.
#[derive(Debug, Clone)]
struct TokioClock {
    origin: Instant,
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

type SpacingLimiter =
    governor::RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

// =============================================================================
// State
// =============================================================================

/// Snapshot of the limiter bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub last_request_at: Option<Instant>,
    /// Issuances inside the trailing window.
    pub requests_this_window: u32,
    /// Oldest issuance still counted against the cap.
    pub window_started_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Window {
    issued: VecDeque<Instant>,
    last_request_at: Option<Instant>,
}

impl Window {
    fn expire(&mut self, now: Instant) {
        if self
            .last_request_at
            .is_some_and(|last| now.duration_since(last) > WINDOW)
        {
            self.issued.clear();
        }
        while self
            .issued
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= WINDOW)
        {
            self.issued.pop_front();
        }
    }

    fn snapshot(&self) -> RateLimitState {
        RateLimitState {
            last_request_at: self.last_request_at,
            requests_this_window: u32::try_from(self.issued.len()).unwrap_or(u32::MAX),
            window_started_at: self.issued.front().copied(),
        }
    }
}

// =============================================================================
// RateLimiter
// =============================================================================

pub struct RateLimiter {
    clock: TokioClock,
    /// `None` when no spacing is configured.
    spacing: Option<SpacingLimiter>,
    max_per_minute: u32,
    window: Mutex<Window>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("spaced", &self.spacing.is_some())
            .field("max_per_minute", &self.max_per_minute)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// A `max_per_minute` of zero is treated as one.
    #[must_use]
    pub fn new(min_interval: Duration, max_per_minute: u32) -> Self {
        let clock = TokioClock {
            origin: Instant::now(),
        };
        let spacing = Quota::with_period(min_interval)
            .map(|quota| governor::RateLimiter::direct_with_clock(quota, &clock));

        Self {
            clock,
            spacing,
            max_per_minute: max_per_minute.max(1),
            window: Mutex::new(Window::default()),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.max_per_minute,
        )
    }

    /// No spacing and no practical cap. Meant for tests against local mock servers.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, u32::MAX)
    }

    /// Waits until one request may be issued, then records the issuance.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        loop {
            let now = Instant::now();
            window.expire(now);
            if window.issued.len() < self.max_per_minute as usize {
                break;
            }
            let Some(&oldest) = window.issued.front() else {
                break;
            };
            let until = oldest + WINDOW;
            debug!(
                wait_ms = until.saturating_duration_since(now).as_millis(),
                cap = self.max_per_minute,
                "Per-minute request cap reached"
            );
            tokio::time::sleep_until(until).await;
        }

        // Spacing goes last: a cap wait only pushes issuance later, which keeps the window valid.
        if let Some(spacing) = &self.spacing {
            while let Err(not_until) = spacing.check() {
                let wait = not_until.wait_time_from(self.clock.now());
                debug!(wait_ms = wait.as_millis(), "Spacing outbound request");
                tokio::time::sleep(wait).await;
            }
        }

        let now = Instant::now();
        window.issued.push_back(now);
        window.last_request_at = Some(now);
    }

    pub async fn state(&self) -> RateLimitState {
        self.window.lock().await.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Largest number of issuances inside any half-open `WINDOW` starting at an issuance.
    fn max_in_any_window(issued: &[Duration]) -> usize {
        issued
            .iter()
            .map(|start| {
                issued
                    .iter()
                    .filter(|t| **t >= *start && **t - *start < WINDOW)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(3), 20);
        let start = Instant::now();

        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        let state = limiter.state().await;
        assert_eq!(state.requests_this_window, 1);
        assert_eq!(state.window_started_at, Some(start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_spacing() {
        let limiter = RateLimiter::new(Duration::from_secs(3), 20);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_minute_cap_waits_for_oldest_to_expire() {
        let limiter = RateLimiter::new(Duration::ZERO, 3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert_eq!(start.elapsed(), WINDOW);

        let state = limiter.state().await;
        assert_eq!(state.requests_this_window, 1);
        assert_eq!(state.window_started_at, Some(start + WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_idle_minute() {
        let limiter = RateLimiter::new(Duration::ZERO, 2);
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        let before = Instant::now();
        limiter.acquire().await;

        assert_eq!(before.elapsed(), Duration::ZERO);
        let state = limiter.state().await;
        assert_eq!(state.requests_this_window, 1);
        assert_eq!(state.window_started_at, Some(before));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(3), 20));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort();

        for pair in issued.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_secs(3));
        }
        assert_eq!(issued[3].duration_since(start), Duration::from_secs(9));
        assert_eq!(limiter.state().await.requests_this_window, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_straddling_a_minute_stays_under_cap() {
        let limiter = RateLimiter::new(Duration::ZERO, 3);
        let start = Instant::now();
        let mut issued = Vec::new();

        limiter.acquire().await;
        issued.push(start.elapsed());

        tokio::time::sleep_until(start + Duration::from_secs(59)).await;
        for _ in 0..2 {
            limiter.acquire().await;
            issued.push(start.elapsed());
        }

        tokio::time::sleep_until(start + Duration::from_millis(60_500)).await;
        for _ in 0..3 {
            limiter.acquire().await;
            issued.push(start.elapsed());
        }

        // The call at 0 s has expired by 60.5 s; the two at 59 s have not.
        assert_eq!(issued[3], Duration::from_millis(60_500));
        assert_eq!(issued[4], Duration::from_secs(119));
        assert_eq!(issued[5], Duration::from_secs(119));
        assert!(max_in_any_window(&issued) <= 3, "issued at {issued:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_never_exceeded_in_any_sliding_window() {
        let limiter = RateLimiter::new(Duration::from_millis(100), 5);
        let start = Instant::now();
        let mut issued = Vec::new();

        for round in 0u64..30 {
            limiter.acquire().await;
            issued.push(start.elapsed());
            assert!(limiter.state().await.requests_this_window <= 5);
            // Irregular gaps so bursts land at different offsets within the minute.
            tokio::time::sleep(Duration::from_millis(round * 1_700 % 13_000)).await;
        }

        assert_eq!(max_in_any_window(&issued), 5, "issued at {issued:?}");
        for pair in issued.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }
}
