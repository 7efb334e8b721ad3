use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Trailing interval counted by every window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindowSnapshot {
    pub provider: String,
    /// Configured ceiling per window; 0 means unlimited.
    pub limit: u32,
    /// Admissions currently inside the trailing window.
    pub in_window: usize,
    /// Time until the oldest admission leaves the window, if the window is full.
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct RateWindow {
    limit: u32,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            stamps: VecDeque::with_capacity(limit as usize),
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.stamps.front() {
            if now.duration_since(oldest) >= window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_full(&self) -> bool {
        self.limit > 0 && self.stamps.len() >= self.limit as usize
    }
}

/// Per-provider sliding-window admission control.
///
/// - Providers that were never registered (or registered with 0) are always admitted
/// - Admission check and timestamp recording happen under one lock
/// - Never sleeps; a denial is returned immediately
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Set (or replace) the requests-per-window ceiling for a provider.
    pub fn register(&self, provider: impl Into<String>, limit: u32) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.insert(provider.into(), RateWindow::new(limit));
    }

    /// Try to admit one call. Records the call on success; records nothing on denial.
    pub fn admit(&self, provider: &str) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(w) = windows.get_mut(provider) else {
            return true;
        };
        if w.limit == 0 {
            return true;
        }

        let now = Instant::now();
        w.prune(now, self.window);
        if w.is_full() {
            return false;
        }
        w.stamps.push_back(now);
        true
    }

    pub fn snapshot(&self, provider: &str) -> Option<RateWindowSnapshot> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let w = windows.get_mut(provider)?;
        let now = Instant::now();
        w.prune(now, self.window);

        let retry_after = if w.is_full() {
            w.stamps
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
        } else {
            None
        };

        Some(RateWindowSnapshot {
            provider: provider.to_string(),
            limit: w.limit,
            in_window: w.stamps.len(),
            retry_after,
        })
    }

    /// Forget every recorded admission, keeping the configured ceilings.
    pub fn reset(&self) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        for w in windows.values_mut() {
            w.stamps.clear();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
