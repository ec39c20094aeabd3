use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct RateBudgetConfig {
    pub requests_per_minute: u32,
    pub time_window: Duration,
}

impl RateBudgetConfig {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            time_window: Duration::from_secs(60),
        }
    }

    pub fn reddit_anonymous() -> Self {
        Self::per_minute(80) // Stay well under Reddit's unauthenticated ceiling
    }

    /// Spacing between two consecutive grants.
    pub fn interval(&self) -> Duration {
        self.time_window / self.requests_per_minute.max(1)
    }
}

/// Pacing primitive shared by every outbound fetch of every monitor.
///
/// Grants are handed out one slot at a time, `interval` apart. Each caller
/// reserves the next free slot under the lock and then sleeps until it, so
/// concurrent callers are served in arrival order and never faster than the
/// configured rate. After an idle period only one grant is immediately
/// available; there is no burst allowance.
#[derive(Debug)]
pub struct RateBudget {
    config: RateBudgetConfig,
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    window_tracker: Mutex<WindowTracker>,
}

impl RateBudget {
    pub fn new(config: RateBudgetConfig) -> Self {
        let interval = config.interval();
        let window_tracker = Mutex::new(WindowTracker::new(config.time_window));

        Self {
            config,
            interval,
            next_slot: Mutex::new(None),
            window_tracker,
        }
    }

    /// Waits for the next slot. Never fails; dropping the future gives the
    /// reserved slot up.
    pub async fn acquire(&self) -> RateBudgetGrant {
        let start_time = Instant::now();

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            tracing::trace!("Rate budget exhausted, waiting {:?}", slot - Instant::now());
            sleep_until(slot).await;
        }

        self.window_tracker.lock().await.record_grant();

        RateBudgetGrant {
            queue_wait_time: start_time.elapsed(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn status(&self) -> RateBudgetStatus {
        let next_slot = *self.next_slot.lock().await;
        let now = Instant::now();
        let mut window_tracker = self.window_tracker.lock().await;
        let window_stats = window_tracker.current_window_stats();

        RateBudgetStatus {
            requests_per_minute: self.config.requests_per_minute,
            interval: self.interval,
            granted_in_window: window_stats.grant_count,
            next_grant_in: next_slot
                .filter(|slot| *slot > now)
                .map(|slot| slot - now),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateBudgetGrant {
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateBudgetStatus {
    pub requests_per_minute: u32,
    pub interval: Duration,
    pub granted_in_window: u32,
    pub next_grant_in: Option<Duration>,
}

impl RateBudgetStatus {
    pub fn requests_remaining_in_window(&self) -> u32 {
        self.requests_per_minute
            .saturating_sub(self.granted_in_window)
    }
}

#[derive(Debug)]
pub struct WindowTracker {
    window_duration: Duration,
    current_window: WindowStats,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowStats {
    pub window_start: Instant,
    pub grant_count: u32,
}

impl WindowTracker {
    pub fn new(window_duration: Duration) -> Self {
        Self {
            window_duration,
            current_window: WindowStats {
                window_start: Instant::now(),
                grant_count: 0,
            },
        }
    }

    pub fn record_grant(&mut self) {
        self.ensure_current_window();
        self.current_window.grant_count += 1;
    }

    pub fn current_window_stats(&mut self) -> WindowStats {
        self.ensure_current_window();
        self.current_window
    }

    fn ensure_current_window(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.current_window.window_start) >= self.window_duration {
            self.current_window = WindowStats {
                window_start: now,
                grant_count: 0,
            };
        }
    }
}
