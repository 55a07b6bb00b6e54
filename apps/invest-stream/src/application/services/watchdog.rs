//! Idle Watchdog
//!
//! The server sends keep-alive pings on an otherwise quiet stream. If nothing
//! at all arrives for longer than the idle timeout, the channel is treated as
//! dead and the session reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

/// Tracks the time of the last inbound frame.
#[derive(Debug)]
pub struct IdleWatchdog {
    timeout: Option<Duration>,
    last_activity: RwLock<Instant>,
    pings: AtomicU64,
}

impl IdleWatchdog {
    /// Create a watchdog. `None` disables the timeout.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            last_activity: RwLock::new(Instant::now()),
            pings: AtomicU64::new(0),
        }
    }

    /// Configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Record that a frame arrived.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Record a keep-alive ping.
    pub fn record_ping(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
        self.record_activity();
    }

    /// Pings seen so far.
    #[must_use]
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }

    /// Time since the last frame.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Instant at which the channel counts as dead, if enabled.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| *self.last_activity.read() + t)
    }

    /// Whether the timeout has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    /// Resolve once the channel has been idle for the whole timeout.
    ///
    /// Never resolves when the timeout is disabled. Activity recorded while
    /// waiting pushes the deadline back.
    pub async fn expired(&self) {
        loop {
            let Some(deadline) = self.deadline() else {
                return std::future::pending().await;
            };
            tokio::time::sleep_until(deadline).await;
            if self.is_expired() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn disabled_watchdog_has_no_deadline() {
        let w = IdleWatchdog::new(None);
        assert!(w.deadline().is_none());
        assert!(!w.is_expired());
    }

    #[test]
    fn ping_counts_as_activity() {
        let w = IdleWatchdog::new(Some(Duration::from_secs(5)));
        w.record_ping();
        w.record_ping();
        assert_eq!(w.pings(), 2);
        assert!(w.idle_for() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let w = IdleWatchdog::new(Some(Duration::from_secs(3)));
        let start = Instant::now();

        w.expired().await;

        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(w.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_pushes_deadline_back() {
        let w = Arc::new(IdleWatchdog::new(Some(Duration::from_secs(3))));
        let start = Instant::now();

        let feeder = Arc::clone(&w);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            feeder.record_ping();
        });

        w.expired().await;

        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_watchdog_never_fires() {
        let w = IdleWatchdog::new(None);
        let result = tokio::time::timeout(Duration::from_secs(3600), w.expired()).await;
        assert!(result.is_err());
    }
}
