//! Time source used by polling loops and workflows
//!
//! Polling never calls `tokio::time` directly; it goes through a [`Clock`]
//! so tests can drive timeouts with a [`FakeClock`] that advances virtual
//! time instead of sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Monotonic time, wall-clock time and sleeping
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic instant used to measure elapsed polling time
    fn now(&self) -> Instant;

    /// Wall-clock time used to compute expire and filter timestamps
    fn utc_now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeClock;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug)]
    struct FakeState {
        offset: Duration,
        sleeps: Vec<Duration>,
    }

    /// Virtual clock: `sleep` returns immediately and moves time forward.
    ///
    /// Clones share the same timeline, so a test can keep a handle while the
    /// facade owns another.
    #[derive(Debug, Clone)]
    pub struct FakeClock {
        origin: Instant,
        utc_origin: DateTime<Utc>,
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeClock {
        pub fn new(utc_origin: DateTime<Utc>) -> Self {
            Self {
                origin: Instant::now(),
                utc_origin,
                state: Arc::new(Mutex::new(FakeState {
                    offset: Duration::ZERO,
                    sleeps: Vec::new(),
                })),
            }
        }

        fn state(&self) -> MutexGuard<'_, FakeState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Move virtual time forward without recording a sleep
        pub fn advance(&self, duration: Duration) {
            self.state().offset += duration;
        }

        /// Total virtual time elapsed since creation
        pub fn elapsed(&self) -> Duration {
            self.state().offset
        }

        /// Every sleep requested so far, in order
        pub fn sleeps(&self) -> Vec<Duration> {
            self.state().sleeps.clone()
        }
    }

    impl Default for FakeClock {
        fn default() -> Self {
            Self::new(Utc::now())
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.origin + self.state().offset
        }

        fn utc_now(&self) -> DateTime<Utc> {
            let offset = self.state().offset;
            self.utc_origin
                + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero())
        }

        async fn sleep(&self, duration: Duration) {
            let mut state = self.state();
            state.offset += duration;
            state.sleeps.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_clock_advances_on_sleep() {
        let origin: DateTime<Utc> = "2024-05-01T00:00:00Z".parse().unwrap();
        let clock = FakeClock::new(origin);
        let start = clock.now();

        clock.sleep(Duration::from_secs(30)).await;
        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now() - start, Duration::from_secs(35));
        assert_eq!(clock.elapsed(), Duration::from_secs(35));
        assert_eq!(clock.utc_now(), origin + chrono::Duration::seconds(35));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_fake_clock_clones_share_timeline() {
        let clock = FakeClock::default();
        let handle = clock.clone();
        clock.sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.elapsed(), Duration::from_secs(10));
    }
}
