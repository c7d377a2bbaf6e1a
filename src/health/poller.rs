use super::checker::LagChecker;
use crate::connection::config::{
    ConnectionConfig, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_DELAY_THRESHOLD_SECS,
};
use crate::connection::pool::ConnectionPool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Rate limiter around a [`LagChecker`]
///
/// [`Poller::check_server`] opens at most one polling window per
/// `check_interval`; the check-and-advance is atomic, so concurrent callers
/// cannot both win the same window.
pub struct Poller {
    checker: Box<dyn LagChecker>,
    check_interval: Duration,
    threshold: Duration,
    /// `None` once expired: the next check is due immediately
    last_checked: Mutex<Option<Instant>>,
}

impl Poller {
    /// The first window opens one `check_interval` from now
    pub fn new(checker: Box<dyn LagChecker>, check_interval: Duration, threshold: Duration) -> Self {
        Self {
            checker,
            check_interval,
            threshold,
            last_checked: Mutex::new(Some(Instant::now())),
        }
    }

    /// Interval and threshold from a replica configuration entry
    pub fn from_config(checker: Box<dyn LagChecker>, config: &ConnectionConfig) -> Self {
        Self::new(
            checker,
            config.check_interval_duration(),
            config.delay_threshold_duration(),
        )
    }

    pub fn with_defaults(checker: Box<dyn LagChecker>) -> Self {
        Self::new(
            checker,
            Duration::from_secs_f64(DEFAULT_CHECK_INTERVAL_SECS),
            Duration::from_secs(DEFAULT_DELAY_THRESHOLD_SECS),
        )
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// True, advancing the window, iff more than `check_interval` has passed
    pub fn check_server(&self) -> bool {
        self.check_server_at(Instant::now())
    }

    pub fn check_server_at(&self, now: Instant) -> bool {
        let mut last_checked = self
            .last_checked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let due = match *last_checked {
            None => true,
            // An interval past the end of time never reopens
            Some(last) => last
                .checked_add(self.check_interval)
                .is_some_and(|next| now > next),
        };

        if due {
            *last_checked = Some(now);
        }
        due
    }

    /// Make the next [`Poller::check_server`] call succeed
    pub fn expire(&self) {
        let mut last_checked = self
            .last_checked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last_checked = None;
    }

    /// Whether the replica lags more than the threshold; not rate limited
    pub async fn is_behind(&self) -> bool {
        self.checker.behind(self.threshold).await
    }

    pub(crate) fn attach(&self, pool: Arc<ConnectionPool>) {
        self.checker.attach(pool);
    }

    pub(crate) fn detach(&self) {
        self.checker.detach();
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("check_interval", &self.check_interval)
            .field("threshold", &self.threshold)
            .finish()
    }
}
