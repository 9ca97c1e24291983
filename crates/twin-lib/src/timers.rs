//! Named, cancellable periodic timers
//!
//! Each purpose (load sampling, status polling, a chart view's refresh) owns
//! one named timer. Starting a timer under a name that is already running
//! aborts the previous instance first, so ticks for the same purpose never
//! overlap. Timers run on independent tasks: a slow or failing tick in one
//! never delays another.

use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Well-known timer names
pub mod names {
    pub const LOAD_SAMPLE: &str = "load-sample";
    pub const STATUS_POLL: &str = "status-poll";
    pub const CHART_PREFIX: &str = "chart:";
}

/// Shortest period a timer runs at
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Registry of running periodic timers
#[derive(Default)]
pub struct TimerSet {
    timers: DashMap<String, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the timer `name`, calling `tick` every `period`.
    /// The first tick fires immediately. Periods below [`MIN_PERIOD`] are
    /// raised to it.
    pub fn start<F, Fut>(&self, name: &str, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let timer_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tick().await;
            }
        });

        if let Some(previous) = self.timers.insert(timer_name, handle) {
            previous.abort();
            debug!(timer = %name, "Restarted timer, previous instance cancelled");
        } else {
            debug!(timer = %name, period_ms = period.as_millis() as u64, "Started timer");
        }
    }

    /// Cancel the timer `name`. Returns false if it was not running.
    pub fn cancel(&self, name: &str) -> bool {
        match self.timers.remove(name) {
            Some((_, handle)) => {
                handle.abort();
                debug!(timer = %name, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        self.timers.retain(|_, handle| {
            handle.abort();
            false
        });
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.timers
            .get(name)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Names of all running timers, sorted
    pub fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .timers
            .iter()
            .filter(|e| !e.value().is_finished())
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_tick(counter: Arc<AtomicUsize>) -> impl Fn() -> std::future::Ready<()> {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_timer_ticks_until_cancelled() {
        let timers = TimerSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        timers.start("t", Duration::from_millis(10), counting_tick(count.clone()));
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(timers.is_active("t"));
        assert!(timers.cancel("t"));

        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
        assert!(!timers.cancel("t"));
    }

    #[tokio::test]
    async fn test_restart_cancels_previous_instance() {
        let timers = TimerSet::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        timers.start("poll", Duration::from_millis(10), counting_tick(first.clone()));
        tokio::time::sleep(Duration::from_millis(25)).await;
        timers.start("poll", Duration::from_millis(10), counting_tick(second.clone()));

        let first_at_restart = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(first.load(Ordering::SeqCst), first_at_restart);
        assert!(second.load(Ordering::SeqCst) >= 2);
        assert_eq!(timers.active(), vec!["poll".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_period_is_clamped() {
        let timers = TimerSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        timers.start("zero", Duration::ZERO, counting_tick(count.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(timers.is_active("zero"));
        assert!(count.load(Ordering::SeqCst) >= 2);
        timers.cancel_all();
    }

    #[tokio::test]
    async fn test_independent_timers() {
        let timers = TimerSet::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        timers.start("a", Duration::from_millis(10), counting_tick(a.clone()));
        timers.start("b", Duration::from_millis(10), counting_tick(b.clone()));
        timers.cancel("a");

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(b.load(Ordering::SeqCst) >= 2);
        assert_eq!(timers.active(), vec!["b".to_string()]);

        timers.cancel_all();
        assert!(timers.active().is_empty());
    }
}
