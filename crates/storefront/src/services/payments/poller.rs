//! Payment status polling.
//!
//! After an STK push the customer approves the payment on their phone and
//! the server learns the result asynchronously. [`PaymentPoller`] asks the
//! server for the order's payment status on a fixed interval until it is
//! terminal or the attempt budget runs out. Checks start on a fixed
//! schedule, one interval apart, so the default budget of 24 checks every
//! 5 seconds gives up two minutes after the push.
//!
//! - One session per order; starting another for the same order stops the
//!   first before the new one sends anything
//! - A failed status check uses up an attempt and is not reported
//! - Once stopped, no further status check is sent

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};

use soko_core::{OrderId, PaymentStatus};

use crate::api::ApiError;

/// Where the poller gets payment statuses from.
pub trait PaymentStatusSource: Send + Sync + 'static {
    /// Ask for the current payment status of `order_id`.
    fn check_status(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<StatusReport, ApiError>> + Send;
}

/// One answer from a [`PaymentStatusSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: PaymentStatus,
    /// The raw response payload.
    pub payload: Value,
}

/// Polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollConfig {
    /// Default number of status checks.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 24;

    /// Default delay between status checks.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on how long a session runs.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// A status seen while polling, handed to the observer.
#[derive(Debug, Clone, PartialEq)]
pub struct PollObservation {
    pub order_id: OrderId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub status: PaymentStatus,
    /// Raw payload; `None` for the synthetic timeout.
    pub payload: Option<Value>,
}

/// How a polling session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The server reported a terminal status.
    Terminal(PaymentStatus),
    /// The attempt budget ran out; the observer was told `Timeout`.
    TimedOut,
    /// The session was stopped (by its handle or by a replacement).
    Stopped,
}

// =============================================================================
// PaymentPoller
// =============================================================================

struct ActiveSession {
    generation: u64,
    stop: Arc<watch::Sender<bool>>,
}

#[derive(Default)]
struct Registry {
    sessions: Mutex<HashMap<OrderId, ActiveSession>>,
    next_generation: AtomicU64,
}

impl Registry {
    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<OrderId, ActiveSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, order_id: OrderId, generation: u64) {
        let mut sessions = self.sessions();
        if sessions
            .get(&order_id)
            .is_some_and(|s| s.generation == generation)
        {
            sessions.remove(&order_id);
        }
    }
}

/// Runs payment polling sessions, at most one per order.
///
/// Cheaply cloneable; clones share the session registry.
#[derive(Clone, Default)]
pub struct PaymentPoller {
    registry: Arc<Registry>,
}

impl PaymentPoller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling `order_id`, calling `observer` for every status seen.
    ///
    /// An existing session for the same order is stopped first. Must be
    /// called from within a Tokio runtime.
    pub fn start<S, F>(
        &self,
        source: S,
        order_id: OrderId,
        config: PollConfig,
        observer: F,
    ) -> PollHandle
    where
        S: PaymentStatusSource,
        F: FnMut(PollObservation) + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut sessions = self.registry.sessions();
            if let Some(previous) = sessions.insert(
                order_id,
                ActiveSession {
                    generation,
                    stop: Arc::clone(&stop_tx),
                },
            ) {
                info!(order_id = %order_id, "Replacing payment poll session");
                previous.stop.send_replace(true);
            }
        }

        let registry = Arc::clone(&self.registry);
        let span = info_span!("payment_poll", order_id = %order_id, generation);
        let join = tokio::spawn(
            async move {
                let outcome = run(source, order_id, config, stop_rx, observer).await;
                registry.finish(order_id, generation);
                debug!(?outcome, "Payment poll session ended");
                outcome
            }
            .instrument(span),
        );

        PollHandle {
            order_id,
            stop: stop_tx,
            join: Some(join),
            detached: false,
        }
    }

    /// Number of sessions still polling.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.sessions().len()
    }

    /// Whether `order_id` is being polled.
    #[must_use]
    pub fn is_polling(&self, order_id: OrderId) -> bool {
        self.registry.sessions().contains_key(&order_id)
    }

    /// Stop the session for `order_id`, if any.
    pub fn stop(&self, order_id: OrderId) {
        if let Some(session) = self.registry.sessions().remove(&order_id) {
            session.stop.send_replace(true);
        }
    }

    /// Stop every session.
    pub fn stop_all(&self) {
        for (_, session) in self.registry.sessions().drain() {
            session.stop.send_replace(true);
        }
    }
}

impl std::fmt::Debug for PaymentPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentPoller")
            .field("active", &self.active_count())
            .finish()
    }
}

// =============================================================================
// PollHandle
// =============================================================================

/// Handle to one polling session.
///
/// Dropping the handle stops the session unless it was [detached](Self::detach).
#[derive(Debug)]
pub struct PollHandle {
    order_id: OrderId,
    stop: Arc<watch::Sender<bool>>,
    join: Option<JoinHandle<PollOutcome>>,
    detached: bool,
}

impl PollHandle {
    /// The order being polled.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Stop polling. No status check is sent after this returns.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// A cloneable stop switch, for stopping from another task.
    #[must_use]
    pub fn stopper(&self) -> PollStopper {
        PollStopper(Arc::clone(&self.stop))
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the session to end.
    pub async fn wait(mut self) -> PollOutcome {
        let Some(join) = self.join.take() else {
            return PollOutcome::Stopped;
        };
        match join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(order_id = %self.order_id, error = %e, "Payment poll task failed");
                PollOutcome::Stopped
            }
        }
    }

    /// Let the session keep running after the handle is dropped.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if !self.detached {
            self.stop.send_replace(true);
        }
    }
}

/// Stops a polling session from anywhere.
#[derive(Debug, Clone)]
pub struct PollStopper(Arc<watch::Sender<bool>>);

impl PollStopper {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

// =============================================================================
// Polling loop
// =============================================================================

async fn run<S, F>(
    source: S,
    order_id: OrderId,
    config: PollConfig,
    mut stop: watch::Receiver<bool>,
    mut observer: F,
) -> PollOutcome
where
    S: PaymentStatusSource,
    F: FnMut(PollObservation),
{
    // Ticks are anchored to the start, so request latency does not stretch
    // the schedule. A check slower than the interval delays the next tick.
    let period = config.interval.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => return PollOutcome::Stopped,
            _ = ticker.tick() => {}
        }
        if *stop.borrow() {
            return PollOutcome::Stopped;
        }

        let result = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => return PollOutcome::Stopped,
            result = source.check_status(order_id) => result,
        };

        match result {
            Ok(report) => {
                debug!(attempt, status = ?report.status, "Payment status observed");
                let status = report.status;
                observer(PollObservation {
                    order_id,
                    attempt,
                    status,
                    payload: Some(report.payload),
                });
                if status.is_terminal() {
                    info!(attempt, status = ?status, "Payment settled");
                    return PollOutcome::Terminal(status);
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "Payment status check failed");
            }
        }
    }

    if *stop.borrow() {
        return PollOutcome::Stopped;
    }

    info!(attempts = config.max_attempts, "Payment not confirmed in time");
    observer(PollObservation {
        order_id,
        attempt: config.max_attempts,
        status: PaymentStatus::Timeout,
        payload: None,
    });
    PollOutcome::TimedOut
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Scripted status source; repeats `Pending` once the script runs out.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        script: Arc<Mutex<VecDeque<Option<PaymentStatus>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = Option<PaymentStatus>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into_iter().collect())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PaymentStatusSource for ScriptedSource {
        async fn check_status(&self, order_id: OrderId) -> Result<StatusReport, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Some(PaymentStatus::Pending));
            match next {
                Some(status) => Ok(StatusReport {
                    status,
                    payload: serde_json::json!({ "orderId": order_id, "status": status }),
                }),
                None => Err(ApiError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    message: "gateway unavailable".to_string(),
                }),
            }
        }
    }

    fn recorder() -> (
        Arc<Mutex<Vec<PollObservation>>>,
        impl FnMut(PollObservation) + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |obs| sink.lock().unwrap().push(obs))
    }

    fn config(max_attempts: u32) -> PollConfig {
        PollConfig::new(max_attempts, Duration::from_millis(100))
    }

    fn statuses(seen: &Arc<Mutex<Vec<PollObservation>>>) -> Vec<PaymentStatus> {
        seen.lock().unwrap().iter().map(|o| o.status).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_pending_completed() {
        let source = ScriptedSource::new([
            Some(PaymentStatus::Pending),
            Some(PaymentStatus::Pending),
            Some(PaymentStatus::Completed),
        ]);
        let (seen, observer) = recorder();
        let poller = PaymentPoller::new();

        let handle = poller.start(source.clone(), OrderId::new(1), config(3), observer);
        let outcome = handle.wait().await;

        assert_eq!(outcome, PollOutcome::Terminal(PaymentStatus::Completed));
        assert_eq!(source.calls(), 3);
        assert_eq!(
            statuses(&seen),
            vec![
                PaymentStatus::Pending,
                PaymentStatus::Pending,
                PaymentStatus::Completed
            ]
        );
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_terminal_status_stops_immediately() {
        for terminal in [
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            let source = ScriptedSource::new([Some(PaymentStatus::Pending), Some(terminal)]);
            let (seen, observer) = recorder();
            let handle =
                PaymentPoller::new().start(source.clone(), OrderId::new(2), config(10), observer);

            assert_eq!(handle.wait().await, PollOutcome::Terminal(terminal));
            tokio::time::sleep(Duration::from_secs(5)).await;

            assert_eq!(source.calls(), 2);
            let seen = statuses(&seen);
            assert_eq!(seen.iter().filter(|s| **s == terminal).count(), 1);
            assert_eq!(seen.last(), Some(&terminal));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_reports_timeout() {
        let source = ScriptedSource::new([]);
        let (seen, observer) = recorder();
        let handle = PaymentPoller::new().start(source.clone(), OrderId::new(3), config(4), observer);

        assert_eq!(handle.wait().await, PollOutcome::TimedOut);
        assert_eq!(source.calls(), 4);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        let last = seen.last().unwrap();
        assert_eq!(last.status, PaymentStatus::Timeout);
        assert_eq!(last.payload, None);
        assert_eq!(last.attempt, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_checks_consume_attempts_silently() {
        let source = ScriptedSource::new([None, None, Some(PaymentStatus::Pending)]);
        let (seen, observer) = recorder();
        let handle = PaymentPoller::new().start(source.clone(), OrderId::new(4), config(3), observer);

        assert_eq!(handle.wait().await, PollOutcome::TimedOut);
        assert_eq!(source.calls(), 3);
        assert_eq!(
            statuses(&seen),
            vec![PaymentStatus::Pending, PaymentStatus::Timeout]
        );
    }

    /// Answers `Pending` after a fixed delay and records when each check began.
    #[derive(Clone)]
    struct SlowSource {
        latency: Duration,
        started: Arc<Mutex<Vec<Instant>>>,
    }

    impl PaymentStatusSource for SlowSource {
        async fn check_status(&self, order_id: OrderId) -> Result<StatusReport, ApiError> {
            self.started.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.latency).await;
            Ok(StatusReport {
                status: PaymentStatus::Pending,
                payload: serde_json::json!({ "orderId": order_id }),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_checks_keep_fixed_schedule() {
        let source = SlowSource {
            latency: Duration::from_secs(3),
            started: Arc::default(),
        };
        let config = PollConfig::default();
        let begin = Instant::now();

        let handle =
            PaymentPoller::new().start(source.clone(), OrderId::new(13), config, |_| {});
        let outcome = handle.wait().await;
        let elapsed = begin.elapsed();

        assert_eq!(outcome, PollOutcome::TimedOut);
        let offsets: Vec<Duration> = source
            .started
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(begin))
            .collect();
        let expected: Vec<Duration> = (1..=config.max_attempts)
            .map(|n| config.interval * n)
            .collect();
        assert_eq!(offsets, expected);
        assert!(elapsed < config.total_wait() + config.interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_check() {
        let source = ScriptedSource::new([]);
        let (seen, observer) = recorder();
        let handle = PaymentPoller::new().start(source.clone(), OrderId::new(5), config(5), observer);

        handle.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(handle.wait().await, PollOutcome::Stopped);
        assert_eq!(source.calls(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_midway_halts_checks() {
        let source = ScriptedSource::new([]);
        let (seen, observer) = recorder();
        let handle = PaymentPoller::new().start(source.clone(), OrderId::new(6), config(10), observer);

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(source.calls(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(handle.wait().await, PollOutcome::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let source = ScriptedSource::new([]);
        let (_seen, observer) = recorder();
        let poller = PaymentPoller::new();
        let handle = poller.start(source.clone(), OrderId::new(7), config(10), observer);

        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_session_keeps_running() {
        let source = ScriptedSource::new([Some(PaymentStatus::Pending), Some(PaymentStatus::Failed)]);
        let (seen, observer) = recorder();
        let poller = PaymentPoller::new();
        poller
            .start(source.clone(), OrderId::new(8), config(10), observer)
            .detach();

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(source.calls(), 2);
        assert_eq!(statuses(&seen).last(), Some(&PaymentStatus::Failed));
        assert!(!poller.is_polling(OrderId::new(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_session_replaces_first() {
        let first_source = ScriptedSource::new([]);
        let second_source = ScriptedSource::new([Some(PaymentStatus::Completed)]);
        let (_first_seen, first_observer) = recorder();
        let (second_seen, second_observer) = recorder();
        let poller = PaymentPoller::new();
        let order = OrderId::new(9);

        let first = poller.start(first_source.clone(), order, config(10), first_observer);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = poller.start(second_source.clone(), order, config(10), second_observer);
        assert_eq!(poller.active_count(), 1);

        assert_eq!(first.wait().await, PollOutcome::Stopped);
        assert_eq!(
            second.wait().await,
            PollOutcome::Terminal(PaymentStatus::Completed)
        );
        assert_eq!(first_source.calls(), 1);
        assert_eq!(second_source.calls(), 1);
        assert_eq!(statuses(&second_seen), vec![PaymentStatus::Completed]);
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_by_order_id() {
        let source = ScriptedSource::new([]);
        let (_seen, observer) = recorder();
        let poller = PaymentPoller::new();
        let handle = poller.start(source.clone(), OrderId::new(10), config(10), observer);
        let stopper = handle.stopper();
        assert!(poller.is_polling(OrderId::new(10)));

        poller.stop(OrderId::new(10));
        stopper.stop();

        assert_eq!(handle.wait().await, PollOutcome::Stopped);
        assert_eq!(source.calls(), 0);
        assert_eq!(poller.active_count(), 0);
    }

    #[test]
    fn test_default_budget() {
        let config = PollConfig::default();
        assert_eq!(config.max_attempts, 24);
        assert_eq!(config.total_wait(), Duration::from_secs(120));
    }
}
