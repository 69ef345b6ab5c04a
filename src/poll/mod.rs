//! Cooperative poll loop waiting for a mailbox result
//!
//! One tokio task per loop. Each tick sleeps for the current interval, then
//! queries the source once; the next sleep only starts after the query has
//! returned, so ticks never overlap. The loop resolves on the same tick that
//! observes an entry and never queries again afterwards.

use crate::client::{MailboxSource, PollTarget};
use crate::mailbox::MailboxEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default tick interval between mailbox queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Exponential growth of the tick interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Backoff {
    /// Grow `current`, saturating at `max_interval`. A non-finite or
    /// sub-1.0 multiplier keeps the interval unchanged.
    fn next(&self, current: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else if self.multiplier == f64::INFINITY {
            return self.max_interval;
        } else {
            1.0
        };
        Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
            .map(|grown| grown.min(self.max_interval))
            .unwrap_or(self.max_interval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval: Duration,
    /// None keeps a fixed interval
    pub backoff: Option<Backoff>,
    /// None retries indefinitely
    pub max_wait: Option<Duration>,
}

impl PollConfig {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            backoff: None,
            max_wait: None,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Some(backoff) => backoff.next(current),
            None => self.interval,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_POLL_INTERVAL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Polling,
    Resolved,
    Cancelled,
    TimedOut,
}

impl PollState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Resolved { entry: MailboxEntry, attempts: u32 },
    Cancelled { attempts: u32 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("No result after {waited:?} ({attempts} attempts)")]
    TimedOut { waited: Duration, attempts: u32 },

    #[error("Poll task aborted: {0}")]
    Aborted(String),
}

/// Cloneable cancellation handle for a running loop
#[derive(Debug, Clone)]
pub struct PollCanceller {
    tx: mpsc::Sender<()>,
}

impl PollCanceller {
    pub fn cancel(&self) {
        // A full channel means a cancel is already pending
        let _ = self.tx.try_send(());
    }
}

/// Handle to a spawned poll loop.
///
/// Dropping it cancels the loop once no `PollCanceller` obtained from it is
/// still alive; an outstanding canceller keeps the loop running until it is
/// used or dropped too.
#[derive(Debug)]
pub struct PollHandle {
    cancel_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<PollState>,
    task: JoinHandle<Result<PollOutcome, PollError>>,
}

impl PollHandle {
    /// Stop the loop; no further mailbox queries are made
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    pub fn canceller(&self) -> PollCanceller {
        PollCanceller {
            tx: self.cancel_tx.clone(),
        }
    }

    pub fn state(&self) -> PollState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state transitions
    pub fn watch_state(&self) -> watch::Receiver<PollState> {
        self.state_rx.clone()
    }

    /// Wait for the loop to finish
    pub async fn wait(self) -> Result<PollOutcome, PollError> {
        let PollHandle {
            cancel_tx, task, ..
        } = self;
        let result = task
            .await
            .map_err(|e| PollError::Aborted(e.to_string()))?;
        drop(cancel_tx);
        result
    }
}

pub struct PollLoop;

impl PollLoop {
    /// Start polling `source` for `target`
    pub fn spawn<S: MailboxSource>(
        source: Arc<S>,
        target: PollTarget,
        config: PollConfig,
    ) -> PollHandle {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>(1);
        let (state_tx, state_rx) = watch::channel(PollState::Polling);

        let task = tokio::spawn(run_loop(source, target, config, cancel_rx, state_tx));

        PollHandle {
            cancel_tx,
            state_rx,
            task,
        }
    }
}

async fn run_loop<S: MailboxSource>(
    source: Arc<S>,
    target: PollTarget,
    config: PollConfig,
    mut cancel_rx: mpsc::Receiver<()>,
    state_tx: watch::Sender<PollState>,
) -> Result<PollOutcome, PollError> {
    let started = Instant::now();
    let mut delay = config.interval;
    let mut attempts: u32 = 0;

    log::debug!("Polling mailbox for {:?} every {:?}", target, delay);

    loop {
        let wait = match config.max_wait {
            Some(max_wait) => delay.min(max_wait.saturating_sub(started.elapsed())),
            None => delay,
        };

        tokio::select! {
            biased;
            // A closed channel (handle dropped) also lands here
            _ = cancel_rx.recv() => {
                log::debug!("Poll loop for {:?} cancelled after {} attempts", target, attempts);
                state_tx.send_replace(PollState::Cancelled);
                return Ok(PollOutcome::Cancelled { attempts });
            }
            _ = tokio::time::sleep(wait) => {}
        }

        attempts = attempts.saturating_add(1);
        let fetched = tokio::select! {
            biased;
            _ = cancel_rx.recv() => {
                log::debug!("Poll loop for {:?} cancelled during query", target);
                state_tx.send_replace(PollState::Cancelled);
                return Ok(PollOutcome::Cancelled { attempts });
            }
            fetched = source.fetch(&target) => fetched,
        };

        match fetched {
            Ok(Some(entry)) => {
                log::info!("Mailbox result received after {} attempts", attempts);
                state_tx.send_replace(PollState::Resolved);
                return Ok(PollOutcome::Resolved { entry, attempts });
            }
            Ok(None) => {
                log::trace!("Waiting for data... (attempt {})", attempts);
            }
            Err(e) => {
                log::warn!("Transient mailbox query failure (attempt {}): {}", attempts, e);
            }
        }

        if let Some(max_wait) = config.max_wait {
            let waited = started.elapsed();
            if waited >= max_wait {
                log::warn!("Gave up polling for {:?} after {:?}", target, waited);
                state_tx.send_replace(PollState::TimedOut);
                return Err(PollError::TimedOut { waited, attempts });
            }
        }

        delay = config.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServiceError;
    use crate::mailbox::{JobId, MailboxStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Source that becomes ready on the Nth query, optionally failing before
    struct ScriptedSource {
        calls: AtomicU32,
        ready_on: u32,
        fail_until: u32,
    }

    impl ScriptedSource {
        fn new(ready_on: u32, fail_until: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_on,
                fail_until,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MailboxSource for ScriptedSource {
        async fn fetch(&self, _target: &PollTarget) -> Result<Option<MailboxEntry>, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_until {
                return Err(ServiceError::Transport("connection refused".into()));
            }
            if call >= self.ready_on {
                return Ok(Some(MailboxEntry::new(None, json!({"keywords": ["k"]}))));
            }
            Ok(None)
        }

        async fn reset(&self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn clear_latest(&self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn discard(&self, _job_id: &JobId) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_when_entry_present() {
        let source = Arc::new(ScriptedSource::new(3, 0));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());

        match handle.wait().await.unwrap() {
            PollOutcome::Resolved { entry, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(entry.keywords().keywords, vec!["k"]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let source = Arc::new(ScriptedSource::new(1, 4));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());

        let outcome = handle.wait().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Resolved { attempts: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_queries_after_resolution() {
        let source = Arc::new(ScriptedSource::new(1, 0));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());
        let mut state = handle.watch_state();

        state.changed().await.unwrap();
        assert_eq!(*state.borrow(), PollState::Resolved);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(handle.state(), PollState::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_queries() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(source.calls(), 2);

        handle.cancel();
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());
        let mut state = handle.watch_state();

        drop(handle);
        state.changed().await.unwrap();
        assert_eq!(*state.borrow(), PollState::Cancelled);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceller_from_another_task() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());
        let canceller = handle.canceller();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            canceller.cancel();
        });

        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_times_out() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let config = PollConfig {
            interval: Duration::from_secs(3),
            backoff: None,
            max_wait: Some(Duration::from_secs(10)),
        };
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, config);
        let state = handle.watch_state();

        let err = handle.wait().await.unwrap_err();
        match err {
            PollError::TimedOut { waited, attempts } => {
                assert!(waited >= Duration::from_secs(10));
                // Ticks at 3, 6, 9 and a final capped tick at 10
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(*state.borrow(), PollState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_until_cap() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let config = PollConfig {
            interval: Duration::from_secs(1),
            backoff: Some(Backoff {
                multiplier: 2.0,
                max_interval: Duration::from_secs(4),
            }),
            max_wait: None,
        };
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, config);

        // Ticks at 1, 3, 7, 11, 15 (intervals 1, 2, 4, 4, 4)
        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(source.calls(), 5);
        handle.cancel();
        handle.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_from_local_store_after_fill() {
        let store = Arc::new(MailboxStore::new());
        let job = JobId::from("job-42");
        let handle = PollLoop::spawn(
            store.clone(),
            PollTarget::Job(job.clone()),
            PollConfig::default(),
        );

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(handle.state(), PollState::Polling);

        store
            .submit_result(Some(job.clone()), json!({"keywords": ["late"]}))
            .unwrap();

        match handle.wait().await.unwrap() {
            PollOutcome::Resolved { entry, attempts } => {
                assert_eq!(entry.job_id, Some(job));
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceller_outlives_dropped_handle() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, PollConfig::default());
        let mut state = handle.watch_state();
        let canceller = handle.canceller();

        drop(handle);
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(*state.borrow(), PollState::Polling);
        assert_eq!(source.calls(), 2);

        drop(canceller);
        state.changed().await.unwrap();
        assert_eq!(*state.borrow(), PollState::Cancelled);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_multiplier_saturates_at_cap() {
        let source = Arc::new(ScriptedSource::new(u32::MAX, 0));
        let config = PollConfig {
            interval: Duration::from_secs(1),
            backoff: Some(Backoff {
                multiplier: 1e20,
                max_interval: Duration::from_secs(4),
            }),
            max_wait: None,
        };
        let handle = PollLoop::spawn(source.clone(), PollTarget::Latest, config);

        // Ticks at 1, 5, 9 (intervals 1, 4, 4)
        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(handle.state(), PollState::Polling);
        handle.cancel();
        assert!(matches!(
            handle.wait().await.unwrap(),
            PollOutcome::Cancelled { attempts: 3 }
        ));
    }

    #[test]
    fn test_backoff_next_never_overflows() {
        let cap = Duration::from_secs(30);
        for multiplier in [1e20, f64::MAX, f64::INFINITY] {
            let backoff = Backoff {
                multiplier,
                max_interval: cap,
            };
            assert_eq!(backoff.next(Duration::from_secs(3)), cap);
            assert_eq!(backoff.next(Duration::MAX), cap);
        }

        let nan = Backoff {
            multiplier: f64::NAN,
            max_interval: cap,
        };
        assert_eq!(nan.next(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_next() {
        let backoff = Backoff {
            multiplier: 1.5,
            max_interval: Duration::from_secs(10),
        };
        assert_eq!(backoff.next(Duration::from_secs(2)), Duration::from_secs(3));
        assert_eq!(backoff.next(Duration::from_secs(8)), Duration::from_secs(10));
    }
}
