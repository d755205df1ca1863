//! Waiting for asynchronous node operations to settle.
//!
//! The control plane accepts mutating calls immediately and applies them in
//! the background. [`Waiter`] polls a status accessor at a fixed cadence until
//! the status is terminal, the poll fails, the wait is cancelled, or the
//! timeout expires.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clients::ClientError;

/// Poll cadence used by the control plane tooling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on a single wait unless overridden.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Longest accepted poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Classification of a polled status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Succeeded,
    Failed,
}

impl PollOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollOutcome::Pending)
    }
}

/// Status values that end a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSet {
    success: &'static [&'static str],
    failure: &'static [&'static str],
}

impl TerminalSet {
    /// Settled after update, storage expansion or resume.
    pub const RUNNING: TerminalSet = TerminalSet::new(&["running"], &["error"]);
    /// Settled after stop.
    pub const STOPPED: TerminalSet = TerminalSet::new(&["stopped"], &["error"]);

    pub const fn new(success: &'static [&'static str], failure: &'static [&'static str]) -> Self {
        Self { success, failure }
    }

    pub fn classify(&self, status: &str) -> PollOutcome {
        if self.success.contains(&status) {
            PollOutcome::Succeeded
        } else if self.failure.contains(&status) {
            PollOutcome::Failed
        } else {
            PollOutcome::Pending
        }
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.classify(status).is_terminal()
    }
}

/// Result of a finished wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    /// The terminal status.
    pub status: String,
    pub outcome: PollOutcome,
    /// Number of polls issued, including the terminal one.
    pub polls: u32,
    pub elapsed: Duration,
}

/// Why a wait ended without reaching a terminal status.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("status poll failed: {0}")]
    Poll(#[source] ClientError),

    #[error("wait cancelled")]
    Cancelled,

    #[error("timed out after {elapsed:?} (last status: {last_status:?})")]
    TimedOut {
        elapsed: Duration,
        last_status: Option<String>,
    },
}

/// Polls until a status is terminal.
///
/// Cloning a waiter shares its cancellation token.
#[derive(Debug, Clone)]
pub struct Waiter {
    interval: Duration,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Waiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            // tokio intervals reject a zero period
            interval: interval.clamp(Duration::from_millis(1), MAX_POLL_INTERVAL),
            timeout: Some(DEFAULT_WAIT_TIMEOUT),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Poll until a terminal status or cancellation, however long it takes.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Poll until `classify` reports a terminal outcome.
    ///
    /// The first poll happens one interval after the call. A slow poll delays
    /// the next tick rather than bursting. A poll error ends the wait at once.
    pub async fn wait_until<P, Fut, C>(
        &self,
        mut poll: P,
        classify: C,
    ) -> Result<WaitOutcome, WaitError>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ClientError>>,
        C: Fn(&str) -> PollOutcome,
    {
        let started = Instant::now();
        // A deadline past the end of time is no deadline
        let deadline = self
            .timeout
            .and_then(|timeout| started.checked_add(timeout));
        let mut ticker = tokio::time::interval_at(started + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polls = 0u32;
        let mut last_status: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(WaitError::Cancelled),
                _ = expired(deadline) => {
                    return Err(WaitError::TimedOut { elapsed: started.elapsed(), last_status });
                }
                _ = ticker.tick() => {}
            }

            polls += 1;
            let status = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(WaitError::Cancelled),
                _ = expired(deadline) => {
                    return Err(WaitError::TimedOut { elapsed: started.elapsed(), last_status });
                }
                result = poll() => result.map_err(WaitError::Poll)?,
            };

            let outcome = classify(&status);
            debug!(status = %status, ?outcome, polls, "Polled status");

            if outcome.is_terminal() {
                return Ok(WaitOutcome {
                    status,
                    outcome,
                    polls,
                    elapsed: started.elapsed(),
                });
            }
            last_status = Some(status);
        }
    }

    /// Run [`Waiter::wait_until`] as a background task.
    ///
    /// Cancelling the returned handle does not cancel this waiter.
    pub fn spawn<P, Fut, C>(&self, poll: P, classify: C) -> WaitHandle
    where
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, ClientError>> + Send + 'static,
        C: Fn(&str) -> PollOutcome + Send + Sync + 'static,
    {
        let cancel = self.cancel.child_token();
        let waiter = self.clone().with_cancellation(cancel.clone());
        let task = tokio::spawn(async move { waiter.wait_until(poll, classify).await });
        WaitHandle { task, cancel }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to a wait running in the background.
pub struct WaitHandle {
    task: JoinHandle<Result<WaitOutcome, WaitError>>,
    cancel: CancellationToken,
}

impl WaitHandle {
    /// Stop polling. Awaiting the handle afterwards yields [`WaitError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to finish.
    pub async fn join(self) -> Result<WaitOutcome, WaitError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(WaitError::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}
