//! Lifecycle primitives: the engine state machine and the cancellable
//! group every unit of background work is spawned into.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Engine lifecycle state.
///
/// ```text
/// Stopped ──start()──► Starting ──► Running ──stop()──► Stopping ──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No background work exists.
    Stopped,
    /// Loops are being spawned.
    Starting,
    /// Loops are running.
    Running,
    /// Shutdown in progress.
    Stopping,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReport {
    /// Engine was not running.
    NotRunning,
    /// All work finished inside the grace period.
    Graceful,
    /// Remaining work was force-cancelled after the grace period.
    ForceCancelled,
    /// Work was still outstanding after force-cancellation.
    Incomplete {
        /// Units of work left.
        outstanding: usize,
    },
}

/// A single cancellable group of background work.
///
/// `shutdown` asks loops and task bodies to wind down at their next
/// suspension point. `abort` makes the scheduler drop in-flight task
/// futures outright. Every spawned future is tracked so [`WorkGroup::wait`]
/// resolves only once nothing is left.
#[derive(Debug, Clone)]
pub struct WorkGroup {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl Default for WorkGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkGroup {
    /// Fresh, open group.
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    /// Spawn `fut` into the group.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(fut);
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Token cancelled when in-flight work must be dropped.
    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Signal cooperative shutdown.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Drop in-flight work at its next poll.
    pub fn force_cancel(&self) {
        self.abort.cancel();
    }

    /// Mark the group closed so [`WorkGroup::wait`] can resolve once empty.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Units of work still alive.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Resolves once the group is closed and empty.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Close the group and wind it down: signal shutdown, wait up to
    /// `grace`, then force-cancel and wait up to `force`.
    pub async fn shut_down(&self, grace: Duration, force: Duration) -> ShutdownReport {
        self.begin_shutdown();
        self.close();

        if tokio::time::timeout(grace, self.wait()).await.is_ok() {
            return ShutdownReport::Graceful;
        }

        warn!(
            outstanding = self.outstanding(),
            grace_secs = grace.as_secs(),
            "shutdown grace period elapsed, force-cancelling remaining work"
        );
        self.force_cancel();
        if tokio::time::timeout(force, self.wait()).await.is_ok() {
            info!("remaining work cancelled");
            return ShutdownReport::ForceCancelled;
        }
        ShutdownReport::Incomplete {
            outstanding: self.outstanding(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooperative_work_finishes_within_grace() {
        let group = WorkGroup::new();
        let token = group.shutdown_token().clone();
        group.spawn(async move {
            token.cancelled().await;
        });
        assert_eq!(group.outstanding(), 1);

        let report = group
            .shut_down(Duration::from_secs(5), Duration::from_secs(1))
            .await;
        assert_eq!(report, ShutdownReport::Graceful);
        assert_eq!(group.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_work_is_force_cancelled() {
        let group = WorkGroup::new();
        let abort = group.abort_token().clone();
        group.spawn(async move {
            tokio::select! {
                _ = abort.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
            }
        });

        let report = group
            .shut_down(Duration::from_secs(2), Duration::from_secs(1))
            .await;
        assert_eq!(report, ShutdownReport::ForceCancelled);
        assert_eq!(group.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn work_ignoring_every_signal_is_reported() {
        let group = WorkGroup::new();
        group.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let report = group
            .shut_down(Duration::from_secs(1), Duration::from_secs(1))
            .await;
        assert_eq!(report, ShutdownReport::Incomplete { outstanding: 1 });
    }

    #[test]
    fn shutdown_does_not_imply_abort() {
        let group = WorkGroup::new();
        group.begin_shutdown();
        assert!(group.is_shutting_down());
        assert!(!group.abort_token().is_cancelled());
    }
}
