//! Cancellable background maintenance tasks.
//!
//! Each component owns one [`BackgroundTasks`] supervisor. Periodic work
//! (health probes, cache/metric cleanup, analysis, session expiry) is spawned
//! at component `init` and stopped at `cleanup` via a shared
//! [`CancellationToken`], so no timer outlives its owner.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default time to wait for tasks to finish after cancellation.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor for a component's periodic background tasks.
pub struct BackgroundTasks {
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    /// Create an empty supervisor.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `tick` every `period` until the supervisor is shut down.
    ///
    /// The first run happens one full `period` after spawning. Missed ticks
    /// are delayed rather than bursted.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.token.clone();
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, period_ms = period.as_millis(), "background task started");
            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    () = cancel.cancelled() => break,
                }
            }
            debug!(task = name, "background task stopped");
        });
        self.handles.lock().push(handle);
    }

    /// Number of spawned tasks not yet joined.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether no tasks are running.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel all tasks and wait (bounded) for them to exit.
    ///
    /// Tasks still running after the timeout are aborted.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await;
    }

    /// [`shutdown`](Self::shutdown) with an explicit timeout.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        self.token.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(task_count = aborts.len(), "background tasks did not stop in time, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("tasks", &self.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
