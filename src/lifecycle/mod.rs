// Shutdown orchestration shared by both adapters: a cancellation signal
// observed by every blocking call, plus a counted set of in-flight
// handler tasks awaited at drain time.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Tracks in-flight handler tasks and coordinates drain.
///
/// Intake loops watch [`shutdown_token`](Lifecycle::shutdown_token) and
/// stop accepting new messages once it fires; [`drain`](Lifecycle::drain)
/// then waits for every spawned handler to finish, bounded by the drain
/// deadline. Handlers are never forcibly killed.
pub struct Lifecycle {
    shutdown: CancellationToken,
    handlers: TaskTracker,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handlers: TaskTracker::new(),
        }
    }

    /// Token observed by intake loops, limiter waits, and fetch calls.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Handle for spawning handler tasks from intake loops.
    pub fn tracker(&self) -> TaskTracker {
        self.handlers.clone()
    }

    /// Spawns a tracked task.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handlers.spawn(task)
    }

    /// Number of tracked tasks still running.
    pub fn in_flight(&self) -> usize {
        self.handlers.len()
    }

    /// Signals shutdown and waits for in-flight work, bounded by `deadline`.
    ///
    /// Returns `true` if everything finished, `false` if the deadline
    /// elapsed first and the remainder was abandoned.
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.shutdown.cancel();
        self.handlers.close();
        tokio::time::timeout(deadline, self.handlers.wait())
            .await
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
