use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::debug;

/// Lifetime scope of one mounted page.
///
/// Owns every timer, poller and prompt task spawned on behalf of the page, plus a shutdown
/// signal for tasks that want to exit cleanly. Closing the scope aborts and joins all of
/// them; spawning into a closed scope is refused.
pub struct TaskScope {
    shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScope {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Spawns `task` inside the scope. Returns `false` if the scope is already closed.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        if self.is_closed() {
            debug!(task = name, "scope closed; task not started");
            return false;
        }
        // Reap finished tasks so short-lived timers do not pile up.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
        true
    }

    pub fn active_tasks(&self) -> usize {
        self.lock().len()
    }

    /// Signals shutdown, aborts every task and waits until all of them are gone.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let mut tasks = std::mem::take(&mut *self.lock());
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        debug!("page scope closed");
    }

    /// Synchronous variant of [`TaskScope::close`] for drop paths: aborts without joining.
    pub fn abort(&self) {
        self.shutdown.send_replace(true);
        self.lock().abort_all();
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
