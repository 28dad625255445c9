//! Task orchestration for timers, periodic effects and bridge writes
//!
//! All deferred work in the engine runs through this type: strobe restore
//! timers, periodic effect ticks and the queue drain tasks that talk to the
//! bridge. Holding a runtime handle instead of owning a runtime lets the
//! embedding application decide where the work runs, and gives shutdown a
//! single place to stop accepting new tasks and wait for in-flight bridge
//! writes to settle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::OrchestratorError;

/// Upper bound on bridge writes that may be in flight at once.
pub const MAX_CONCURRENT_WRITES: u32 = 8;

/// Handle to a scheduled task. Cancellation is cooperative: the flag is
/// checked right before the callback body runs, so a cancel that races the
/// timer still suppresses the callback.
#[derive(Debug)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Cancel the task. Idempotent; a task that already ran is unaffected.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.join.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the callback has run (for periodic tasks, at least once).
    pub fn has_run(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Schedules deferred and periodic work on an injected runtime and meters
/// concurrent bridge writes through a semaphore.
#[derive(Debug)]
pub struct TaskOrchestrator {
    runtime: Handle,
    bridge_permits: Arc<Semaphore>,
    shutdown_initiated: AtomicBool,
}

impl TaskOrchestrator {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            bridge_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_WRITES as usize)),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    /// Semaphore metering bridge writes. Drain tasks acquire one owned
    /// permit per state write.
    pub fn bridge_permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.bridge_permits)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Spawn a future immediately. Refused once shutdown has begun.
    pub fn dispatch<F>(&self, future: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(OrchestratorError::ShutdownInProgress);
        }
        self.runtime.spawn(future);
        Ok(())
    }

    /// Run `callback` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> Result<TaskHandle, OrchestratorError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(OrchestratorError::ShutdownInProgress);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let task_cancelled = Arc::clone(&cancelled);
        let task_done = Arc::clone(&done);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if task_cancelled.load(Ordering::SeqCst) {
                return;
            }
            callback();
            task_done.store(true, Ordering::SeqCst);
        });

        Ok(TaskHandle {
            cancelled,
            done,
            join,
        })
    }

    /// Run `callback` every `period`, first after `initial_delay`, until the
    /// returned handle is cancelled.
    pub fn schedule_periodic<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        mut callback: F,
    ) -> Result<TaskHandle, OrchestratorError>
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(OrchestratorError::ShutdownInProgress);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let task_cancelled = Arc::clone(&cancelled);
        let task_done = Arc::clone(&done);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                if task_cancelled.load(Ordering::SeqCst) {
                    return;
                }
                callback();
                task_done.store(true, Ordering::SeqCst);
                tokio::time::sleep(period).await;
            }
        });

        Ok(TaskHandle {
            cancelled,
            done,
            join,
        })
    }

    /// Stop accepting new work and wait up to `grace` for in-flight bridge
    /// writes to finish. Writes still pending after the grace period are
    /// abandoned with a warning.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown_initiated.store(true, Ordering::SeqCst);

        let wait = self.bridge_permits.acquire_many(MAX_CONCURRENT_WRITES);
        match tokio::time::timeout(grace, wait).await {
            Ok(Ok(permits)) => {
                log::info!("[Orchestrator] All bridge writes settled, shutdown complete");
                drop(permits);
            }
            Ok(Err(_)) => {
                log::warn!("[Orchestrator] Write semaphore closed during shutdown");
            }
            Err(_) => {
                log::warn!(
                    "[Orchestrator] Shutdown grace of {:?} elapsed with writes still in flight",
                    grace
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_scheduled_task_fires_after_delay() {
        let orchestrator = TaskOrchestrator::new(Handle::current());
        let fired = Arc::new(AtomicBool::new(false));

        let task_fired = Arc::clone(&fired);
        let handle = orchestrator
            .schedule(Duration::from_millis(20), move || {
                task_fired.store(true, Ordering::SeqCst);
            })
            .unwrap();

        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(handle.has_run());
    }

    #[tokio::test]
    async fn test_cancel_suppresses_callback() {
        let orchestrator = TaskOrchestrator::new(Handle::current());
        let fired = Arc::new(AtomicBool::new(false));

        let task_fired = Arc::clone(&fired);
        let handle = orchestrator
            .schedule(Duration::from_millis(50), move || {
                task_fired.store(true, Ordering::SeqCst);
            })
            .unwrap();

        handle.cancel();
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!fired.load(Ordering::SeqCst));
        assert!(handle.is_cancelled());
        assert!(!handle.has_run());
    }

    #[tokio::test]
    async fn test_periodic_task_fires_repeatedly_until_cancelled() {
        let orchestrator = TaskOrchestrator::new(Handle::current());
        let count = Arc::new(AtomicUsize::new(0));

        let task_count = Arc::clone(&count);
        let handle = orchestrator
            .schedule_periodic(Duration::ZERO, Duration::from_millis(10), move || {
                task_count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let orchestrator = TaskOrchestrator::new(Handle::current());
        orchestrator.shutdown(Duration::from_millis(10)).await;

        let result = orchestrator.schedule(Duration::ZERO, || {});
        assert!(matches!(result, Err(OrchestratorError::ShutdownInProgress)));
        assert!(orchestrator.dispatch(async {}).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_held_permits() {
        let orchestrator = TaskOrchestrator::new(Handle::current());
        let permit = orchestrator
            .bridge_permits()
            .acquire_owned()
            .await
            .unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(permit);
        });

        let start = std::time::Instant::now();
        orchestrator.shutdown(Duration::from_secs(1)).await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
