//! Bounded pool for background refresh and preload work
//!
//! Tasks are fire-and-forget from the caller's point of view, but the pool
//! keeps their handles so shutdown can wait for them. At most `workers`
//! tasks do work at the same time; the rest wait for a permit.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Debug)]
pub struct BackgroundPool {
    tasks: Mutex<JoinSet<()>>,
    permits: Arc<Semaphore>,
}

impl BackgroundPool {
    pub fn new(workers: usize) -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Spawns `task` onto the current runtime
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        // Reap finished tasks so the set does not grow without bound
        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }

        tasks.spawn(async move {
            // The semaphore is never closed
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Spawns a coordinating task that does not take a worker permit
    ///
    /// For tasks that mostly wait on work spawned with [`spawn`](Self::spawn);
    /// holding a permit there could starve the tasks being waited on.
    pub fn spawn_unbounded<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(task);
    }

    /// Waits until every spawned task, including ones spawned meanwhile, has finished
    pub async fn drain(&self) {
        loop {
            let mut batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return;
            }
            debug!(tasks = batch.len(), "Waiting for background tasks");
            while let Some(result) = batch.join_next().await {
                log_join(result);
            }
        }
    }

    /// Number of tasks not yet reaped
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("Background task panicked: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_all_tasks() {
        let pool = BackgroundPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.drain().await;

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = BackgroundPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.drain().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_poison_pool() {
        let pool = BackgroundPool::new(1);
        pool.spawn(async { panic!("boom") });
        pool.drain().await;

        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        pool.spawn(async move {
            flag.store(1, Ordering::SeqCst);
        });
        pool.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
