use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use crate::context::Context;
use crate::error::{DiscoveryError, Result};

/// One task's outcome, keyed by its original index so
/// `executeBatch` can return results in the same order tasks were
/// submitted regardless of completion order.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Value(T),
    Error(DiscoveryError),
}

impl<T> TaskOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            TaskOutcome::Value(v) => Some(v),
            TaskOutcome::Error(_) => None,
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, TaskOutcome::Error(_))
    }
}

/// Bounded-parallelism primitive: submit N tasks, receive N results in
/// submission order, drain cleanly on `stop`. The fixed worker count is
/// enforced via a semaphore rather than a dedicated thread/actor pool, with
/// fan-out driven by `tokio::task::JoinSet`.
pub struct WorkerPool {
    size: usize,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    stopped: Arc<tokio::sync::RwLock<bool>>,
    drained: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        WorkerPool {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            active: Arc::new(AtomicUsize::new(0)),
            stopped: Arc::new(tokio::sync::RwLock::new(false)),
            drained: Arc::new(Notify::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Runs `tasks` through `f`, at most `size` concurrently, returning
    /// results in the same order as `tasks`. A task whose future panics is
    /// caught at this boundary and reported as `TaskFailed` rather than
    /// propagating as an uncaught fault. Cancelling `ctx` causes pending
    /// tasks to resolve as `Cancelled` instead of running.
    pub async fn execute_batch<T, I, F, Fut>(&self, ctx: &Context, tasks: Vec<I>, f: F) -> Result<Vec<TaskOutcome<T>>>
    where
        T: Send + 'static,
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if *self.stopped.read().await {
            return Err(DiscoveryError::PoolStopped);
        }

        let f = Arc::new(f);
        let mut set: JoinSet<(usize, TaskOutcome<T>)> = JoinSet::new();

        for (index, input) in tasks.into_iter().enumerate() {
            if ctx.is_cancelled() {
                set.spawn(async move { (index, TaskOutcome::Error(DiscoveryError::Cancelled)) });
                continue;
            }
            let semaphore = self.semaphore.clone();
            let active = self.active.clone();
            let f = f.clone();
            let ctx = ctx.clone();
            set.spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (index, TaskOutcome::Error(DiscoveryError::PoolStopped)),
                };
                if ctx.is_cancelled() {
                    return (index, TaskOutcome::Error(DiscoveryError::Cancelled));
                }
                active.fetch_add(1, Ordering::SeqCst);
                let outcome =
                    match tokio::spawn(async move { f(input).await }).await {
                        Ok(Ok(v)) => TaskOutcome::Value(v),
                        Ok(Err(e)) => TaskOutcome::Error(e),
                        Err(join_err) => TaskOutcome::Error(DiscoveryError::TaskFailed(join_err.to_string())),
                    };
                active.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                (index, outcome)
            });
        }

        let mut results: Vec<Option<TaskOutcome<T>>> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, outcome) = joined.map_err(|e| DiscoveryError::TaskFailed(e.to_string()))?;
            if results.len() <= index {
                results.resize_with(index + 1, || None);
            }
            results[index] = Some(outcome);
        }

        Ok(results.into_iter().map(|o| o.unwrap()).collect())
    }

    /// Drains in-flight work and prevents further submissions. Idempotent:
    /// calling `stop` more than once succeeds every time.
    pub async fn stop(&self) {
        *self.stopped.write().await = true;
        // Acquiring every permit blocks until all in-flight tasks release
        // theirs, i.e. until the pool has drained.
        if let Ok(_permits) = self.semaphore.acquire_many(self.size as u32).await {
            self.drained.notify_waiters();
        }
    }

    pub async fn is_stopped(&self) -> bool {
        *self.stopped.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_task_order() {
        let pool = WorkerPool::new(4);
        let ctx = Context::background();
        let tasks: Vec<u32> = (0..20).collect();
        let results = pool
            .execute_batch(&ctx, tasks, |i| async move { Ok(i * 2) })
            .await
            .unwrap();
        for (i, outcome) in results.into_iter().enumerate() {
            assert_eq!(outcome.ok(), Some(i as u32 * 2));
        }
    }

    #[tokio::test]
    async fn bounds_concurrency_to_pool_size() {
        let pool = WorkerPool::new(3);
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        let ctx = Context::background();
        let tasks: Vec<u32> = (0..12).collect();

        let concurrent2 = concurrent.clone();
        let max_seen2 = max_seen.clone();
        let results = pool
            .execute_batch(&ctx, tasks, move |_i| {
                let concurrent = concurrent2.clone();
                let max_seen = max_seen2.clone();
                async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 12);
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn task_errors_are_isolated_per_index() {
        let pool = WorkerPool::new(2);
        let ctx = Context::background();
        let tasks = vec![1, 0, 2];
        let results = pool
            .execute_batch(&ctx, tasks, |i| async move {
                if i == 0 {
                    Err(DiscoveryError::TaskFailed("boom".into()))
                } else {
                    Ok(i)
                }
            })
            .await
            .unwrap();
        assert!(results[0].ok().is_some());
        assert!(results[1].is_err());
        assert!(results[2].ok().is_some());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_rejects_new_batches() {
        let pool = WorkerPool::new(2);
        pool.stop().await;
        pool.stop().await;
        let ctx = Context::background();
        let err = pool
            .execute_batch(&ctx, vec![1], |i| async move { Ok(i) })
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::PoolStopped));
    }
}
