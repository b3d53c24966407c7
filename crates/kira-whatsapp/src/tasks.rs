//! Deferred tasks
//!
//! Work scheduled to run once after a delay. Handles can cancel the work
//! until it finishes; nothing survives a restart.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a task that runs once after a delay
#[derive(Debug)]
pub struct DeferredTask {
    handle: JoinHandle<()>,
}

impl DeferredTask {
    pub fn schedule<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = tokio::time::Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            work.await;
        });
        Self { handle }
    }

    /// Abort the task, whether still waiting or already running
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// A set of deferred tasks cancelled together
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Mutex<Vec<DeferredTask>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: DeferredTask) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Tasks that have not finished yet
    pub fn pending(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = DeferredTask::schedule(Duration::from_secs(3), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(2999)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_delay() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = DeferredTask::schedule(Duration::from_secs(3), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        task.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_set_cancel_all() {
        let runs = Arc::new(AtomicUsize::new(0));
        let set = TaskSet::new();
        for secs in [1, 2, 3] {
            let counter = runs.clone();
            set.push(DeferredTask::schedule(Duration::from_secs(secs), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(set.pending(), 3);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(set.pending(), 2);

        set.cancel_all();
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(set.pending(), 0);
    }
}
