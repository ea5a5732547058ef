use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Shared work queue for a pool phase. Populated in full before the pool
/// starts; a `None` pop means the queue is permanently drained and the
/// worker can exit.
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        WorkQueue { items: Mutex::new(items.into_iter().collect()) }
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

/// Run one worker closure on every thread of a bounded pool and join them
/// all, surfacing the first worker error. The pool is dropped on return, so
/// callers get barrier semantics between phases.
pub fn run_workers<F>(threads: usize, worker: F) -> Result<()>
where
    F: Fn() -> Result<()> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .context("build worker pool")?;
    pool.broadcast(|_| worker()).into_iter().collect()
}
