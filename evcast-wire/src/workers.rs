//! Worker pools for task-based pipelines.
//!
//! A pipeline either owns a multi-threaded runtime sized from its config
//! or borrows the embedder's runtime through a [`Handle`].

use std::fmt;
use std::io;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

pub enum WorkerPool {
    Owned(Option<Runtime>),
    Shared(Handle),
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(_) => f.write_str("WorkerPool::Owned"),
            Self::Shared(_) => f.write_str("WorkerPool::Shared"),
        }
    }
}

impl WorkerPool {
    /// Start a dedicated runtime with `threads` workers.
    pub fn owned(threads: usize, name: &str) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name(name)
            .enable_io()
            .enable_time()
            .build()?;
        debug!(threads, name, "started worker pool");
        Ok(Self::Owned(Some(runtime)))
    }

    /// Run on an existing runtime.
    pub fn shared(handle: Handle) -> Self {
        Self::Shared(handle)
    }

    /// Use `shared` if given, otherwise start an owned pool.
    pub fn shared_or_owned(shared: Option<Handle>, threads: usize, name: &str) -> io::Result<Self> {
        match shared {
            Some(handle) => Ok(Self::shared(handle)),
            None => Self::owned(threads, name),
        }
    }

    pub fn handle(&self) -> Handle {
        match self {
            Self::Owned(Some(runtime)) => runtime.handle().clone(),
            Self::Owned(None) => unreachable!("owned runtime is only taken on drop"),
            Self::Shared(handle) => handle.clone(),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // shutdown_background never blocks, so a pool may be dropped from
        // inside another runtime.
        if let Self::Owned(runtime) = self {
            if let Some(runtime) = runtime.take() {
                runtime.shutdown_background();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn owned_pool_runs_tasks() {
        let pool = WorkerPool::owned(2, "test-worker").unwrap();
        let (tx, rx) = mpsc::channel();
        pool.handle().spawn(async move {
            tx.send(41 + 1).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shared_pool_uses_current_runtime() {
        let pool = WorkerPool::shared(Handle::current());
        let value = pool.handle().spawn(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn owned_pool_can_drop_inside_runtime() {
        let pool = WorkerPool::owned(1, "nested-worker").unwrap();
        drop(pool);
    }
}
