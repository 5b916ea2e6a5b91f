use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

/// Bounded pool for one stage.
///
/// `submit` spawns immediately and never waits; each task takes a permit before
/// its body runs, so at most `size` bodies execute at once. `drain` consumes the
/// pool, which makes it single-use.
pub struct WorkerPool<K, T> {
    name: String,
    size: usize,
    permits: Arc<Semaphore>,
    handles: Vec<(K, JoinHandle<T>)>,
}

impl<K, T> WorkerPool<K, T>
where
    T: Send + 'static,
{
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name: name.into(),
            size,
            permits: Arc::new(Semaphore::new(size)),
            handles: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of submitted tasks
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn submit<F>(&mut self, key: K, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if that changes.
            let _permit = permits.acquire_owned().await.ok();
            task.await
        });
        self.handles.push((key, handle));
    }

    /// Wait for every submitted task. Results come back in submission order.
    ///
    /// A task that panicked yields its `JoinError`; the others are unaffected.
    pub async fn drain(self) -> Vec<(K, Result<T, JoinError>)> {
        let (keys, handles): (Vec<K>, Vec<JoinHandle<T>>) = self.handles.into_iter().unzip();
        tracing::debug!(pool = %self.name, tasks = keys.len(), "Waiting for pool to drain");
        let results = join_all(handles).await;
        keys.into_iter().zip(results).collect()
    }
}
