use crate::error::{Result, SortcamError};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A long-running background task with its own cancellation token
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `task` with a child of `parent`, so cancelling the parent stops it too
    pub fn spawn<F, Fut>(name: &str, parent: &CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let handle = tokio::spawn(task(cancel.clone()));
        debug!("Worker '{}' spawned", name);

        Self {
            name: name.to_string(),
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Cancel the task and wait up to `timeout` for it to finish.
    /// A task that overruns the timeout is aborted.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();

        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Worker '{}' stopped", self.name);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Worker '{}' terminated abnormally: {}", self.name, e);
                Err(SortcamError::component(
                    self.name.clone(),
                    format!("task failed: {}", e),
                ))
            }
            Err(_) => {
                warn!(
                    "Worker '{}' did not stop within {:?}; aborting",
                    self.name, timeout
                );
                handle.abort();
                Err(SortcamError::component(
                    self.name.clone(),
                    format!("stop timed out after {:?}", timeout),
                ))
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_cancels_and_joins() {
        let parent = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let mut worker = Worker::spawn("test", &parent, move |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!worker.is_finished());
        worker.stop(Duration::from_secs(1)).await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(worker.is_finished());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_worker() {
        let parent = CancellationToken::new();
        let mut worker = Worker::spawn("child", &parent, |cancel| async move {
            cancel.cancelled().await;
        });

        parent.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(worker.is_finished());
        assert!(worker.stop(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_timeout_aborts() {
        let parent = CancellationToken::new();
        let mut worker = Worker::spawn("stubborn", &parent, |_cancel| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let result = worker.stop(Duration::from_millis(20)).await;
        assert!(result.is_err());
        assert_eq!(worker.name(), "stubborn");
    }
}
