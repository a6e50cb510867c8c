use futures::FutureExt;
use futures::future::BoxFuture;
use log::error;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("The background job panicked or was cancelled: {0}")]
    Aborted(String),
}

/// Decides where background work runs. Results never touch shared state directly: they are either delivered through
/// a [`CompletionQueue`] that the main thread drains, or returned as a future.
#[derive(Clone, Debug)]
pub enum JobExecutor {
    /// Runs the job on the calling thread, right away. Results are still delivered through the completion queue,
    /// so commit ordering is identical to the threaded variant, just deterministic.
    Inline,
    Runtime(Handle),
}

impl JobExecutor {
    /// Uses the runtime of the calling context, if there is one.
    pub fn current_or_inline() -> Self {
        Handle::try_current()
            .map(JobExecutor::Runtime)
            .unwrap_or(JobExecutor::Inline)
    }

    /// Runs `job` and delivers its result to `completions`. Every spawned job delivers exactly once: if it panics or
    /// gets cancelled, `on_abort` turns the error into the completion instead, so owners never wait on it forever.
    pub fn spawn<T, F, A>(&self, completions: UnboundedSender<T>, job: F, on_abort: A)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        A: FnOnce(JobError) -> T + Send + 'static,
    {
        match self {
            JobExecutor::Inline => {
                // The receiver only goes away together with the owner of the queue, nothing left to deliver to then.
                let _ = completions.send(job());
            }
            JobExecutor::Runtime(handle) => {
                let join_handle = handle.spawn_blocking(job);
                handle.spawn(async move {
                    let completion = match join_handle.await {
                        Ok(result) => result,
                        Err(err) => {
                            error!("Background job failed: {}", err);
                            on_abort(JobError::Aborted(err.to_string()))
                        }
                    };
                    let _ = completions.send(completion);
                });
            }
        }
    }

    /// Starts the job immediately and returns a future that resolves to its result.
    pub fn run<T, F>(&self, job: F) -> BoxFuture<'static, Result<T, JobError>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match self {
            JobExecutor::Inline => futures::future::ready(Ok(job())).boxed(),
            JobExecutor::Runtime(handle) => {
                let join_handle = handle.spawn_blocking(job);
                async move {
                    join_handle
                        .await
                        .map_err(|err| JobError::Aborted(err.to_string()))
                }
                .boxed()
            }
        }
    }
}

/// Results of background jobs, waiting to be committed by the main thread.
pub struct CompletionQueue<T> {
    sender: UnboundedSender<T>,
    receiver: UnboundedReceiver<T>,
}

impl<T> CompletionQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> UnboundedSender<T> {
        self.sender.clone()
    }

    pub fn try_next(&mut self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            // we hold a sender ourselves, so the queue can't be disconnected.
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next result. Only resolves to `None` if every sender is gone, which can't happen while the
    /// queue itself is alive.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> Default for CompletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{CompletionQueue, JobExecutor};
    use futures::FutureExt;

    #[test]
    pub fn inline_jobs_are_queued_in_order() {
        let mut queue = CompletionQueue::new();
        let executor = JobExecutor::Inline;
        executor.spawn(queue.sender(), || 1, |_| 0);
        executor.spawn(queue.sender(), || 2, |_| 0);

        assert_eq!(queue.try_next(), Some(1));
        assert_eq!(queue.try_next(), Some(2));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    pub fn inline_futures_are_ready() {
        let result = JobExecutor::Inline.run(|| "done").now_or_never();
        assert_eq!(result, Some(Ok("done")));
    }

    #[tokio::test(flavor = "multi_thread")]
    pub async fn runtime_jobs_deliver_through_the_queue() {
        let mut queue = CompletionQueue::new();
        let executor = JobExecutor::current_or_inline();
        assert!(matches!(executor, JobExecutor::Runtime(_)));

        executor.spawn(queue.sender(), || 21 * 2, |_| 0);
        assert_eq!(executor.run(|| 5).await, Ok(5));

        let mut delivered = None;
        for _ in 0..100 {
            delivered = queue.try_next();
            if delivered.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(delivered, Some(42));
    }

    #[tokio::test(flavor = "multi_thread")]
    pub async fn panicking_jobs_deliver_the_abort_value() {
        let mut queue = CompletionQueue::new();
        let executor = JobExecutor::current_or_inline();

        executor.spawn(
            queue.sender(),
            || -> Result<u32, String> { panic!("broken job") },
            |err| Err(err.to_string()),
        );

        let delivered = tokio::time::timeout(std::time::Duration::from_secs(5), queue.next()).await;
        assert!(matches!(delivered, Ok(Some(Err(_)))));
    }
}
