use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Cancelled;

/// Spawned future that can be cancelled and then awaited to completion.
pub struct Task<T> {
    handle: JoinHandle<Result<T, Cancelled>>,
    cancellation_token: CancellationToken,
}

impl<T> Task<T>
where
    T: Send + 'static,
{
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let cancellation_token = CancellationToken::new();
        let cancellation_token_clone = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                result = future => Ok(result),
                _ = cancellation_token_clone.cancelled() => Err(Cancelled)
            }
        });

        Self {
            handle,
            cancellation_token,
        }
    }

    /// Runs `future` after `delay` unless cancelled first.
    pub fn delayed<F>(delay: Duration, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            future.await
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the task and waits until it has stopped running.
    pub async fn cancel(self) -> Option<T> {
        self.cancellation_token.cancel();
        match self.handle.await {
            Ok(Ok(result)) => Some(result),
            _ => None,
        }
    }
}
