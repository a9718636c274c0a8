//! Coalesce bursts of events into a single delayed action.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type Action<T> = dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// Runs an async action once events stop arriving for `window`.
///
/// Each call to [`trigger`](Self::trigger) cancels the pending run and
/// schedules a new one with the latest value, so only the last event of a
/// burst reaches the action. Must be used inside a tokio runtime.
pub struct Debouncer<T> {
    window: Duration,
    action: Arc<Action<T>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            window,
            action: Arc::new(
                move |value: T| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    Box::pin(action(value))
                },
            ),
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule the action with `value`, replacing any pending run
    pub fn trigger(&self, value: T) {
        let action = self.action.clone();
        let window = self.window;

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            action(value).await;
        }));
    }
}

impl<T> Debouncer<T> {
    /// Drop the pending run, if any
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }

    /// Whether a run is scheduled and has not finished
    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    fn recorder() -> (Arc<AsyncMutex<Vec<u32>>>, Debouncer<u32>) {
        let seen = Arc::new(AsyncMutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(Duration::from_millis(50), move |value| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(value);
            }
        });
        (seen, debouncer)
    }

    #[tokio::test]
    async fn test_only_last_event_in_burst_runs() {
        let (seen, debouncer) = recorder();

        for value in 1..=5 {
            debouncer.trigger(value);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*seen.lock().await, vec![5]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn test_separate_bursts_each_run() {
        let (seen, debouncer) = recorder();

        debouncer.trigger(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.trigger(2);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*seen.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_run() {
        let (seen, debouncer) = recorder();

        debouncer.trigger(1);
        assert!(debouncer.is_pending());
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_runs_before_window() {
        let (seen, debouncer) = recorder();

        debouncer.trigger(1);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(seen.lock().await.is_empty());
        assert_eq!(debouncer.window(), Duration::from_millis(50));
    }
}
