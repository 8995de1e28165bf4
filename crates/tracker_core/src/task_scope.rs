use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifetime boundary for a controller's asynchronous work. Cancelling the
/// scope abandons anything still in flight: the future is dropped at its
/// current await point, so a late-resolving store call can no longer mutate
/// state or emit events. Dropping the scope cancels it.
pub struct TaskScope {
    token: CancellationToken,
}

impl TaskScope {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Runs `fut` to completion unless the scope is cancelled first.
    /// Returns `None` when cancelled; the cancellation branch is checked
    /// before the future, so work submitted after `cancel` never starts.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Detached variant of [`run`](Self::run) for fire-and-forget work bound
    /// to the same lifetime.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        })
    }

    /// Idempotent; every waiter observes the first cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn run_completes_work_on_a_live_scope() {
        let scope = TaskScope::new();
        let out = scope.run(async { 7 }).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn run_refuses_work_after_cancel() {
        let scope = TaskScope::new();
        scope.cancel();

        let touched = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&touched);
        let out = scope
            .run(async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(out, None);
        assert!(!touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_discards_in_flight_run() {
        let scope = Arc::new(TaskScope::new());
        let touched = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&touched);
        let runner = Arc::clone(&scope);
        let handle = tokio::spawn(async move {
            runner
                .run(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    flag.store(true, Ordering::SeqCst);
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();

        let out = handle.await.expect("join");
        assert_eq!(out, None);
        assert!(!touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawned_task_stops_at_cancellation() {
        let scope = TaskScope::new();
        let touched = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&touched);
        let handle = scope.spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();
        handle.await.expect("join");

        assert!(!touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_the_scope_cancels_spawned_work() {
        let scope = TaskScope::new();
        let touched = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&touched);
        let handle = scope.spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        });

        drop(scope);
        handle.await.expect("join");

        assert!(!touched.load(Ordering::SeqCst));
    }
}
