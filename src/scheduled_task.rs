use std::future::Future;

use chrono::{DateTime, Utc};
use rocket::tokio::{self, task::JoinHandle, time::Duration};

/// A task that will run at a specific point in the future, unless cancelled first.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Schedule `task` to run at `run_at`.
    /// If `run_at` is in the past, the task runs immediately.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay_until(run_at)).await;
            task.await
        });
        Self { handle }
    }

    /// Cancel the task. Has no effect if it has already run.
    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// The time from now until `datetime`, or zero if it has passed.
fn delay_until(datetime: DateTime<Utc>) -> Duration {
    (datetime - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[backend_test]
    async fn past_tasks_run_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let _task = ScheduledTask::new(
            async move { flag.store(true, Ordering::SeqCst) },
            Utc::now() - chrono::Duration::seconds(10),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[backend_test]
    async fn cancelled_tasks_never_run() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::new(
            async move { flag.store(true, Ordering::SeqCst) },
            Utc::now() + chrono::Duration::milliseconds(100),
        );
        task.cancel();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
