//! Deterministic scheduler for tests and embedders.
//!
//! Jobs are queued with their requested delay and only run when the caller
//! drains them. Draining ignores the delay, which is how a test "lets time
//! pass" for a wait step.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

use super::{Job, JobHandler, Scheduler};

/// A scheduled job and the delay it was submitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
    pub delay: Duration,
    pub job: Job,
}

#[derive(Debug, Default)]
pub struct RecordingScheduler {
    queue: Mutex<VecDeque<ScheduledJob>>,
    history: Mutex<Vec<ScheduledJob>>,
    closed: Mutex<bool>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs not yet drained, in submission order.
    pub async fn pending(&self) -> Vec<ScheduledJob> {
        self.queue.lock().await.iter().copied().collect()
    }

    /// Every job ever submitted.
    pub async fn history(&self) -> Vec<ScheduledJob> {
        self.history.lock().await.clone()
    }

    pub async fn pop(&self) -> Option<ScheduledJob> {
        self.queue.lock().await.pop_front()
    }

    /// Reject further submissions, as a stopped runner would.
    pub async fn close(&self) {
        *self.closed.lock().await = true;
    }

    /// Run zero-delay jobs until none are left. Delayed jobs stay queued.
    pub async fn drain_immediate(&self, handler: &dyn JobHandler) -> usize {
        let mut handled = 0;
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                let index = queue.iter().position(|s| s.delay.is_zero());
                index.and_then(|i| queue.remove(i))
            };
            let Some(scheduled) = next else {
                return handled;
            };
            handler.handle(scheduled.job).await;
            handled += 1;
        }
    }

    /// Run every job, delayed ones included, until the queue is empty or
    /// `max_jobs` have run.
    pub async fn drain_all(&self, handler: &dyn JobHandler, max_jobs: usize) -> usize {
        let mut handled = 0;
        while handled < max_jobs {
            let Some(scheduled) = self.pop().await else {
                break;
            };
            handler.handle(scheduled.job).await;
            handled += 1;
        }
        handled
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule(&self, delay: Duration, job: Job) -> AppResult<()> {
        if *self.closed.lock().await {
            return Err(AppError::Scheduler("scheduler closed".to_string()));
        }
        let scheduled = ScheduledJob { delay, job };
        self.history.lock().await.push(scheduled);
        self.queue.lock().await.push_back(scheduled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Count(Mutex<Vec<Job>>);

    #[async_trait]
    impl JobHandler for Count {
        async fn handle(&self, job: Job) {
            self.0.lock().await.push(job);
        }
    }

    #[tokio::test]
    async fn test_drain_immediate_leaves_delayed_jobs() {
        let scheduler = RecordingScheduler::new();
        let run_id = Uuid::new_v4();
        scheduler
            .schedule(Duration::from_secs(60), Job::Continue { run_id })
            .await
            .unwrap();
        scheduler
            .schedule(Duration::ZERO, Job::Dispatch { run_id })
            .await
            .unwrap();

        let handler = Count(Mutex::new(vec![]));
        assert_eq!(scheduler.drain_immediate(&handler).await, 1);
        assert_eq!(handler.0.lock().await.as_slice(), &[Job::Dispatch { run_id }]);

        let pending = scheduler.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].delay, Duration::from_secs(60));

        assert_eq!(scheduler.drain_all(&handler, 10).await, 1);
        assert!(scheduler.pending().await.is_empty());
        assert_eq!(scheduler.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_scheduler_rejects() {
        let scheduler = RecordingScheduler::new();
        scheduler.close().await;
        let result = scheduler
            .schedule(Duration::ZERO, Job::Dispatch { run_id: Uuid::new_v4() })
            .await;
        assert!(result.is_err());
    }
}
