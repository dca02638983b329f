//! Tokio-backed scheduler.
//!
//! `TokioScheduler` parks delayed jobs on timer tasks and pushes them onto an
//! mpsc channel when due. `JobRunner` drains the channel and runs each job on
//! its own task, bounded by a semaphore. Pending timers do not survive a
//! restart; runs left suspended can be resumed through the run controller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::error::{AppError, AppResult};

use super::{Job, JobHandler, Scheduler};

/// Production scheduler.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    sender: mpsc::UnboundedSender<Job>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiving end for a [`JobRunner`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn schedule(&self, delay: Duration, job: Job) -> AppResult<()> {
        if self.sender.is_closed() {
            return Err(AppError::Scheduler(format!(
                "job runner stopped, dropping {} for run {}",
                job.kind(),
                job.run_id()
            )));
        }

        if delay.is_zero() {
            return self.sender.send(job).map_err(|e| {
                AppError::Scheduler(format!("failed to enqueue {}: {}", e.0.kind(), e))
            });
        }

        tracing::debug!(
            run_id = %job.run_id(),
            job = job.kind(),
            delay_ms = delay.as_millis() as u64,
            "Job scheduled"
        );

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(job).is_err() {
                tracing::warn!(
                    run_id = %job.run_id(),
                    job = job.kind(),
                    "Job runner stopped before delayed job was due"
                );
            }
        });

        Ok(())
    }
}

/// Drains the scheduler channel.
pub struct JobRunner {
    receiver: mpsc::UnboundedReceiver<Job>,
    handler: Arc<dyn JobHandler>,
    semaphore: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Job>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
    ) -> Self {
        Self {
            receiver,
            handler,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Process jobs until `shutdown` resolves or every sender is dropped.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let job = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Job runner shutting down");
                    break;
                }
                job = self.receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            // Wait for available slot
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let handler = self.handler.clone();
            tokio::spawn(async move {
                // Keep permit until done
                let _permit = permit;
                handler.handle(job).await;
            });
        }

        tracing::info!("Job runner stopped");
    }
}
