// Queue Worker - polls the job queue and dispatches tasks

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::pipeline::ExportPipeline;
use crate::application::scheduler_job::SchedulerJob;
use crate::error::Result;
use crate::port::{JobQueue, QueueTask};

/// Worker processing queued scheduler and export tasks
pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    scheduler: Arc<SchedulerJob>,
    pipeline: Arc<ExportPipeline>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        scheduler: Arc<SchedulerJob>,
        pipeline: Arc<ExportPipeline>,
    ) -> Self {
        Self {
            queue,
            scheduler,
            pipeline,
        }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("queue worker started");
        loop {
            if shutdown.is_shutdown() {
                info!("queue worker shutting down");
                break;
            }
            match self.process_next().await {
                Ok(processed) => {
                    if !processed {
                        // Nothing due, sleep briefly (or wait for shutdown)
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!("queue worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    error!("queue worker error: {}", err);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("queue worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("queue worker stopped");
        Ok(())
    }

    /// Process the next due task (returns true if one was processed)
    pub async fn process_next(&self) -> Result<bool> {
        let Some(task) = self.queue.pop_due().await? else {
            return Ok(false);
        };

        info!(
            task_id = %task.id,
            kind = task.task.kind(),
            label = task.label.as_deref().unwrap_or(""),
            "processing queue task"
        );

        // Execute in a spawned task so a panic cannot kill the worker loop
        let scheduler = Arc::clone(&self.scheduler);
        let pipeline = Arc::clone(&self.pipeline);
        let payload = task.task.clone();
        let handle = tokio::spawn(async move {
            match payload {
                QueueTask::RunScheduler { reschedule } => {
                    scheduler.run(reschedule).await.map(|_| ())
                }
                QueueTask::GenerateExport { export_id } => {
                    pipeline.generate(&export_id).await.map(|_| ())
                }
            }
        });

        match handle.await {
            Ok(Ok(())) => {
                self.queue.mark_done(&task.id).await?;
            }
            Ok(Err(err)) => {
                // The failure is already persisted where it matters (the
                // export record); the queue only needs it for visibility
                warn!(task_id = %task.id, error = %err, "queue task failed");
                self.queue.mark_failed(&task.id, &err.to_string()).await?;
            }
            Err(join_err) => {
                error!(task_id = %task.id, error = ?join_err, "queue task panicked");
                self.queue.mark_failed(&task.id, "task panicked").await?;
            }
        }
        Ok(true)
    }
}
