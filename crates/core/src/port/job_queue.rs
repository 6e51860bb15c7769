// Job Queue Port (Interface)
//
// Delayed, at-least-once task delivery. The core never assumes a task is
// delivered exactly once; every consumer is idempotent against redelivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A unit of work, carrying enough state to be re-executed statelessly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueTask {
    /// One scheduler sweep; `reschedule` re-enqueues the loop afterwards
    RunScheduler { reschedule: bool },
    /// Generate one pending export
    GenerateExport { export_id: String },
}

impl QueueTask {
    pub fn kind(&self) -> &'static str {
        match self {
            QueueTask::RunScheduler { .. } => "run_scheduler",
            QueueTask::GenerateExport { .. } => "generate_export",
        }
    }
}

/// A task handed back by the queue
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub id: String,
    pub task: QueueTask,
    /// Human-readable description for queue observability
    pub label: Option<String>,
    /// Earliest execution instant, epoch ms
    pub run_at: i64,
}

/// Job queue port
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue for execution `delay_secs` from now (0 = as soon as possible)
    async fn enqueue(
        &self,
        task: QueueTask,
        delay_secs: i64,
        label: Option<String>,
    ) -> Result<String>;

    /// Pop the next due task, atomically marking it running
    async fn pop_due(&self) -> Result<Option<QueuedTask>>;

    async fn mark_done(&self, task_id: &str) -> Result<()>;

    async fn mark_failed(&self, task_id: &str, error: &str) -> Result<()>;

    /// Bootstrap dedup probe: is a scheduler task already queued or running?
    async fn has_pending_scheduler(&self) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::TimeProvider;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum SlotState {
        Queued,
        Running,
        Done,
        Failed,
    }

    #[derive(Clone)]
    struct Slot {
        task: QueuedTask,
        state: SlotState,
    }

    /// In-memory delayed queue for tests
    pub struct MemoryJobQueue {
        slots: Mutex<Vec<Slot>>,
        time: Arc<dyn TimeProvider>,
        counter: AtomicU64,
    }

    impl MemoryJobQueue {
        pub fn new(time: Arc<dyn TimeProvider>) -> Self {
            Self {
                slots: Mutex::new(Vec::new()),
                time,
                counter: AtomicU64::new(0),
            }
        }

        /// Every task still queued (not yet popped), for assertions
        pub fn queued_tasks(&self) -> Vec<QueuedTask> {
            self.slots
                .lock()
                .expect("queue lock")
                .iter()
                .filter(|s| s.state == SlotState::Queued)
                .map(|s| s.task.clone())
                .collect()
        }

        pub fn failed_count(&self) -> usize {
            self.slots
                .lock()
                .expect("queue lock")
                .iter()
                .filter(|s| s.state == SlotState::Failed)
                .count()
        }
    }

    #[async_trait]
    impl JobQueue for MemoryJobQueue {
        async fn enqueue(
            &self,
            task: QueueTask,
            delay_secs: i64,
            label: Option<String>,
        ) -> Result<String> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("task-{}", n);
            let queued = QueuedTask {
                id: id.clone(),
                task,
                label,
                run_at: self.time.now_millis() + delay_secs * 1000,
            };
            self.slots.lock().expect("queue lock").push(Slot {
                task: queued,
                state: SlotState::Queued,
            });
            Ok(id)
        }

        async fn pop_due(&self) -> Result<Option<QueuedTask>> {
            let now = self.time.now_millis();
            let mut slots = self.slots.lock().expect("queue lock");
            let due = slots
                .iter_mut()
                .filter(|s| s.state == SlotState::Queued && s.task.run_at <= now)
                .min_by_key(|s| (s.task.run_at, s.task.id.clone()));
            Ok(due.map(|slot| {
                slot.state = SlotState::Running;
                slot.task.clone()
            }))
        }

        async fn mark_done(&self, task_id: &str) -> Result<()> {
            let mut slots = self.slots.lock().expect("queue lock");
            if let Some(slot) = slots.iter_mut().find(|s| s.task.id == task_id) {
                slot.state = SlotState::Done;
            }
            Ok(())
        }

        async fn mark_failed(&self, task_id: &str, _error: &str) -> Result<()> {
            let mut slots = self.slots.lock().expect("queue lock");
            if let Some(slot) = slots.iter_mut().find(|s| s.task.id == task_id) {
                slot.state = SlotState::Failed;
            }
            Ok(())
        }

        async fn has_pending_scheduler(&self) -> Result<bool> {
            let slots = self.slots.lock().expect("queue lock");
            Ok(slots.iter().any(|s| {
                matches!(s.task.task, QueueTask::RunScheduler { .. })
                    && matches!(s.state, SlotState::Queued | SlotState::Running)
            }))
        }
    }
}
