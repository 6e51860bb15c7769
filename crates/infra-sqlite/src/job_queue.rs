// SQLite JobQueue Implementation
//
// A delayed, at-least-once queue over one table. Popping is a single
// atomic UPDATE ... RETURNING, so concurrent workers never hand out the
// same task twice.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use exportd_core::error::Result;
use exportd_core::port::{IdProvider, JobQueue, QueueTask, QueuedTask, TimeProvider};

use crate::map_sqlx_error;

pub struct SqliteJobQueue {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl SqliteJobQueue {
    pub fn new(
        pool: SqlitePool,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            pool,
            time_provider,
            id_provider,
        }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        task: QueueTask,
        delay_secs: i64,
        label: Option<String>,
    ) -> Result<String> {
        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();
        let run_at = now + delay_secs.max(0) * 1000;
        let payload = serde_json::to_string(&task)?;

        sqlx::query(
            r#"
            INSERT INTO queue_tasks (id, kind, payload, label, state, run_at, created_at)
            VALUES (?, ?, ?, ?, 'queued', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(task.kind())
        .bind(&payload)
        .bind(&label)
        .bind(run_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        tracing::debug!(task_id = %id, kind = task.kind(), run_at, "task enqueued");
        Ok(id)
    }

    async fn pop_due(&self) -> Result<Option<QueuedTask>> {
        let now = self.time_provider.now_millis();

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE queue_tasks
            SET state = 'running', started_at = ?
            WHERE id = (
                SELECT id FROM queue_tasks
                WHERE state = 'queued' AND run_at <= ?
                ORDER BY run_at ASC, created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(row.into_queued_task()?)),
            None => Ok(None),
        }
    }

    async fn mark_done(&self, task_id: &str) -> Result<()> {
        sqlx::query("UPDATE queue_tasks SET state = 'done', finished_at = ? WHERE id = ?")
            .bind(self.time_provider.now_millis())
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE queue_tasks SET state = 'failed', error = ?, finished_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(self.time_provider.now_millis())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn has_pending_scheduler(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM queue_tasks
            WHERE kind = 'run_scheduler' AND state IN ('queued', 'running')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count > 0)
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    payload: String,
    label: Option<String>,
    run_at: i64,
}

impl TaskRow {
    fn into_queued_task(self) -> Result<QueuedTask> {
        let task: QueueTask = serde_json::from_str(&self.payload)?;
        Ok(QueuedTask {
            id: self.id,
            task,
            label: self.label,
            run_at: self.run_at,
        })
    }
}
