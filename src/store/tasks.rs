use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Task, TaskProgress, TaskStatus, TaskStep};

/// Progress tracking for ingestion runs. Single writer: only the
/// pipeline orchestrator touches a task after creation.
#[derive(Clone)]
pub struct TaskStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    task_type: String,
    status: String,
    payload: serde_json::Value,
    total_files: i64,
    processed_files: i64,
    current_step: String,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_model(self) -> Task {
        let status = match self.status.as_str() {
            "in_progress" => TaskStatus::InProgress,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        };
        Task {
            task_id: self.task_id,
            task_type: self.task_type,
            status,
            payload: self.payload,
            progress: TaskProgress {
                total_files: self.total_files,
                processed_files: self.processed_files,
                current_step: self.current_step,
            },
            result: self.result,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        }
    }
}

impl TaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task_type: &str, payload: serde_json::Value) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO tasks (task_id, task_type, status, payload, current_step) \
             VALUES ($1, $2, 'pending', $3, $4)",
        )
        .bind(&task_id)
        .bind(task_type)
        .bind(payload)
        .bind(TaskStep::Queued.as_str())
        .execute(&self.pool)
        .await?;
        Ok(task_id)
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(TaskRow::into_model))
    }

    pub async fn update_progress(
        &self,
        task_id: &str,
        processed_files: i64,
        total_files: i64,
        step: TaskStep,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'in_progress', current_step = $2, \
             processed_files = $3, total_files = $4, \
             started_at = COALESCE(started_at, now()), updated_at = now() \
             WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(step.as_str())
        .bind(processed_files)
        .bind(total_files)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_step(&self, task_id: &str, step: TaskStep) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET current_step = $2, status = 'in_progress', \
             started_at = COALESCE(started_at, now()), updated_at = now() \
             WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(step.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete(
        &self,
        task_id: &str,
        result: Option<serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'completed', current_step = $2, result = $3, \
             completed_at = now(), updated_at = now() WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(TaskStep::Completed.as_str())
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail(&self, task_id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'failed', error_message = $2, updated_at = now() \
             WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
