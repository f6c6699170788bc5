//! PostgreSQL-backed task store.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::{StoreError, Task, TaskStore};
use crate::config::DatabaseConfig;
use crate::telemetry::trace::SpanFactory;

const CREATE_TASKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id BIGSERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        completed BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

const TASK_COLUMNS: &str = "id, title, completed, created_at, updated_at";

#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
    spans: SpanFactory,
}

impl PgTaskStore {
    /// Wrap an existing pool; schema setup is traced through `spans`.
    pub fn new(pool: PgPool, spans: SpanFactory) -> Self {
        Self { pool, spans }
    }

    /// Open a pool against the configured database.
    pub async fn connect(config: &DatabaseConfig, spans: SpanFactory) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url())
            .await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Connected to PostgreSQL"
        );
        Ok(Self::new(pool, spans))
    }
}

fn task_from_row(row: &PgRow) -> Result<Task, sqlx::Error> {
    Ok(Task {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        completed: row.try_get("completed")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TaskStore for PgTaskStore {
    fn system(&self) -> &'static str {
        "postgresql"
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let span = self.spans.start("create_tables");
        span.set_attribute(KeyValue::new("operation", "create_tables"));

        match sqlx::query(CREATE_TASKS_TABLE).execute(&self.pool).await {
            Ok(_) => {
                span.set_attribute(KeyValue::new("success", true));
                tracing::info!("Tables created or verified");
                Ok(())
            }
            Err(e) => {
                span.set_attribute(KeyValue::new("success", false));
                span.record_error(&e);
                tracing::error!(error = %e, "Failed to create tables");
                Err(e.into())
            }
        }
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn create(&self, title: &str) -> Result<Task, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO tasks (title) VALUES ($1) RETURNING {TASK_COLUMNS}"
        ))
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(task_from_row(&row)?)
    }

    async fn complete(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE tasks SET completed = TRUE, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(task_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}
