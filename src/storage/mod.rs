//! Task storage subsystem.
//!
//! # Data Flow
//! ```text
//! handlers.rs
//!     → SharedStore (Arc<dyn TaskStore>)
//!     → instrumented.rs (client spans + duration histogram, when applied)
//!     → postgres.rs (sqlx PgPool) | memory.rs (tests, `backend = "memory"`)
//! ```

pub mod instrumented;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::telemetry::trace::SpanFactory;

pub use instrumented::InstrumentedStore;
pub use memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

pub const TASKS_TABLE: &str = "tasks";

/// A to-do item as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("query failed: {0}")]
    Query(String),
}

/// Persistence for tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Value reported as `db.system` on client spans.
    fn system(&self) -> &'static str;

    /// Create the schema if it does not exist.
    async fn migrate(&self) -> Result<(), StoreError>;

    /// All tasks, newest first.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    async fn create(&self, title: &str) -> Result<Task, StoreError>;

    /// Mark a task completed. `None` when no task has this id.
    async fn complete(&self, id: i64) -> Result<Option<Task>, StoreError>;

    /// Remove a task. `false` when no task has this id.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Run a statement and discard its result.
    async fn execute_raw(&self, sql: &str) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn TaskStore>;

/// Open the configured backend.
pub async fn connect(config: &DatabaseConfig, spans: SpanFactory) -> Result<SharedStore, StoreError> {
    match config.backend {
        StoreBackend::Postgres => {
            let store = PgTaskStore::connect(config, spans).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => Ok(Arc::new(InMemoryTaskStore::new())),
    }
}
