//! In-memory task store.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{StoreError, Task, TaskStore};

/// Task store held in process memory.
///
/// Only `SELECT 1` is understood by [`TaskStore::execute_raw`]; anything else
/// fails the way a missing table would.
#[derive(Debug)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
    next_id: AtomicI64,
    available: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call fail, as if the database went away.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Query("connection refused".to_string()))
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Query("task table lock poisoned".to_string())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn system(&self) -> &'static str {
        "memory"
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let tasks = self.tasks.read().map_err(|_| Self::poisoned())?;
        let mut listed = tasks.clone();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(listed)
    }

    async fn create(&self, title: &str) -> Result<Task, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let task = Task {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            title: title.to_string(),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        self.tasks
            .write()
            .map_err(|_| Self::poisoned())?
            .push(task.clone());
        Ok(task)
    }

    async fn complete(&self, id: i64) -> Result<Option<Task>, StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.write().map_err(|_| Self::poisoned())?;
        Ok(tasks.iter_mut().find(|t| t.id == id).map(|task| {
            task.completed = true;
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.write().map_err(|_| Self::poisoned())?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        Ok(tasks.len() != before)
    }

    async fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if sql.trim().eq_ignore_ascii_case("select 1") {
            Ok(())
        } else {
            Err(StoreError::Query(format!("relation referenced by `{sql}` does not exist")))
        }
    }
}
