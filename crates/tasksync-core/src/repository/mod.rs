use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{NewTask, Task, TaskPatch};
use async_trait::async_trait;
use chrono::NaiveDate;
#[cfg(test)]
use mockall::automock;

pub mod tasks;

/// The backend of record. Every method is a single remote round trip keyed by
/// the durable id; temporary ids never reach this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteTaskStore: Send + Sync {
    /// Tasks dated within `start..=end`.
    async fn list(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>, CoreError>;
    /// Stores a new task and returns it with its durable id.
    async fn create(&self, data: NewTask) -> Result<Task, CoreError>;
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, CoreError>;
    async fn set_completed(&self, id: &str, completed: bool) -> Result<Task, CoreError>;
    async fn delete(&self, id: &str) -> Result<(), CoreError>;
}

/// SQLite implementation of the remote store
pub struct SqliteTaskStore {
    pool: DbPool,
}

impl SqliteTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl std::fmt::Debug for SqliteTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTaskStore").finish_non_exhaustive()
    }
}
