use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::CoreError;
use crate::models::Task;

/// Reminder scheduling, driven after a task change has been stored.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    /// Schedules reminders for `task` and returns their handles.
    async fn schedule(&self, task: &Task) -> Result<Vec<String>, CoreError>;
    async fn cancel(&self, handles: &[String]) -> Result<(), CoreError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

#[async_trait]
impl NotificationScheduler for NoopScheduler {
    async fn schedule(&self, _task: &Task) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }

    async fn cancel(&self, _handles: &[String]) -> Result<(), CoreError> {
        Ok(())
    }
}
