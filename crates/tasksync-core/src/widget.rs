//! Side channel that mirrors today's task list to a home-screen widget.
//!
//! Publishing is best effort. The mutator logs and drops any error returned
//! here; a widget failure never rolls back a task change.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::CoreError;
use crate::models::Task;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait WidgetPublisher: Send + Sync {
    /// Receives `date`'s tasks in display order.
    async fn publish(&self, date: NaiveDate, tasks: &[Task]) -> Result<(), CoreError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl WidgetPublisher for NoopPublisher {
    async fn publish(&self, _date: NaiveDate, _tasks: &[Task]) -> Result<(), CoreError> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WidgetPayload<'a> {
    date: NaiveDate,
    tasks: &'a [Task],
    updated_at: DateTime<Utc>,
}

/// Writes the widget payload as JSON to a file that the platform widget reads.
/// The file is replaced atomically.
#[derive(Debug, Clone)]
pub struct JsonFilePublisher {
    path: PathBuf,
}

impl JsonFilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WidgetPublisher for JsonFilePublisher {
    async fn publish(&self, date: NaiveDate, tasks: &[Task]) -> Result<(), CoreError> {
        let payload = WidgetPayload {
            date,
            tasks,
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&payload)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = tasks.len(), "Published widget payload");
        Ok(())
    }
}
