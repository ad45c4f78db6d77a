use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use tasksync_core::error::CoreError;
use tasksync_core::models::{Task, TaskId};
use tasksync_core::repository::SqliteTaskStore;
use tasksync_core::TaskSync;

pub const SHORT_ID_LEN: usize = 8;

pub async fn resolve_task(store: &SqliteTaskStore, short_id: &str) -> Result<Task> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    let mut tasks = store.find_by_id_prefix(short_id).await?;
    if tasks.len() == 1 {
        Ok(tasks.remove(0))
    } else if tasks.is_empty() {
        Err(anyhow!(CoreError::NotFound(format!(
            "No task found with ID prefix '{}'",
            short_id
        ))))
    } else {
        let task_info: Vec<(String, String)> = tasks
            .into_iter()
            .map(|t| (t.id.to_string(), t.title))
            .collect();
        Err(anyhow!(CoreError::AmbiguousId(task_info)))
    }
}

pub fn short_id(id: &TaskId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

/// Loads the three-month window around `date` into the session cache.
pub async fn ensure_loaded(sync: &TaskSync, date: NaiveDate) -> Result<()> {
    let month_index = i32::try_from(date.month0())?;
    sync.load_month(date.year(), month_index).await?;
    Ok(())
}
