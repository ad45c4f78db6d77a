use anyhow::Result;
use tasksync_core::repository::SqliteTaskStore;
use tasksync_core::TaskSync;

use crate::cli::DoCommand;
use crate::util::{ensure_loaded, resolve_task};

pub async fn do_task(sync: &TaskSync, store: &SqliteTaskStore, command: DoCommand) -> Result<()> {
    let task = resolve_task(store, &command.id).await?;
    ensure_loaded(sync, task.date).await?;

    if sync.toggle(&task.id).await? {
        println!("Completed task: '{}'", task.title);
    } else {
        println!("Reopened task: '{}'", task.title);
    }

    Ok(())
}
