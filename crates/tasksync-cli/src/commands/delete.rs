use anyhow::Result;
use dialoguer::Confirm;
use tasksync_core::repository::SqliteTaskStore;
use tasksync_core::TaskSync;

use crate::cli::DeleteCommand;
use crate::util::{ensure_loaded, resolve_task};

pub async fn delete_task(
    sync: &TaskSync,
    store: &SqliteTaskStore,
    command: DeleteCommand,
) -> Result<()> {
    let task = resolve_task(store, &command.id).await?;

    if !command.force {
        let confirmation = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to delete task '{}'?",
                task.title
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    ensure_loaded(sync, task.date).await?;
    sync.delete(&task.id).await?;
    println!("Deleted task: '{}'", task.title);

    Ok(())
}
