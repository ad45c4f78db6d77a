use anyhow::Result;
use tasksync_core::repository::SqliteTaskStore;
use tasksync_core::sync::MoveOutcome;
use tasksync_core::TaskSync;

use crate::cli::MoveCommand;
use crate::parser::parse_date;
use crate::util::{ensure_loaded, resolve_task};

pub async fn move_task(
    sync: &TaskSync,
    store: &SqliteTaskStore,
    command: MoveCommand,
) -> Result<()> {
    let task = resolve_task(store, &command.id).await?;
    let to = parse_date(&command.date)?;

    ensure_loaded(sync, task.date).await?;
    sync.select_date(task.date);

    match sync.move_task(&task.id, to).await? {
        MoveOutcome::Moved => println!("Moved task: '{}' to {}", task.title, to),
        MoveOutcome::Ignored => println!("Task '{}' is already on {}", task.title, to),
    }

    Ok(())
}
