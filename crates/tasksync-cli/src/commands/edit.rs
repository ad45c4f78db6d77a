use anyhow::{bail, Result};
use tasksync_core::models::{parse_time, TaskPatch};
use tasksync_core::repository::SqliteTaskStore;
use tasksync_core::TaskSync;

use crate::cli::EditCommand;
use crate::util::{ensure_loaded, resolve_task};

pub async fn edit_task(
    sync: &TaskSync,
    store: &SqliteTaskStore,
    command: EditCommand,
) -> Result<()> {
    let task = resolve_task(store, &command.id).await?;

    let time = if command.time_clear {
        Some(None)
    } else if let Some(time_str) = command.time {
        Some(Some(parse_time(&time_str)?))
    } else {
        None
    };

    let link = if command.link_clear {
        Some(None)
    } else {
        command.link.map(Some)
    };

    let note = if command.note_clear {
        Some(None)
    } else {
        command.note.map(Some)
    };

    let patch = TaskPatch {
        title: command.title,
        time,
        link,
        note,
        ..Default::default()
    };
    if patch.is_empty() {
        bail!("Nothing to change. Pass --title, --time, --link or --note.");
    }

    ensure_loaded(sync, task.date).await?;
    sync.update(&task.id, patch).await?;

    let title = sync
        .find(&task.id)
        .map(|t| t.title)
        .unwrap_or(task.title);
    println!("Updated task: '{}'", title);

    Ok(())
}
