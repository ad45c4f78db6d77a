use anyhow::Result;
use tasksync_core::TaskSync;

use crate::cli::ListCommand;
use crate::parser::parse_date;
use crate::util::ensure_loaded;
use crate::views::table::display_day;

pub async fn list_tasks(sync: &TaskSync, command: ListCommand) -> Result<()> {
    let date = match command.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => sync.today(),
    };

    ensure_loaded(sync, date).await?;
    display_day(date, &sync.tasks_for(date));

    Ok(())
}
