use anyhow::Result;
use chrono::Datelike;
use tasksync_core::range::window_for;
use tasksync_core::TaskSync;

use crate::cli::MonthCommand;
use crate::views::table::{display_month, DaySummary};

pub async fn month_summary(sync: &TaskSync, command: MonthCommand) -> Result<()> {
    let today = sync.today();
    let year = command.year.unwrap_or_else(|| today.year());
    let month_index = i32::try_from(command.month.unwrap_or_else(|| today.month()))? - 1;

    sync.load_month(year, month_index).await?;
    let (start, end) = window_for(year, month_index)?;

    let days: Vec<DaySummary> = sync
        .snapshot()
        .into_iter()
        .filter(|(date, tasks)| *date >= start && *date <= end && !tasks.is_empty())
        .map(|(date, tasks)| {
            let done = tasks.iter().filter(|t| t.is_completed).count();
            DaySummary {
                date,
                open: tasks.len() - done,
                done,
            }
        })
        .collect();

    println!("{} to {}", start, end);
    display_month(&days);

    Ok(())
}
