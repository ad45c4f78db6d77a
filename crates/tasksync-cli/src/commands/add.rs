use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use tasksync_core::models::{parse_time, NewTask};
use tasksync_core::TaskSync;

use crate::cli::AddCommand;
use crate::parser::parse_date;
use crate::util::{ensure_loaded, short_id};

pub async fn add_task(sync: &TaskSync, command: AddCommand) -> Result<()> {
    let date = match command.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => sync.today(),
    };
    let time = command.time.as_deref().map(parse_time).transpose()?;

    let data = NewTask {
        title: command.title,
        date,
        time,
        link: command.link,
        note: command.note,
    };

    ensure_loaded(sync, date).await?;
    let added_task = sync.create(data).await?;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    let subtle_style = Style::new().bright_black();

    println!(
        "{} Created task: {}",
        "✓".style(success_style),
        added_task.title.bright_white().bold()
    );
    println!(
        "  {} Task ID: {}",
        "→".style(info_style),
        short_id(&added_task.id).yellow()
    );
    let when = match added_task.time.as_ref() {
        Some(time) => format!("{} {}", added_task.date, time.format("%H:%M")),
        None => added_task.date.to_string(),
    };
    println!("  {} Date: {}", "→".style(info_style), when.cyan());

    println!("\n{} Quick actions:", "💡".style(subtle_style));
    println!(
        "   {} Mark complete: tasksync do {}",
        "•".style(subtle_style),
        short_id(&added_task.id).yellow()
    );
    println!(
        "   {} Move: tasksync move {} <date>",
        "•".style(subtle_style),
        short_id(&added_task.id).yellow()
    );

    Ok(())
}
