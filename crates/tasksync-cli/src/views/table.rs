use chrono::{Local, NaiveDate};
use comfy_table::{Attribute, Cell, Color, Row, Table};
use tasksync_core::models::{format_time, Task};

use crate::util::short_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub open: usize,
    pub done: usize,
}

/// Prints one day's tasks in the order the cache returns them.
pub fn display_day(date: NaiveDate, tasks: &[Task]) {
    println!("{}", date.format("%A, %Y-%m-%d"));
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Time", "Title", "Link", "Note"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&task.id)));
        row.add_cell(Cell::new(
            task.time
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| "-".to_string()),
        ));

        let mut title_cell = Cell::new(&task.title);
        if task.is_completed {
            title_cell = title_cell
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey);
        }
        row.add_cell(title_cell);

        row.add_cell(Cell::new(task.link.as_deref().unwrap_or("")));
        row.add_cell(Cell::new(task.note.as_deref().unwrap_or("")));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_month(days: &[DaySummary]) {
    if days.is_empty() {
        println!("No tasks found.");
        return;
    }

    let today = Local::now().date_naive();
    let mut table = Table::new();
    table.set_header(vec!["Date", "Open", "Done"]);

    for day in days {
        let mut date_cell = Cell::new(day.date.format("%a %Y-%m-%d"));
        if day.date == today {
            date_cell = date_cell.fg(Color::Yellow).add_attribute(Attribute::Bold);
        }

        let mut row = Row::new();
        row.add_cell(date_cell);
        row.add_cell(Cell::new(day.open));
        row.add_cell(Cell::new(day.done).fg(Color::Green));
        table.add_row(row);
    }

    println!("{table}");
}
