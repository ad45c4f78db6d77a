use clap::Parser;
use clap::Subcommand;

/// A calendar to-do list backed by an optimistic task cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Add a new task
    Add(AddCommand),
    /// List the tasks of a day
    List(ListCommand),
    /// Summarize the three months around a month
    Month(MonthCommand),
    /// Edit a task
    Edit(EditCommand),
    /// Move a task to another day
    Move(MoveCommand),
    /// Toggle a task between open and completed
    Do(DoCommand),
    /// Delete a task
    Delete(DeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// The title of the task
    pub title: String,
    /// The day of the task (defaults to today)
    #[clap(short, long)]
    pub date: Option<String>,
    /// Time of day, HH:MM
    #[clap(short, long)]
    pub time: Option<String>,
    /// A link to attach
    #[clap(short, long)]
    pub link: Option<String>,
    /// A free-form note
    #[clap(short, long)]
    pub note: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// The day to show (defaults to today)
    #[clap(short, long)]
    pub date: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct MonthCommand {
    #[clap(short, long)]
    pub year: Option<i32>,
    /// Month number, 1-12
    #[clap(short, long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct EditCommand {
    /// The ID of the task to edit
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub time: Option<String>,
    #[arg(long, conflicts_with = "time")]
    pub time_clear: bool,

    #[arg(long)]
    pub link: Option<String>,
    #[arg(long, conflicts_with = "link")]
    pub link_clear: bool,

    #[arg(long)]
    pub note: Option<String>,
    #[arg(long, conflicts_with = "note")]
    pub note_clear: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct MoveCommand {
    /// The ID of the task to move
    pub id: String,
    /// The new day
    pub date: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DoCommand {
    /// The ID of the task to toggle
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// The ID of the task to delete
    pub id: String,
    /// Skip the confirmation prompt
    #[clap(short, long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_month_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["tasksync", "month", "--month", "13"]).is_err());
        assert!(Cli::try_parse_from(["tasksync", "month", "--month", "12"]).is_ok());
    }

    #[test]
    fn test_edit_clear_conflicts_with_value() {
        let result =
            Cli::try_parse_from(["tasksync", "edit", "ab", "--time", "09:00", "--time-clear"]);
        assert!(result.is_err());
    }
}
