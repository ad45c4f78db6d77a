use anyhow::Result;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use std::sync::Arc;
use tasksync_core::db;
use tasksync_core::error::CoreError;
use tasksync_core::preload::PreloadCoordinator;
use tasksync_core::range::window_around;
use tasksync_core::repository::SqliteTaskStore;
use tasksync_core::widget::JsonFilePublisher;
use tasksync_core::TaskSync;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use util::ensure_loaded;

mod cli;
mod commands;
mod config;
mod parser;
mod util;
mod views;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    let config = config::Config::new().unwrap_or_default();
    init_tracing(&config, cli.verbose);

    if let Err(e) = run(cli, config).await {
        handle_error(e);
        std::process::exit(1);
    }
}

fn init_tracing(config: &config::Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    // Already initialised is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: cli::Cli, config: config::Config) -> Result<()> {
    let db_pool = db::establish_connection(&config.database_path).await?;
    let store = Arc::new(SqliteTaskStore::new(db_pool));

    let preload = PreloadCoordinator::new(store.clone());
    let mut builder = TaskSync::builder(store.clone())
        .preload(preload.clone())
        .config(config.sync_config());
    if let Some(path) = &config.widget_path {
        builder = builder.publisher(Arc::new(JsonFilePublisher::new(path)));
    }
    let sync = builder.build();

    let (start, end) = window_around(sync.today())?;
    let _preload = preload.spawn_preload(start, end);
    debug!(%start, %end, "Preloading session window");
    ensure_loaded(&sync, sync.today()).await?;

    match cli.command {
        cli::Commands::Add(command) => commands::add::add_task(&sync, command).await,
        cli::Commands::List(command) => commands::list::list_tasks(&sync, command).await,
        cli::Commands::Month(command) => commands::month::month_summary(&sync, command).await,
        cli::Commands::Edit(command) => commands::edit::edit_task(&sync, &store, command).await,
        cli::Commands::Move(command) => commands::r#move::move_task(&sync, &store, command).await,
        cli::Commands::Do(command) => commands::r#do::do_task(&sync, &store, command).await,
        cli::Commands::Delete(command) => {
            commands::delete::delete_task(&sync, &store, command).await
        }
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.chain().find_map(|e| e.downcast_ref::<CoreError>()) {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::AmbiguousId(tasks) => {
                eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
                eprintln!("Did you mean one of these?");
                for (id, title) in tasks {
                    eprintln!("  {} ({})", id.yellow(), title);
                }
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::Remote(s) => {
                eprintln!(
                    "{} The change was rolled back: {}",
                    "Error:".style(error_style),
                    s
                );
            }
            _ => eprintln!("{} {}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {}", "Error:".style(error_style), err);
    }
}
