//! # Tasksync Core Library
//!
//! An optimistic, date-bucketed task cache that sits in front of a remote
//! task store.
//!
//! ## Features
//!
//! - **Optimistic Mutations**: creates, edits, moves, toggles and deletes are
//!   visible immediately and rolled back if the store rejects them
//! - **Provisional Records**: tasks created locally get a temporary id; changes
//!   made before the store answers are replayed against the durable id
//! - **Range Loading**: month windows are fetched once per session and
//!   seeded from a session-wide preload when one is available
//! - **Side Channels**: a widget payload for today and reminder scheduling
//!   follow every stored change
//!
//! ## Core Modules
//!
//! - [`sync`]: The optimistic cache and its mutation protocol
//! - [`cache`]: Immutable cache state, display order and rollback helpers
//! - [`range`]: Month windows and the fetched-range set
//! - [`preload`]: Session-scoped bulk preload
//! - [`repository`]: The remote store contract and its SQLite implementation
//! - [`widget`]: Today's list for the home-screen widget
//! - [`notify`]: Reminder scheduling
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures and transfer objects
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasksync_core::{
//!     db, models::NewTask, repository::SqliteTaskStore, sync::TaskSync,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("tasks.db").await?;
//!     let sync = TaskSync::new(Arc::new(SqliteTaskStore::new(pool)));
//!
//!     let today = sync.today();
//!     sync.load_month(2025, 5).await?;
//!     let task = sync.create(NewTask::new("Water plants", today)).await?;
//!     println!("Created task: {}", task.title);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod preload;
pub mod range;
pub mod repository;
pub mod sync;
pub mod widget;

pub use sync::TaskSync;
