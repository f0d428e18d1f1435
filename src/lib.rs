//! Marathon Bot - 30-day habit marathon companion
//!
//! A Telegram bot that walks users through 30-day habit programs:
//! - One task per day, issued at most once per calendar day
//! - Idempotent completion tracking with a simple state machine
//! - Daily reminders at a user-chosen time, rebuilt from storage on restart
//! - SQLite-backed per-user progress records
//!
//! # Example
//!
//! ```ignore
//! use marathon_bot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     marathon_bot::bot::run(&config).await
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod types;
pub mod catalog;
pub mod store;
pub mod engine;
pub mod notify;
pub mod scheduler;
pub mod dispatch;

// Front end and wiring
pub mod telegram;
pub mod bot;
pub mod config;
pub mod cli;

// Re-export commonly used types for convenience
pub use catalog::{Catalog, MarathonSpec, MARATHON_DAYS};
pub use config::Config;
pub use dispatch::{Action, ActionReply, Dispatcher};
pub use engine::{ProgressEngine, UserLocks};
pub use error::{MarathonError, StoreError};
pub use notify::Notifier;
pub use scheduler::ReminderScheduler;
pub use store::{ProgressStore, SqliteProgressStore, UserProgress};
pub use types::{ReminderTime, UserId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
