//! Durable per-user progress records
//!
//! One record per user, created on first contact and never deleted. The
//! engine and scheduler talk to storage through the [`ProgressStore`] trait
//! so tests and alternative backends can swap the SQLite implementation out.

pub mod sqlite;

pub use sqlite::SqliteProgressStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::MARATHON_DAYS;
use crate::error::StoreError;
use crate::types::{ReminderTime, UserId};

/// Durable state for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Date of first contact with the bot.
    pub registered_at: NaiveDate,
    /// `None` means not enrolled.
    pub current_marathon: Option<String>,
    /// Next task index to serve, 1-based. Meaningful only when enrolled.
    pub day: u32,
    /// Date the current day's task was last issued; gates one-issue-per-day.
    pub last_task_date: Option<NaiveDate>,
    /// `None` means reminders disabled.
    pub reminder_time: Option<ReminderTime>,
}

impl UserProgress {
    pub fn is_enrolled(&self) -> bool {
        self.current_marathon.is_some()
    }

    /// The enrollment is finished once `day` walks past the last task.
    pub fn is_completed(&self) -> bool {
        self.is_enrolled() && self.day > MARATHON_DAYS
    }
}

/// Storage seam for per-user progress records.
///
/// Writers are targeted single-field updates rather than whole-record saves,
/// mirroring the read-then-write shape of the engine operations.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Create the record on first contact, or refresh the profile fields on
    /// later contacts. Never touches progress or reminder state.
    async fn ensure_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get(&self, user_id: UserId) -> Result<Option<UserProgress>, StoreError>;

    /// Overwrite-enroll: set the marathon, reset `day` to 1, clear the
    /// issuance stamp. Creates the record if the user is unknown.
    async fn set_enrollment(&self, user_id: UserId, marathon: &str) -> Result<(), StoreError>;

    /// Stamp today's issuance without touching `day`.
    async fn stamp_issued(&self, user_id: UserId, date: NaiveDate) -> Result<(), StoreError>;

    /// Advance `day` by one and stamp the date. Returns the new day.
    async fn advance_day(&self, user_id: UserId, date: NaiveDate) -> Result<u32, StoreError>;

    /// Persist the reminder time (`None` disables). Creates the record if
    /// the user is unknown.
    async fn set_reminder(
        &self,
        user_id: UserId,
        time: Option<ReminderTime>,
    ) -> Result<(), StoreError>;

    /// All users with a non-null reminder, as raw `"HH:MM"` text so that
    /// rehydration can skip individually malformed rows.
    async fn scan_reminders(&self) -> Result<Vec<(UserId, String)>, StoreError>;

    /// Total number of known users.
    async fn user_count(&self) -> Result<usize, StoreError>;
}
