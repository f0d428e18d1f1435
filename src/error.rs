//! Error taxonomy for marathon operations
//!
//! Every variant here is recoverable: a single-user failure must never take
//! down the bot or the reminder scheduler.

use thiserror::Error;

/// Errors surfaced by the progress engine and reminder scheduler.
#[derive(Debug, Error)]
pub enum MarathonError {
    /// Enrollment requested for a marathon key the catalog does not know.
    #[error("unknown marathon: {0}")]
    UnknownMarathon(String),

    /// A task or progress report was requested with no active enrollment.
    #[error("not enrolled in any marathon")]
    NotEnrolled,

    /// A reminder time that is malformed or out of range (hour 0-23, minute 0-59).
    #[error("invalid reminder time: {0:?}")]
    InvalidTime(String),

    /// Transient storage failure; the caller should retry later.
    #[error("storage unavailable")]
    StoreUnavailable(#[from] StoreError),

    /// A corrupt `reminder_time` value found during rehydration. The affected
    /// user is skipped; rehydration continues for everyone else.
    #[error("malformed persisted reminder for user {user_id}: {raw:?}")]
    MalformedPersistedReminder { user_id: i64, raw: String },
}

impl MarathonError {
    /// Short message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            MarathonError::UnknownMarathon(key) => {
                format!("There is no marathon called \"{key}\". Pick one from the list.")
            }
            MarathonError::NotEnrolled => {
                "You are not enrolled in a marathon yet. Pick one to get started!".to_string()
            }
            MarathonError::InvalidTime(raw) => {
                format!("\"{raw}\" is not a valid time. Use HH:MM, for example 09:00.")
            }
            MarathonError::StoreUnavailable(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
            MarathonError::MalformedPersistedReminder { .. } => {
                "Your saved reminder looks broken. Please set it again.".to_string()
            }
        }
    }
}

/// Failures talking to the progress store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_actionable() {
        let err = MarathonError::UnknownMarathon("Origami".to_string());
        assert!(err.user_message().contains("Origami"));

        let err = MarathonError::InvalidTime("25:00".to_string());
        assert!(err.user_message().contains("25:00"));
        assert!(err.user_message().contains("HH:MM"));
    }
}
