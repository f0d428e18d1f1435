//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Local};
use cron::Schedule;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::MarathonError;

/// Typed identifier for a bot user (the Telegram user id doubles as the
/// private chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// A daily reminder time of day, 24h local time.
///
/// Always valid by construction: hour in [0, 23], minute in [0, 59].
/// Serialized as `"HH:MM"` both in the store and in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    /// Create a reminder time, validating the range.
    pub fn new(hour: u8, minute: u8) -> Result<Self, MarathonError> {
        if hour > 23 || minute > 59 {
            return Err(MarathonError::InvalidTime(format!("{hour}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Cron expression for "every day at this time" (sec min hour dom month dow).
    pub fn cron_expr(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }

    /// Next wall-clock occurrence in local time.
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        // The expression is generated from validated fields, so parsing
        // cannot fail for a constructed value.
        let schedule = Schedule::from_str(&self.cron_expr()).ok()?;
        schedule.upcoming(Local).next()
    }
}

impl FromStr for ReminderTime {
    type Err = MarathonError;

    /// Parse `"HH:MM"`; a single-digit hour (`"9:00"`) is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MarathonError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if m.len() != 2 || h.is_empty() || h.len() > 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for ReminderTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
