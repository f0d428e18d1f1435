//! SQLite-backed progress store

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use super::{ProgressStore, UserProgress};
use crate::error::StoreError;
use crate::types::{ReminderTime, UserId};

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite progress store. One connection, serialized behind an async mutex.
pub struct SqliteProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProgressStore {
    /// Open (or create) the database at the given path.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Sqlite(rusqlite::Error::InvalidPath(e.to_string().into())))?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, handy for tests and dry runs.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                registered_at TEXT NOT NULL,
                current_marathon TEXT,
                marathon_day INTEGER NOT NULL DEFAULT 1,
                last_task_date TEXT,
                reminder_time TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_users_reminder
                ON users(user_id) WHERE reminder_time IS NOT NULL;
        "#,
        )?;
        Ok(())
    }

    fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProgress> {
        let user_id: i64 = row.get(0)?;
        let username: Option<String> = row.get(1)?;
        let first_name: Option<String> = row.get(2)?;
        let registered_at_raw: String = row.get(3)?;
        let current_marathon: Option<String> = row.get(4)?;
        let day: i64 = row.get(5)?;
        let last_task_raw: Option<String> = row.get(6)?;
        let reminder_raw: Option<String> = row.get(7)?;

        let registered_at = NaiveDate::parse_from_str(&registered_at_raw, DATE_FMT)
            .unwrap_or_else(|_| {
                warn!("user {user_id}: unreadable registration date {registered_at_raw:?}");
                Local::now().date_naive()
            });

        let last_task_date = last_task_raw.as_deref().and_then(|raw| {
            NaiveDate::parse_from_str(raw, DATE_FMT)
                .map_err(|_| warn!("user {user_id}: unreadable last_task_date {raw:?}"))
                .ok()
        });

        // A corrupt reminder must not brick the record; the scheduler deals
        // with raw values separately via scan_reminders().
        let reminder_time = reminder_raw.as_deref().and_then(|raw| {
            raw.parse::<ReminderTime>()
                .map_err(|_| warn!("user {user_id}: unreadable reminder_time {raw:?}"))
                .ok()
        });

        Ok(UserProgress {
            user_id: UserId(user_id),
            username,
            first_name,
            registered_at,
            current_marathon,
            day: day.max(1) as u32,
            last_task_date,
            reminder_time,
        })
    }

    /// Test hook: write an arbitrary reminder string, bypassing validation.
    #[cfg(test)]
    pub(crate) async fn set_reminder_raw(&self, user_id: UserId, raw: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET reminder_time = ?1 WHERE user_id = ?2",
            params![raw, user_id.0],
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn ensure_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let today = Local::now().date_naive().format(DATE_FMT).to_string();
        conn.execute(
            r#"INSERT INTO users (user_id, username, first_name, registered_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(user_id) DO UPDATE SET
                   username = excluded.username,
                   first_name = excluded.first_name"#,
            params![user_id.0, username, first_name, today],
        )?;
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<UserProgress>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, username, first_name, registered_at, current_marathon,
                    marathon_day, last_task_date, reminder_time
             FROM users WHERE user_id = ?1",
        )?;
        let progress = stmt
            .query_row(params![user_id.0], Self::row_to_progress)
            .optional()?;
        Ok(progress)
    }

    async fn set_enrollment(&self, user_id: UserId, marathon: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let today = Local::now().date_naive().format(DATE_FMT).to_string();
        conn.execute(
            r#"INSERT INTO users (user_id, registered_at, current_marathon, marathon_day, last_task_date)
               VALUES (?1, ?2, ?3, 1, NULL)
               ON CONFLICT(user_id) DO UPDATE SET
                   current_marathon = excluded.current_marathon,
                   marathon_day = 1,
                   last_task_date = NULL"#,
            params![user_id.0, today, marathon],
        )?;
        Ok(())
    }

    async fn stamp_issued(&self, user_id: UserId, date: NaiveDate) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET last_task_date = ?1 WHERE user_id = ?2",
            params![date.format(DATE_FMT).to_string(), user_id.0],
        )?;
        Ok(())
    }

    async fn advance_day(&self, user_id: UserId, date: NaiveDate) -> Result<u32, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET marathon_day = marathon_day + 1, last_task_date = ?1
             WHERE user_id = ?2",
            params![date.format(DATE_FMT).to_string(), user_id.0],
        )?;
        let day: i64 = conn.query_row(
            "SELECT marathon_day FROM users WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;
        Ok(day.max(1) as u32)
    }

    async fn set_reminder(
        &self,
        user_id: UserId,
        time: Option<ReminderTime>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let today = Local::now().date_naive().format(DATE_FMT).to_string();
        conn.execute(
            r#"INSERT INTO users (user_id, registered_at, reminder_time)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(user_id) DO UPDATE SET
                   reminder_time = excluded.reminder_time"#,
            params![user_id.0, today, time.map(|t| t.to_string())],
        )?;
        Ok(())
    }

    async fn scan_reminders(&self) -> Result<Vec<(UserId, String)>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, reminder_time FROM users WHERE reminder_time IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok((UserId(id), raw))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn user_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn ensure_user_creates_then_refreshes_profile() {
        let dir = tempdir().unwrap();
        let store = SqliteProgressStore::open(dir.path().join("test.db")).await.unwrap();

        store.ensure_user(UserId(7), Some("ana"), Some("Ana")).await.unwrap();
        store.ensure_user(UserId(7), Some("ana_v2"), Some("Ana")).await.unwrap();

        let p = store.get(UserId(7)).await.unwrap().unwrap();
        assert_eq!(p.username.as_deref(), Some("ana_v2"));
        assert!(!p.is_enrolled());
        assert_eq!(p.day, 1);
    }

    #[tokio::test]
    async fn enrollment_resets_day_and_issuance_stamp() {
        let store = SqliteProgressStore::in_memory().unwrap();
        let user = UserId(1);
        let today = Local::now().date_naive();

        store.set_enrollment(user, "reading").await.unwrap();
        store.stamp_issued(user, today).await.unwrap();
        assert_eq!(store.advance_day(user, today).await.unwrap(), 2);

        store.set_enrollment(user, "fitness").await.unwrap();
        let p = store.get(user).await.unwrap().unwrap();
        assert_eq!(p.current_marathon.as_deref(), Some("fitness"));
        assert_eq!(p.day, 1);
        assert_eq!(p.last_task_date, None);
    }

    #[tokio::test]
    async fn reminder_round_trips_as_padded_text() {
        let store = SqliteProgressStore::in_memory().unwrap();
        let user = UserId(2);
        let time: ReminderTime = "9:05".parse().unwrap();

        store.set_reminder(user, Some(time)).await.unwrap();
        let scans = store.scan_reminders().await.unwrap();
        assert_eq!(scans, vec![(user, "09:05".to_string())]);

        let p = store.get(user).await.unwrap().unwrap();
        assert_eq!(p.reminder_time, Some(time));

        store.set_reminder(user, None).await.unwrap();
        assert!(store.scan_reminders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_reminder_does_not_brick_the_record() {
        let store = SqliteProgressStore::in_memory().unwrap();
        let user = UserId(3);

        store.set_reminder(user, Some("08:00".parse().unwrap())).await.unwrap();
        store.set_reminder_raw(user, "half past nine").await.unwrap();

        let p = store.get(user).await.unwrap().unwrap();
        assert_eq!(p.reminder_time, None);

        // The raw value still shows up in the scan for the scheduler to skip.
        let scans = store.scan_reminders().await.unwrap();
        assert_eq!(scans, vec![(user, "half past nine".to_string())]);
    }

    #[tokio::test]
    async fn user_count_counts_everyone() {
        let store = SqliteProgressStore::in_memory().unwrap();
        store.ensure_user(UserId(1), None, None).await.unwrap();
        store.ensure_user(UserId(2), None, None).await.unwrap();
        store.ensure_user(UserId(2), None, None).await.unwrap();
        assert_eq!(store.user_count().await.unwrap(), 2);
    }
}
