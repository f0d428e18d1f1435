//! Progress engine
//!
//! The per-user state machine: UNENROLLED -> ENROLLED(day 1..30) -> COMPLETED.
//! Enrollment always restarts at day 1, issuance happens at most once per
//! calendar day, completion advances the day counter.
//!
//! Every read-then-write sequence for a user runs under that user's lock, so
//! a reminder firing mid-update observes either the pre- or post-state and
//! never a torn one. Operations for different users run in parallel.

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::catalog::{Catalog, MARATHON_DAYS, PLACEHOLDER_TASK};
use crate::error::MarathonError;
use crate::store::ProgressStore;
use crate::types::UserId;

/// Registry of per-user async locks, shared between the engine and the
/// reminder scheduler. Lock entries are created on demand and kept for the
/// process lifetime (the user population is small and never shrinks).
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<UserId, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one user. Guards for different users are
    /// independent.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        slot.lock_owned().await
    }
}

/// Result of an enrollment attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// Enrolled at day 1.
    Started { key: String, title: String },
    /// Premium program: listed but not yet open for enrollment.
    PremiumLocked { key: String, title: String },
}

/// Result of asking for today's task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskIssue {
    /// All 30 days are done; nothing left to issue for this enrollment.
    MarathonComplete { marathon: String },
    Task {
        marathon: String,
        day: u32,
        text: String,
        /// True when the task had already been issued earlier today.
        already_issued: bool,
    },
}

/// Result of marking today's task done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionResult {
    /// The day counter after advancing.
    pub day: u32,
    /// True when the advance walked past day 30.
    pub completed: bool,
}

/// Snapshot for the "my progress" view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressReport {
    NotEnrolled { registered_at: NaiveDate },
    Active {
        marathon: String,
        title: String,
        day: u32,
        percent: u32,
        completed: bool,
        registered_at: NaiveDate,
    },
}

/// The progress state machine over a [`ProgressStore`].
pub struct ProgressEngine {
    store: Arc<dyn ProgressStore>,
    catalog: Arc<Catalog>,
    locks: UserLocks,
}

impl ProgressEngine {
    pub fn new(store: Arc<dyn ProgressStore>, catalog: Arc<Catalog>, locks: UserLocks) -> Self {
        Self { store, catalog, locks }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Enroll the user, overwriting any previous enrollment and resetting to
    /// day 1. Fails with [`MarathonError::UnknownMarathon`] for keys the
    /// catalog does not know.
    pub async fn enroll(&self, user_id: UserId, key: &str) -> Result<EnrollOutcome, MarathonError> {
        let spec = self
            .catalog
            .get(key)
            .ok_or_else(|| MarathonError::UnknownMarathon(key.to_string()))?;

        if spec.premium {
            debug!("user {user_id}: premium marathon {key} is locked");
            return Ok(EnrollOutcome::PremiumLocked {
                key: spec.key.clone(),
                title: spec.title.clone(),
            });
        }

        let _guard = self.locks.acquire(user_id).await;
        self.store.set_enrollment(user_id, key).await?;
        info!("user {user_id}: enrolled in {key}");

        Ok(EnrollOutcome::Started {
            key: spec.key.clone(),
            title: spec.title.clone(),
        })
    }

    /// Today's task, issuing it if this is the first ask of the day.
    ///
    /// A stale marathon key (enrollment pointing outside the catalog) yields
    /// a placeholder task instead of an error, so the user's flow survives
    /// catalog changes.
    pub async fn today_task(&self, user_id: UserId) -> Result<TaskIssue, MarathonError> {
        let _guard = self.locks.acquire(user_id).await;

        let progress = self.store.get(user_id).await?;
        let Some(progress) = progress else {
            return Err(MarathonError::NotEnrolled);
        };
        let Some(marathon) = progress.current_marathon.clone() else {
            return Err(MarathonError::NotEnrolled);
        };

        if progress.day > MARATHON_DAYS {
            return Ok(TaskIssue::MarathonComplete { marathon });
        }

        let text = self
            .catalog
            .task_at(&marathon, progress.day)
            .unwrap_or(PLACEHOLDER_TASK)
            .to_string();

        let today = today();
        if progress.last_task_date == Some(today) {
            // Already issued today: re-show the same task, keep the stamp.
            return Ok(TaskIssue::Task {
                marathon,
                day: progress.day,
                text,
                already_issued: true,
            });
        }

        self.store.stamp_issued(user_id, today).await?;
        info!("user {user_id}: issued day {} of {marathon}", progress.day);

        Ok(TaskIssue::Task {
            marathon,
            day: progress.day,
            text,
            already_issued: false,
        })
    }

    /// Mark today's task done and advance the day counter.
    ///
    /// Returns `None` when the user is not enrolled (silent no-op). Each call
    /// advances by exactly one day; the UI gates this behind a single button
    /// per issued task.
    pub async fn complete_task(
        &self,
        user_id: UserId,
    ) -> Result<Option<CompletionResult>, MarathonError> {
        let _guard = self.locks.acquire(user_id).await;

        let progress = self.store.get(user_id).await?;
        let enrolled = progress.map(|p| p.is_enrolled()).unwrap_or(false);
        if !enrolled {
            return Ok(None);
        }

        let day = self.store.advance_day(user_id, today()).await?;
        let completed = day > MARATHON_DAYS;
        if completed {
            info!("user {user_id}: marathon completed");
        }

        Ok(Some(CompletionResult { day, completed }))
    }

    /// Progress snapshot for display. Unlike the other operations this one
    /// tolerates unknown users, reporting them as not enrolled.
    pub async fn progress(&self, user_id: UserId) -> Result<ProgressReport, MarathonError> {
        let progress = self.store.get(user_id).await?;
        let Some(progress) = progress else {
            return Ok(ProgressReport::NotEnrolled { registered_at: today() });
        };

        let Some(marathon) = progress.current_marathon.clone() else {
            return Ok(ProgressReport::NotEnrolled {
                registered_at: progress.registered_at,
            });
        };

        let title = self
            .catalog
            .get(&marathon)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| marathon.clone());

        Ok(ProgressReport::Active {
            title,
            day: progress.day,
            percent: (progress.day * 100 / MARATHON_DAYS).min(100),
            completed: progress.day > MARATHON_DAYS,
            registered_at: progress.registered_at,
            marathon,
        })
    }
}

/// Calendar date in process-local time; day granularity, no time zone kept.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
