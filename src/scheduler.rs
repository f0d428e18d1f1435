//! Reminder scheduler
//!
//! Maintains at most one recurring daily timer per user, keyed by [`UserId`]
//! in an explicit registry, and keeps the registry consistent with the
//! `reminder_time` column in the progress store: every mutation reconciles
//! both, and rehydration rebuilds the registry from storage after a restart.
//!
//! Timers are plain tokio tasks that sleep until the next local-time
//! occurrence and fire. Aborting the task is what guarantees that no new
//! fire can happen after a cancellation returns.

use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::engine::{today, UserLocks};
use crate::error::MarathonError;
use crate::notify::Notifier;
use crate::store::ProgressStore;
use crate::types::{ReminderTime, UserId};

/// Per-user recurring reminder timers over a [`ProgressStore`].
pub struct ReminderScheduler {
    store: Arc<dyn ProgressStore>,
    notifier: Arc<dyn Notifier>,
    /// Timer registry. Held across every create/cancel/rehydrate so there
    /// can never be two live timers for one user.
    timers: Arc<Mutex<HashMap<UserId, JoinHandle<()>>>>,
    locks: UserLocks,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn ProgressStore>, notifier: Arc<dyn Notifier>, locks: UserLocks) -> Self {
        Self {
            store,
            notifier,
            timers: Arc::new(Mutex::new(HashMap::new())),
            locks,
        }
    }

    /// Set (or replace) the user's daily reminder. Persists first, then
    /// swaps the timer, so a storage failure leaves no stray timer behind.
    pub async fn set_reminder(&self, user_id: UserId, time: ReminderTime) -> Result<(), MarathonError> {
        let mut timers = self.timers.lock().await;

        self.store.set_reminder(user_id, Some(time)).await?;

        if let Some(old) = timers.remove(&user_id) {
            old.abort();
        }
        timers.insert(user_id, self.spawn_timer(user_id, time));
        info!("user {user_id}: reminder set to {time}");
        Ok(())
    }

    /// Disable the user's reminder. No-op if already disabled. After this
    /// returns, no new fire will be scheduled for the user (an already
    /// in-flight fire may still finish).
    pub async fn cancel_reminder(&self, user_id: UserId) -> Result<(), MarathonError> {
        let mut timers = self.timers.lock().await;

        self.store.set_reminder(user_id, None).await?;

        if let Some(handle) = timers.remove(&user_id) {
            handle.abort();
            info!("user {user_id}: reminder cancelled");
        }
        Ok(())
    }

    /// Rebuild the timer registry from storage; called once at process
    /// start. Stored values are not rewritten. A malformed row is logged and
    /// skipped so one bad record cannot block everyone else's reminders.
    pub async fn rehydrate(&self) -> Result<usize, MarathonError> {
        let rows = self.store.scan_reminders().await?;
        let mut timers = self.timers.lock().await;
        let mut restored = 0;

        for (user_id, raw) in rows {
            let time: ReminderTime = match raw.parse() {
                Ok(time) => time,
                Err(_) => {
                    let err = MarathonError::MalformedPersistedReminder { user_id: user_id.0, raw };
                    warn!("skipping reminder during rehydration: {err}");
                    continue;
                }
            };

            if let Some(old) = timers.remove(&user_id) {
                old.abort();
            }
            timers.insert(user_id, self.spawn_timer(user_id, time));
            restored += 1;
        }

        info!("rehydrated {restored} reminder timer(s)");
        Ok(restored)
    }

    /// Number of live timers; the store and this count must agree.
    pub async fn timer_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every timer. Used on shutdown.
    pub async fn stop(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// What a timer does when its moment arrives. Public so tests and ops
    /// tooling can trigger a fire directly.
    pub async fn on_fire(&self, user_id: UserId) {
        Self::fire(&*self.store, &*self.notifier, &self.locks, user_id).await;
    }

    async fn fire(
        store: &dyn ProgressStore,
        notifier: &dyn Notifier,
        locks: &UserLocks,
        user_id: UserId,
    ) {
        // Take the user lock so the read cannot interleave with a
        // mid-flight engine update for the same user.
        let _guard = locks.acquire(user_id).await;

        let progress = match store.get(user_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!("reminder for user {user_id}: store read failed: {e}");
                return;
            }
        };

        let Some(progress) = progress else { return };
        let Some(marathon) = progress.current_marathon.as_deref() else {
            debug!("reminder for user {user_id}: not enrolled, skipping");
            return;
        };

        // Today's task already issued or completed: no duplicate nudge.
        if progress.last_task_date == Some(today()) {
            debug!("reminder for user {user_id}: already active today, suppressed");
            return;
        }

        let text = format!(
            "Reminder! Today's task is waiting for you.\n{} — day {}/30. Go get it!",
            marathon, progress.day
        );
        if let Err(e) = notifier.notify(user_id, &text).await {
            warn!("reminder for user {user_id}: delivery failed: {e}");
        }
    }

    fn spawn_timer(&self, user_id: UserId, time: ReminderTime) -> JoinHandle<()> {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let locks = self.locks.clone();

        tokio::spawn(async move {
            loop {
                let Some(next) = time.next_fire() else {
                    warn!("user {user_id}: no upcoming occurrence for {time}, timer stopping");
                    break;
                };
                let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
                debug!("user {user_id}: next reminder at {next}");
                sleep(wait).await;

                Self::fire(&*store, &*notifier, &locks, user_id).await;

                // Step past the trigger second before recomputing, so the
                // same occurrence is never picked up twice.
                sleep(Duration::from_secs(1)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteProgressStore;
    use anyhow::Result;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(UserId, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, user_id: UserId, text: &str) -> Result<()> {
            self.sent.lock().await.push((user_id, text.to_string()));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: UserId, _: &str) -> Result<()> {
            anyhow::bail!("user unreachable")
        }
    }

    fn fixture() -> (Arc<SqliteProgressStore>, Arc<RecordingNotifier>, ReminderScheduler) {
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler =
            ReminderScheduler::new(store.clone(), notifier.clone(), UserLocks::new());
        (store, notifier, scheduler)
    }

    #[tokio::test]
    async fn set_then_rehydrate_keeps_exactly_one_timer() {
        let (store, _, scheduler) = fixture();
        let user = UserId(1);

        scheduler.set_reminder(user, "09:00".parse().unwrap()).await.unwrap();
        assert_eq!(scheduler.timer_count().await, 1);

        // Simulated restart: rehydration must replace, not duplicate.
        let restored = scheduler.rehydrate().await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(scheduler.timer_count().await, 1);

        let p = store.get(user).await.unwrap().unwrap();
        assert_eq!(p.reminder_time, Some("09:00".parse().unwrap()));
    }

    #[tokio::test]
    async fn cancel_clears_store_and_timer() {
        let (store, _, scheduler) = fixture();
        let user = UserId(2);

        scheduler.set_reminder(user, "21:30".parse().unwrap()).await.unwrap();
        scheduler.cancel_reminder(user).await.unwrap();

        assert_eq!(scheduler.timer_count().await, 0);
        assert_eq!(store.get(user).await.unwrap().unwrap().reminder_time, None);

        // A later restart creates nothing for this user.
        assert_eq!(scheduler.rehydrate().await.unwrap(), 0);
        assert_eq!(scheduler.timer_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_when_disabled_is_a_noop() {
        let (_, _, scheduler) = fixture();
        scheduler.cancel_reminder(UserId(3)).await.unwrap();
        assert_eq!(scheduler.timer_count().await, 0);
    }

    #[tokio::test]
    async fn replacing_a_reminder_keeps_one_timer() {
        let (store, _, scheduler) = fixture();
        let user = UserId(4);

        scheduler.set_reminder(user, "08:00".parse().unwrap()).await.unwrap();
        scheduler.set_reminder(user, "20:00".parse().unwrap()).await.unwrap();

        assert_eq!(scheduler.timer_count().await, 1);
        let p = store.get(user).await.unwrap().unwrap();
        assert_eq!(p.reminder_time, Some("20:00".parse().unwrap()));
    }

    #[tokio::test]
    async fn fire_notifies_enrolled_user_with_marathon_and_day() {
        let (store, notifier, scheduler) = fixture();
        let user = UserId(5);
        store.set_enrollment(user, "reading").await.unwrap();

        scheduler.on_fire(user).await;

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, user);
        assert!(sent[0].1.contains("reading"));
        assert!(sent[0].1.contains("day 1/30"));
    }

    #[tokio::test]
    async fn fire_is_suppressed_after_todays_issuance() {
        let (store, notifier, scheduler) = fixture();
        let user = UserId(6);
        store.set_enrollment(user, "reading").await.unwrap();
        store.stamp_issued(user, today()).await.unwrap();

        scheduler.on_fire(user).await;
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fire_skips_unenrolled_users() {
        let (store, notifier, scheduler) = fixture();
        store.ensure_user(UserId(7), None, None).await.unwrap();

        scheduler.on_fire(UserId(7)).await;
        scheduler.on_fire(UserId(8)).await; // unknown user
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        store.set_enrollment(UserId(9), "fitness").await.unwrap();
        let scheduler =
            ReminderScheduler::new(store, Arc::new(FailingNotifier), UserLocks::new());

        // Must not panic or propagate.
        scheduler.on_fire(UserId(9)).await;
    }

    #[tokio::test]
    async fn rehydration_skips_malformed_rows_and_continues() {
        let (store, _, scheduler) = fixture();

        store.set_reminder(UserId(10), Some("08:00".parse().unwrap())).await.unwrap();
        store.set_reminder(UserId(11), Some("09:00".parse().unwrap())).await.unwrap();
        store.set_reminder_raw(UserId(10), "noonish").await.unwrap();

        let restored = scheduler.rehydrate().await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(scheduler.timer_count().await, 1);
    }
}
