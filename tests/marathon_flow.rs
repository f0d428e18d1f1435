//! End-to-end flows: 30-day marathon run and the reminder lifecycle across
//! a simulated restart.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::Mutex;

use marathon_bot::catalog::Catalog;
use marathon_bot::dispatch::{Action, ActionReply, Dispatcher};
use marathon_bot::engine::{CompletionResult, ProgressEngine, TaskIssue, UserLocks};
use marathon_bot::error::MarathonError;
use marathon_bot::notify::Notifier;
use marathon_bot::scheduler::ReminderScheduler;
use marathon_bot::store::{ProgressStore, SqliteProgressStore};
use marathon_bot::types::{ReminderTime, UserId};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        self.sent.lock().await.push((user_id, text.to_string()));
        Ok(())
    }
}

struct Harness {
    store: Arc<SqliteProgressStore>,
    notifier: Arc<RecordingNotifier>,
    dispatcher: Dispatcher,
    scheduler: Arc<ReminderScheduler>,
}

async fn harness(db_path: &std::path::Path) -> Harness {
    let store = Arc::new(SqliteProgressStore::open(db_path).await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let locks = UserLocks::new();
    let engine = Arc::new(ProgressEngine::new(
        store.clone(),
        Catalog::builtin_shared(),
        locks.clone(),
    ));
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        notifier.clone(),
        locks,
    ));
    Harness {
        store,
        notifier,
        dispatcher: Dispatcher::new(engine, scheduler.clone()),
        scheduler,
    }
}

#[tokio::test]
async fn thirty_day_reading_marathon_start_to_finish() {
    let dir = tempdir().unwrap();
    let h = harness(&dir.path().join("flow.db")).await;
    let user = UserId(1001);

    let reply = h
        .dispatcher
        .dispatch(user, Action::Enroll { marathon: "reading".to_string() })
        .await
        .unwrap();
    assert!(matches!(reply, ActionReply::Enrolled(_)));

    // Day 1: first ask is fresh and serves task #1.
    match h.dispatcher.dispatch(user, Action::GetTask).await.unwrap() {
        ActionReply::Task(TaskIssue::Task { day, text, already_issued, .. }) => {
            assert_eq!(day, 1);
            assert_eq!(text, "Read 5 pages of any book");
            assert!(!already_issued);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    // First completion lands on day 2.
    match h.dispatcher.dispatch(user, Action::CompleteTask).await.unwrap() {
        ActionReply::Completion(Some(CompletionResult { day, completed })) => {
            assert_eq!(day, 2);
            assert!(!completed);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    // 29 more rounds of ask-then-complete.
    let mut last = CompletionResult { day: 2, completed: false };
    for _ in 0..29 {
        let reply = h.dispatcher.dispatch(user, Action::GetTask).await.unwrap();
        assert!(matches!(reply, ActionReply::Task(_)));
        match h.dispatcher.dispatch(user, Action::CompleteTask).await.unwrap() {
            ActionReply::Completion(Some(result)) => last = result,
            other => panic!("unexpected reply: {other:?}"),
        }
    }
    assert_eq!(last.day, 31);
    assert!(last.completed);

    // Nothing left to issue after the finish line.
    match h.dispatcher.dispatch(user, Action::GetTask).await.unwrap() {
        ActionReply::Task(TaskIssue::MarathonComplete { .. }) => {}
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn reminder_survives_restart_with_exactly_one_timer() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("reminders.db");
    let user = UserId(2002);

    {
        let h = harness(&db).await;
        let time: ReminderTime = "09:00".parse().unwrap();
        h.dispatcher
            .dispatch(user, Action::SetReminder { time })
            .await
            .unwrap();
        assert_eq!(h.scheduler.timer_count().await, 1);
        h.scheduler.stop().await;
    }

    // Fresh process: same database, empty timer registry.
    let h = harness(&db).await;
    assert_eq!(h.scheduler.timer_count().await, 0);

    let restored = h.scheduler.rehydrate().await.unwrap();
    assert_eq!(restored, 1);
    assert_eq!(h.scheduler.timer_count().await, 1);

    let p = h.store.get(user).await.unwrap().unwrap();
    assert_eq!(p.reminder_time, Some("09:00".parse().unwrap()));
}

#[tokio::test]
async fn cancelled_reminder_stays_gone_after_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cancel.db");
    let user = UserId(3003);

    let h = harness(&db).await;
    let time: ReminderTime = "18:00".parse().unwrap();
    h.dispatcher.dispatch(user, Action::SetReminder { time }).await.unwrap();
    h.dispatcher.dispatch(user, Action::CancelReminder).await.unwrap();

    assert_eq!(h.scheduler.timer_count().await, 0);
    assert_eq!(h.store.get(user).await.unwrap().unwrap().reminder_time, None);

    let h2 = harness(&db).await;
    assert_eq!(h2.scheduler.rehydrate().await.unwrap(), 0);
    assert_eq!(h2.scheduler.timer_count().await, 0);
}

#[tokio::test]
async fn invalid_time_leaves_store_and_scheduler_untouched() {
    let dir = tempdir().unwrap();
    let h = harness(&dir.path().join("invalid.db")).await;
    let user = UserId(4004);

    // "25:00" never becomes an Action: it fails at the parse boundary.
    let err = "25:00".parse::<ReminderTime>().unwrap_err();
    assert!(matches!(err, MarathonError::InvalidTime(raw) if raw == "25:00"));

    assert_eq!(h.scheduler.timer_count().await, 0);
    assert!(h.store.get(user).await.unwrap().is_none());
}

#[tokio::test]
async fn fire_after_issuance_is_suppressed_but_fresh_day_notifies() {
    let dir = tempdir().unwrap();
    let h = harness(&dir.path().join("fire.db")).await;
    let user = UserId(5005);

    h.dispatcher
        .dispatch(user, Action::Enroll { marathon: "fitness".to_string() })
        .await
        .unwrap();

    // Not issued today yet: the reminder goes out with marathon and day.
    h.scheduler.on_fire(user).await;
    {
        let sent = h.notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("fitness"));
        assert!(sent[0].1.contains("day 1/30"));
    }

    // After the task is issued the same-day reminder is suppressed.
    h.dispatcher.dispatch(user, Action::GetTask).await.unwrap();
    h.scheduler.on_fire(user).await;
    assert_eq!(h.notifier.sent.lock().await.len(), 1);
}
