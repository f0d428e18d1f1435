//! Action dispatch
//!
//! The closed set of inbound user actions and the typed outcomes each one
//! produces. The front end parses whatever transport-level identifiers it
//! uses into [`Action`] values; from here on everything is exhaustively
//! matched, with no stringly-typed routing.

use std::sync::Arc;

use crate::engine::{CompletionResult, EnrollOutcome, ProgressEngine, ProgressReport, TaskIssue};
use crate::error::MarathonError;
use crate::scheduler::ReminderScheduler;
use crate::types::{ReminderTime, UserId};

/// Everything a user can ask the system to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Enroll { marathon: String },
    GetTask,
    CompleteTask,
    SetReminder { time: ReminderTime },
    CancelReminder,
    GetProgress,
}

/// The result object for each action kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReply {
    Enrolled(EnrollOutcome),
    Task(TaskIssue),
    /// `None` when completion was requested without an enrollment.
    Completion(Option<CompletionResult>),
    ReminderSet { time: ReminderTime },
    ReminderCleared,
    Progress(ProgressReport),
}

/// Routes actions to the progress engine and reminder scheduler.
pub struct Dispatcher {
    engine: Arc<ProgressEngine>,
    scheduler: Arc<ReminderScheduler>,
}

impl Dispatcher {
    pub fn new(engine: Arc<ProgressEngine>, scheduler: Arc<ReminderScheduler>) -> Self {
        Self { engine, scheduler }
    }

    pub fn engine(&self) -> &ProgressEngine {
        &self.engine
    }

    pub async fn dispatch(&self, user_id: UserId, action: Action) -> Result<ActionReply, MarathonError> {
        match action {
            Action::Enroll { marathon } => {
                let outcome = self.engine.enroll(user_id, &marathon).await?;
                Ok(ActionReply::Enrolled(outcome))
            }
            Action::GetTask => {
                let issue = self.engine.today_task(user_id).await?;
                Ok(ActionReply::Task(issue))
            }
            Action::CompleteTask => {
                let result = self.engine.complete_task(user_id).await?;
                Ok(ActionReply::Completion(result))
            }
            Action::SetReminder { time } => {
                self.scheduler.set_reminder(user_id, time).await?;
                Ok(ActionReply::ReminderSet { time })
            }
            Action::CancelReminder => {
                self.scheduler.cancel_reminder(user_id).await?;
                Ok(ActionReply::ReminderCleared)
            }
            Action::GetProgress => {
                let report = self.engine.progress(user_id).await?;
                Ok(ActionReply::Progress(report))
            }
        }
    }
}
