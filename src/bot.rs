//! Telegram front end
//!
//! Long-polls the Bot API, parses commands and button presses into the
//! closed [`CallbackAction`] set, dispatches them, and renders the typed
//! replies back as messages with inline keyboards.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::dispatch::{Action, ActionReply, Dispatcher};
use crate::engine::{
    CompletionResult, EnrollOutcome, ProgressEngine, ProgressReport, TaskIssue, UserLocks,
};
use crate::error::MarathonError;
use crate::notify::TelegramNotifier;
use crate::scheduler::ReminderScheduler;
use crate::store::{ProgressStore, SqliteProgressStore};
use crate::telegram::{inline_keyboard, CallbackQuery, IncomingMessage, TelegramClient, Update};
use crate::types::{ReminderTime, UserId};

/// Preset reminder times offered in the chooser.
const REMINDER_PRESETS: [&str; 6] = ["08:00", "09:00", "12:00", "18:00", "20:00", "21:00"];

/// Every inline button the bot ever renders. Callback data is the encoded
/// form of one of these; anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    MainMenu,
    ChooseMarathon,
    Enroll(String),
    GetTask,
    TaskDone,
    MyProgress,
    Help,
    ReminderMenu,
    RemindAt(ReminderTime),
    RemindCustom,
    RemindOff,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::MainMenu => "menu".to_string(),
            CallbackAction::ChooseMarathon => "choose".to_string(),
            CallbackAction::Enroll(key) => format!("enroll:{key}"),
            CallbackAction::GetTask => "task".to_string(),
            CallbackAction::TaskDone => "done".to_string(),
            CallbackAction::MyProgress => "progress".to_string(),
            CallbackAction::Help => "help".to_string(),
            CallbackAction::ReminderMenu => "remind".to_string(),
            CallbackAction::RemindAt(time) => format!("remind_at:{time}"),
            CallbackAction::RemindCustom => "remind_custom".to_string(),
            CallbackAction::RemindOff => "remind_off".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        if let Some(key) = data.strip_prefix("enroll:") {
            return Some(CallbackAction::Enroll(key.to_string()));
        }
        if let Some(raw) = data.strip_prefix("remind_at:") {
            return raw.parse().ok().map(CallbackAction::RemindAt);
        }
        match data {
            "menu" => Some(CallbackAction::MainMenu),
            "choose" => Some(CallbackAction::ChooseMarathon),
            "task" => Some(CallbackAction::GetTask),
            "done" => Some(CallbackAction::TaskDone),
            "progress" => Some(CallbackAction::MyProgress),
            "help" => Some(CallbackAction::Help),
            "remind" => Some(CallbackAction::ReminderMenu),
            "remind_custom" => Some(CallbackAction::RemindCustom),
            "remind_off" => Some(CallbackAction::RemindOff),
            _ => None,
        }
    }
}

/// The running bot: transport client plus the dispatch pipeline.
pub struct Bot {
    client: TelegramClient,
    dispatcher: Dispatcher,
    store: Arc<dyn ProgressStore>,
    catalog: Arc<Catalog>,
    /// Users who pressed "custom time" and whose next message is a HH:MM.
    awaiting_time: Mutex<HashSet<UserId>>,
}

/// Wire everything up and poll until the process is stopped.
pub async fn run(config: &Config) -> Result<()> {
    let client = TelegramClient::new(&config.telegram)?;
    let me = client.get_me().await?;
    info!(
        "connected as @{}",
        me.username.as_deref().unwrap_or("<unnamed bot>")
    );

    let store: Arc<SqliteProgressStore> =
        Arc::new(SqliteProgressStore::open(config.storage.db_path()).await?);
    let catalog = Catalog::builtin_shared();
    let locks = UserLocks::new();

    let engine = Arc::new(ProgressEngine::new(store.clone(), catalog.clone(), locks.clone()));
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        Arc::new(TelegramNotifier::new(client.clone())),
        locks,
    ));

    // Restart safety: rebuild every persisted reminder timer before serving.
    scheduler.rehydrate().await?;

    let bot = Bot {
        client,
        dispatcher: Dispatcher::new(engine, scheduler),
        store,
        catalog,
        awaiting_time: Mutex::new(HashSet::new()),
    };
    bot.poll().await
}

impl Bot {
    async fn poll(&self) -> Result<()> {
        info!("polling for updates");
        let mut offset: Option<i64> = None;

        loop {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("getUpdates failed: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                if let Err(e) = self.handle_update(update).await {
                    warn!("update handling failed: {e}");
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        Ok(())
    }

    async fn handle_message(&self, message: IncomingMessage) -> Result<()> {
        let chat_id = message.chat.id;
        let user = UserId(message.from.as_ref().map(|u| u.id).unwrap_or(chat_id));
        let text = message.text.as_deref().unwrap_or("").trim().to_string();

        let (username, first_name) = message
            .from
            .as_ref()
            .map(|u| (u.username.clone(), u.first_name.clone()))
            .unwrap_or_default();
        self.store
            .ensure_user(user, username.as_deref(), first_name.as_deref())
            .await?;

        // Commands arrive as "/start" or "/start@botname" in groups.
        if text == "/start" || text.starts_with("/start@") {
            let name = first_name.unwrap_or_else(|| "there".to_string());
            let greeting = format!(
                "Hi {name}!\nWelcome to the Habit Marathon. Pick a 30-day program, \
                 get one small task every day, and build a habit that sticks.\n\nWhat would you like to do?"
            );
            self.client
                .send_message(chat_id, &greeting, Some(main_menu_keyboard()))
                .await?;
            return Ok(());
        }

        // A user who pressed "custom time" types HH:MM next.
        if self.awaiting_time.lock().await.remove(&user) {
            match text.parse::<ReminderTime>() {
                Ok(time) => {
                    let reply = self.dispatcher.dispatch(user, Action::SetReminder { time }).await;
                    let rendered = self.render(user, reply).await;
                    self.client
                        .send_message(chat_id, &rendered.text, rendered.keyboard)
                        .await?;
                }
                Err(e) => {
                    // Re-prompt; the user stays in custom-time mode.
                    self.awaiting_time.lock().await.insert(user);
                    self.client
                        .send_message(chat_id, &e.user_message(), None)
                        .await?;
                }
            }
            return Ok(());
        }

        self.client
            .send_message(chat_id, "Use /start to open the menu.", None)
            .await?;
        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        let user = UserId(query.from.id);
        let chat_id = query.message.as_ref().map(|m| m.chat.id).unwrap_or(user.0);
        let message_id = query.message.as_ref().map(|m| m.message_id);

        self.client.answer_callback_query(&query.id, None).await.ok();

        let action = query.data.as_deref().and_then(CallbackAction::parse);
        let Some(action) = action else {
            warn!("user {user}: unrecognized callback data {:?}", query.data);
            return Ok(());
        };

        self.store
            .ensure_user(
                user,
                query.from.username.as_deref(),
                query.from.first_name.as_deref(),
            )
            .await?;

        let rendered = match action {
            CallbackAction::MainMenu => Rendered {
                text: "Main menu".to_string(),
                keyboard: Some(main_menu_keyboard()),
            },
            CallbackAction::ChooseMarathon => self.render_marathon_chooser(),
            CallbackAction::Help => help_screen(),
            CallbackAction::ReminderMenu => reminder_menu(),
            CallbackAction::RemindCustom => {
                self.awaiting_time.lock().await.insert(user);
                Rendered {
                    text: "Type a time as HH:MM, for example 09:00 or 21:45.\n\
                           I will remind you every day at that time."
                        .to_string(),
                    keyboard: None,
                }
            }
            CallbackAction::Enroll(key) => {
                let reply = self.dispatcher.dispatch(user, Action::Enroll { marathon: key }).await;
                self.render(user, reply).await
            }
            CallbackAction::GetTask => {
                let reply = self.dispatcher.dispatch(user, Action::GetTask).await;
                self.render(user, reply).await
            }
            CallbackAction::TaskDone => {
                let reply = self.dispatcher.dispatch(user, Action::CompleteTask).await;
                self.render(user, reply).await
            }
            CallbackAction::MyProgress => {
                let reply = self.dispatcher.dispatch(user, Action::GetProgress).await;
                self.render(user, reply).await
            }
            CallbackAction::RemindAt(time) => {
                let reply = self.dispatcher.dispatch(user, Action::SetReminder { time }).await;
                self.render(user, reply).await
            }
            CallbackAction::RemindOff => {
                let reply = self.dispatcher.dispatch(user, Action::CancelReminder).await;
                self.render(user, reply).await
            }
        };

        match message_id {
            Some(message_id) => {
                self.client
                    .edit_message_text(chat_id, message_id, &rendered.text, rendered.keyboard)
                    .await?
            }
            None => {
                self.client
                    .send_message(chat_id, &rendered.text, rendered.keyboard)
                    .await?
            }
        }
        Ok(())
    }

    fn render_marathon_chooser(&self) -> Rendered {
        let mut text = String::from("Pick a marathon:\n\n");
        let mut rows = Vec::new();
        for program in self.catalog.list() {
            let tag = if program.premium { "PREMIUM" } else { "FREE" };
            text.push_str(&format!("{} — {} ({tag})\n", program.title, program.description));
            let label = if program.premium {
                format!("{} (premium)", program.title)
            } else {
                program.title.clone()
            };
            rows.push(vec![(
                label,
                CallbackAction::Enroll(program.key.clone()).encode(),
            )]);
        }
        rows.push(vec![("Back".to_string(), CallbackAction::MainMenu.encode())]);

        let rows: Vec<Vec<(&str, String)>> = rows
            .iter()
            .map(|row| row.iter().map(|(l, d)| (l.as_str(), d.clone())).collect())
            .collect();
        Rendered {
            text,
            keyboard: Some(inline_keyboard(&rows)),
        }
    }

    /// Turn a dispatch result into user-facing text plus keyboard.
    async fn render(&self, user: UserId, reply: Result<ActionReply, MarathonError>) -> Rendered {
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                if !matches!(e, MarathonError::NotEnrolled) {
                    warn!("user {user}: action failed: {e}");
                }
                let keyboard = match e {
                    MarathonError::NotEnrolled | MarathonError::UnknownMarathon(_) => {
                        Some(inline_keyboard(&[vec![(
                            "Pick a marathon",
                            CallbackAction::ChooseMarathon.encode(),
                        )]]))
                    }
                    _ => Some(back_keyboard()),
                };
                return Rendered { text: e.user_message(), keyboard };
            }
        };

        match reply {
            ActionReply::Enrolled(EnrollOutcome::Started { title, .. }) => Rendered {
                text: format!(
                    "You're in! {title} starts right now.\nReady for the first task?"
                ),
                keyboard: Some(inline_keyboard(&[
                    vec![("Start the marathon", CallbackAction::GetTask.encode())],
                    vec![("My progress", CallbackAction::MyProgress.encode())],
                ])),
            },
            ActionReply::Enrolled(EnrollOutcome::PremiumLocked { title, .. }) => Rendered {
                text: format!("{title} is a premium marathon. It opens soon — stay tuned!"),
                keyboard: Some(inline_keyboard(&[vec![(
                    "Back to the list",
                    CallbackAction::ChooseMarathon.encode(),
                )]])),
            },
            ActionReply::Task(TaskIssue::MarathonComplete { .. }) => Rendered {
                text: "Congratulations — you finished the marathon! Pick a new one to keep going."
                    .to_string(),
                keyboard: Some(inline_keyboard(&[vec![(
                    "New marathon",
                    CallbackAction::ChooseMarathon.encode(),
                )]])),
            },
            ActionReply::Task(TaskIssue::Task { day, text, already_issued, .. }) => {
                let heading = if already_issued {
                    format!("Today's task (day {day}) — already on your plate:")
                } else {
                    format!("Task for day {day}:")
                };
                Rendered {
                    text: format!("{heading}\n\n{text}\n\nDo it and check it off!"),
                    keyboard: Some(inline_keyboard(&[
                        vec![("Task done", CallbackAction::TaskDone.encode())],
                        vec![("My progress", CallbackAction::MyProgress.encode())],
                    ])),
                }
            }
            ActionReply::Completion(None) => Rendered {
                text: "You are not enrolled in a marathon yet. Pick one to get started!"
                    .to_string(),
                keyboard: Some(inline_keyboard(&[vec![(
                    "Pick a marathon",
                    CallbackAction::ChooseMarathon.encode(),
                )]])),
            },
            ActionReply::Completion(Some(CompletionResult { day, completed })) => {
                if completed {
                    Rendered {
                        text: "THAT'S A WRAP — 30 DAYS DONE!\nYou built yourself a brand-new habit. Amazing work!"
                            .to_string(),
                        keyboard: Some(inline_keyboard(&[vec![(
                            "New marathon",
                            CallbackAction::ChooseMarathon.encode(),
                        )]])),
                    }
                } else {
                    Rendered {
                        text: format!(
                            "Day {} done — {}/30 in the bag. See you tomorrow!",
                            day - 1,
                            day - 1
                        ),
                        keyboard: Some(inline_keyboard(&[vec![(
                            "My progress",
                            CallbackAction::MyProgress.encode(),
                        )]])),
                    }
                }
            }
            ActionReply::ReminderSet { time } => Rendered {
                text: format!("Done — I'll remind you every day at {time}."),
                keyboard: Some(back_keyboard()),
            },
            ActionReply::ReminderCleared => Rendered {
                text: "Reminders are off.".to_string(),
                keyboard: Some(back_keyboard()),
            },
            ActionReply::Progress(ProgressReport::NotEnrolled { registered_at }) => Rendered {
                text: format!(
                    "Your stats:\nRegistered: {registered_at}\nActive marathons: 0"
                ),
                keyboard: Some(inline_keyboard(&[vec![(
                    "Pick a marathon",
                    CallbackAction::ChooseMarathon.encode(),
                )]])),
            },
            ActionReply::Progress(ProgressReport::Active {
                title,
                day,
                percent,
                completed,
                registered_at,
                ..
            }) => {
                let mut text = format!(
                    "Your stats:\n{title}\nDay: {day}/30\nProgress: {percent}%\n[{}]\nRegistered: {registered_at}",
                    progress_bar(percent)
                );
                let keyboard = if completed {
                    text.push_str("\nMarathon complete!");
                    inline_keyboard(&[vec![("New marathon", CallbackAction::ChooseMarathon.encode())]])
                } else {
                    inline_keyboard(&[
                        vec![("Get today's task", CallbackAction::GetTask.encode())],
                        vec![("Main menu", CallbackAction::MainMenu.encode())],
                    ])
                };
                Rendered { text, keyboard: Some(keyboard) }
            }
        }
    }
}

struct Rendered {
    text: String,
    keyboard: Option<Value>,
}

fn main_menu_keyboard() -> Value {
    inline_keyboard(&[
        vec![("Pick a marathon", CallbackAction::ChooseMarathon.encode())],
        vec![("My progress", CallbackAction::MyProgress.encode())],
        vec![("Reminder", CallbackAction::ReminderMenu.encode())],
        vec![("Help", CallbackAction::Help.encode())],
    ])
}

fn back_keyboard() -> Value {
    inline_keyboard(&[vec![("Main menu", CallbackAction::MainMenu.encode())]])
}

fn reminder_menu() -> Rendered {
    let mut rows: Vec<Vec<(&str, String)>> = REMINDER_PRESETS
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|&label| {
                    let time: ReminderTime = label.parse().expect("preset times are valid");
                    (label, CallbackAction::RemindAt(time).encode())
                })
                .collect()
        })
        .collect();
    rows.push(vec![("Custom time", CallbackAction::RemindCustom.encode())]);
    rows.push(vec![("Turn off", CallbackAction::RemindOff.encode())]);
    rows.push(vec![("Back", CallbackAction::MainMenu.encode())]);

    Rendered {
        text: "When should I remind you each day?\nPick a time or type your own.".to_string(),
        keyboard: Some(inline_keyboard(&rows)),
    }
}

fn help_screen() -> Rendered {
    Rendered {
        text: "How it works:\n\
               1. Pick a marathon\n\
               2. Get one task every day\n\
               3. Do it and check it off\n\
               4. After 30 days the habit is yours\n\n\
               Free marathons: Reading, Fitness.\n\
               Premium marathons (coming soon): Meditation, Finance."
            .to_string(),
        keyboard: Some(back_keyboard()),
    }
}

/// Ten-cell text progress bar.
fn progress_bar(percent: u32) -> String {
    let filled = (percent.min(100) / 10) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}
