//! Outbound notification seam
//!
//! The scheduler emits reminders through this trait so it never depends on
//! the chat transport directly. Delivery is fire-and-forget: a failed send is
//! the caller's to log, never to propagate into scheduler state.

use anyhow::Result;
use async_trait::async_trait;

use crate::telegram::TelegramClient;
use crate::types::UserId;

/// Something that can deliver a text notification to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// Sends notifications over the Telegram Bot API. For private bots the user
/// id is the chat id.
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<()> {
        self.client.send_message(user_id.0, text, None).await?;
        Ok(())
    }
}
