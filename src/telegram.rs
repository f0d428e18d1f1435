//! Telegram Bot API client
//!
//! Thin HTTPS client over the Bot API: long-poll updates, send and edit
//! messages with inline keyboards, acknowledge callback queries. Only the
//! handful of methods the marathon bot needs.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Telegram API base URL.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout handed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Bot token from @BotFather (format: 123456:ABC-DEF...).
    #[serde(default)]
    pub bot_token: Option<String>,
    /// API base URL (overridable for self-hosted Bot API servers and tests).
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    TELEGRAM_API_BASE.to_string()
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
        }
    }
}

impl TelegramSettings {
    /// A token is plausible when it has the `<id>:<secret>` shape.
    pub fn is_configured(&self) -> bool {
        self.bot_token
            .as_deref()
            .map(|t| !t.is_empty() && t.contains(':'))
            .unwrap_or(false)
    }
}

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
}

/// An incoming update from getUpdates.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
    pub callback_query: Option<CallbackQuery>,
}

/// A plain chat message.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub text: Option<String>,
    pub chat: Chat,
    pub from: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

/// An inline keyboard button press.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
    pub message: Option<IncomingMessage>,
}

/// Build an inline keyboard `reply_markup` value from rows of
/// `(label, callback_data)` pairs.
pub fn inline_keyboard(rows: &[Vec<(&str, String)>]) -> Value {
    let keyboard: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(label, data)| json!({ "text": label, "callback_data": data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": keyboard })
}

/// Client for the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    token: String,
    api_base: String,
    http: reqwest::Client,
}

impl TelegramClient {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        let token = settings
            .bot_token
            .clone()
            .context("Telegram bot token not configured. Set TELEGRAM_BOT_TOKEN or add it to the config file.")?;
        let http = reqwest::Client::builder()
            // Longer than the long-poll timeout so getUpdates can idle.
            .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            token,
            api_base: settings.api_base.clone(),
            http,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        debug!("telegram call: {method}");
        let response: ApiResponse<T> = self
            .http
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach Telegram API ({method})"))?
            .json()
            .await
            .with_context(|| format!("failed to parse Telegram response ({method})"))?;

        if response.ok {
            response.result.context("no result in Telegram response")
        } else {
            bail!(
                "Telegram API error on {method}: {} (code: {:?})",
                response.description.unwrap_or_else(|| "unknown error".to_string()),
                response.error_code
            )
        }
    }

    /// Validate the token and fetch the bot's own account.
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({})).await
    }

    /// Send a text message, optionally with an inline keyboard.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<()> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let _: Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Replace the text (and keyboard) of a previously sent message.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let _: Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    /// Acknowledge a button press, optionally with a toast text.
    pub async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", &body).await
    }
}
