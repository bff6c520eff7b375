//! Alert delivery and the interactive chat surface.
//!
//! The scheduler hands finished [`AlertNotification`]s to a [`Notifier`];
//! delivery failures are logged and never retried. The production notifier
//! speaks the Telegram Bot API over HTTP and additionally serves the
//! interactive subscription commands through a long-polling update loop.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use models::{AlertNotification, Config, TelegramConfig, Validator, ValidatorStats};
use serde::Deserialize;
use tokio::sync::watch;

use crate::registry::Registry;

/// Delivery seam between the scheduler and the chat transport.
pub trait Notifier: Send + Sync + 'static {
    fn send_alert(
        &self,
        user_id: i64,
        validator: &Validator,
        stats: &ValidatorStats,
        notification: &AlertNotification,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// The configured notifier. Without a telegram section in the configuration
/// the daemon still monitors, it just logs instead of delivering.
pub enum Sender {
    Disabled,
    Telegram(TelegramService),
}

impl Notifier for Sender {
    async fn send_alert(
        &self,
        user_id: i64,
        validator: &Validator,
        stats: &ValidatorStats,
        notification: &AlertNotification,
    ) -> anyhow::Result<()> {
        match self {
            Sender::Disabled => {
                tracing::warn!(
                    user_id,
                    address = %validator.address,
                    alerts = notification.alerts.len(),
                    cleared = notification.cleared_alerts.len(),
                    "skipping alert delivery (notifications disabled)"
                );
                Ok(())
            }
            Sender::Telegram(telegram) => {
                telegram.send_alert(user_id, validator, stats, notification).await
            }
        }
    }
}

/// Telegram-backed notifier plus command handlers. Holds only a late-bound
/// handle to the registry; the registry is constructed afterwards and
/// injected once.
pub struct TelegramService {
    api: TelegramApi,
    config: Config,
    manager: OnceLock<Arc<Registry>>,
}

impl TelegramService {
    pub fn new(config: Config, telegram: &TelegramConfig) -> anyhow::Result<TelegramService> {
        Ok(TelegramService {
            api: TelegramApi::new(&telegram.api_token)?,
            config,
            manager: OnceLock::new(),
        })
    }

    /// Inject the registry handle. Must be called before the update loop
    /// starts serving commands.
    pub fn set_monitor_manager(&self, registry: Arc<Registry>) {
        if self.manager.set(registry).is_err() {
            tracing::warn!("monitor manager was already injected");
        }
    }

    fn manager(&self) -> anyhow::Result<&Arc<Registry>> {
        self.manager
            .get()
            .ok_or_else(|| anyhow!("monitor manager not injected yet"))
    }

    pub async fn send_alert(
        &self,
        user_id: i64,
        validator: &Validator,
        stats: &ValidatorStats,
        notification: &AlertNotification,
    ) -> anyhow::Result<()> {
        if !notification.alerts.is_empty() {
            let message = notifications::render_alerts(validator, stats, notification);
            self.api.send_message(user_id, &message).await?;
        }
        if !notification.cleared_alerts.is_empty() {
            if notification.notify_for_clear {
                let message = notifications::render_cleared(validator, stats, notification);
                self.api.send_message(user_id, &message).await?;
            } else {
                tracing::debug!(
                    user_id,
                    address = %validator.address,
                    cleared = ?notification.cleared_alerts,
                    "suppressing silent clear"
                );
            }
        }
        Ok(())
    }

    /// Long-poll the Bot API and serve subscription commands until shutdown.
    pub async fn serve_updates(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        tracing::info!("starting telegram command loop");
        let mut offset = 0i64;
        loop {
            let updates = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("telegram command loop stopping");
                    return Ok(());
                }
                updates = self.api.get_updates(offset) => updates,
            };
            let updates = match updates {
                Ok(updates) => updates,
                Err(error) => {
                    tracing::warn!(%error, "failed to poll telegram updates");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else { continue };
                // Commands are served over direct messages only.
                if message.chat.kind != "private" {
                    continue;
                }
                let Some(text) = message.text.as_deref() else { continue };
                self.handle_command(&message.chat, text.trim()).await;
            }
        }
    }

    async fn handle_command(&self, chat: &Chat, text: &str) {
        let user_id = chat.id;
        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        let prefix = &self.config.validators_monitor.bech32_prefix;

        let reply = match command {
            "/add" => match args.as_slice() {
                [name, address] => {
                    tracing::info!(user_id, %name, %address, "add validator");
                    match self
                        .manager()
                        .and_then(|mm| mm.add(user_id, Validator::new(*name, *address)))
                    {
                        Ok(()) => format!("validator added to monitor list *{address}*"),
                        Err(err) => format!("{err:#}"),
                    }
                }
                _ => format!("Please try `/add ValidatorName {prefix}1XXXXXXX`"),
            },
            "/remove" => match args.as_slice() {
                [address] => {
                    tracing::info!(user_id, %address, "remove validator");
                    match self.manager().and_then(|mm| mm.remove(user_id, address)) {
                        Ok(()) => format!("validator removed from monitor list *{address}*"),
                        Err(err) => format!("{err:#}"),
                    }
                }
                _ => format!("Please try `/remove {prefix}1XXXXXXX`"),
            },
            "/list" => match self.manager() {
                Ok(mm) => {
                    let list = mm.list(user_id);
                    if list.is_empty() {
                        "*Empty List*".to_string()
                    } else {
                        notifications::render_list(&list)
                    }
                }
                Err(err) => format!("{err:#}"),
            },
            "/status" => match args.as_slice() {
                [address] => match self.manager().and_then(|mm| mm.status(user_id, address)) {
                    Ok(status) => notifications::render_status(
                        &status,
                        self.config.validators_monitor.recent_blocks_to_check,
                    ),
                    Err(err) => format!("{err:#}"),
                },
                _ => format!("Please try `/status {prefix}1XXXXXXX`"),
            },
            "/help" | "/start" => notifications::help_text(prefix),
            _ => return,
        };

        if let Err(error) = self.api.send_message(user_id, &reply).await {
            tracing::warn!(user_id, %error, "failed to reply to telegram command");
        }
    }
}

// Long-poll wait, and the cap we allow the HTTP request itself to take.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal Telegram Bot API client.
pub struct TelegramApi {
    http: reqwest::Client,
    base: reqwest::Url,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TelegramApi {
    pub fn new(api_token: &str) -> anyhow::Result<TelegramApi> {
        let base = reqwest::Url::parse(&format!("https://api.telegram.org/bot{api_token}/"))
            .context("building telegram api url")?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building telegram http client")?;
        Ok(TelegramApi { http, base })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let url = self.base.join(method).context("building telegram method url")?;
        let response: ApiResponse<T> = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("calling telegram {method}"))?
            .json()
            .await
            .with_context(|| format!("decoding telegram {method} response"))?;
        if !response.ok {
            bail!(
                "telegram {method} failed: {}",
                response.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .result
            .ok_or_else(|| anyhow!("telegram {method} returned no result"))
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT.as_secs(),
                "allowed_updates": ["message"],
            }),
        )
        .await
    }
}
