//! Notification dispatcher (spec §4.10). For each enabled
//! [`crate::store::models::NotificationChannel`], dispatch is fire-and-forget:
//! one concurrent `tokio::spawn` per channel per event, with errors isolated
//! so one channel's failure never affects another.

use std::time::Duration;

use jiff::Zoned;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AcmeError, Result};
use crate::store::NotificationChannelRepo;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const NOTIFY_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A notification to deliver across every enabled channel (spec §4.10 and
/// §4.2 operations 4/5: issuance/renewal success and failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    /// Subsystem that raised the event, e.g. `"renewal"`, `"agent"`.
    pub source: String,
}

impl NotificationEvent {
    pub fn new(title: impl Into<String>, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailConfig {
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    from: String,
    to: String,
    username: Option<String>,
    password: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize)]
struct TelegramConfig {
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct BarkConfig {
    server_url: String,
    device_key: String,
}

/// Dispatches [`NotificationEvent`]s across every enabled row in
/// [`NotificationChannelRepo`] (spec §3 `Notification channel`, §4.10).
#[derive(Clone)]
pub struct NotificationDispatcher {
    channels: NotificationChannelRepo,
    http: reqwest::Client,
}

impl NotificationDispatcher {
    pub fn new(channels: NotificationChannelRepo) -> Self {
        Self {
            channels,
            http: reqwest::Client::new(),
        }
    }

    /// Fan out `event` to every enabled channel. Each channel dispatches on
    /// its own spawned task; this call returns once all dispatches have been
    /// scheduled, not once they've completed.
    pub async fn dispatch(&self, event: NotificationEvent) {
        let channels = match self.channels.list_enabled().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to load notification channels");
                return;
            }
        };

        for channel in channels {
            let http = self.http.clone();
            let event = event.clone();
            tokio::spawn(async move {
                let result = match channel.channel_type.as_str() {
                    "webhook" => send_webhook(&http, &channel.config, &event).await,
                    "email" => send_email(&channel.config, &event).await,
                    "telegram" => send_telegram(&http, &channel.config, &event).await,
                    "bark" => send_bark(&http, &channel.config, &event).await,
                    other => Err(AcmeError::notify(format!("unknown channel type: {other}"))),
                };
                if let Err(e) = result {
                    warn!(channel = %channel.name, channel_type = %channel.channel_type, error = %e, "notification dispatch failed");
                }
            });
        }
    }
}

fn timestamp_now() -> String {
    Zoned::now().strftime("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// POST `{title, message, timestamp, source}` with a 10s timeout.
/// Non-2xx is reported as a warning by the caller, never retried (spec §4.10).
async fn send_webhook(
    http: &reqwest::Client,
    config: &serde_json::Value,
    event: &NotificationEvent,
) -> Result<()> {
    let config: WebhookConfig = serde_json::from_value(config.clone())
        .map_err(|e| AcmeError::notify(format!("invalid webhook config: {e}")))?;

    let body = serde_json::json!({
        "title": event.title,
        "message": event.message,
        "timestamp": timestamp_now(),
        "source": event.source,
    });

    let mut request = http.post(&config.url).timeout(WEBHOOK_TIMEOUT).json(&body);
    for (key, value) in &config.headers {
        request = request.header(key, value);
    }
    if let Some(token) = &config.auth_token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| AcmeError::transport(format!("webhook request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(AcmeError::notify(format!(
            "webhook returned status {}",
            response.status()
        )));
    }
    Ok(())
}

/// Dial SMTP with implicit TLS first, falling back to STARTTLS if the TLS
/// dial fails (spec §4.10).
async fn send_email(config: &serde_json::Value, event: &NotificationEvent) -> Result<()> {
    let config: EmailConfig = serde_json::from_value(config.clone())
        .map_err(|e| AcmeError::notify(format!("invalid email config: {e}")))?;

    let from: Mailbox = config
        .from
        .parse()
        .map_err(|e| AcmeError::notify(format!("invalid from address: {e}")))?;
    let to: Mailbox = config
        .to
        .parse()
        .map_err(|e| AcmeError::notify(format!("invalid to address: {e}")))?;

    let email = Message::builder()
        .from(from)
        .to(to)
        .subject(&event.title)
        .body(event.message.clone())
        .map_err(|e| AcmeError::notify(format!("failed to build email: {e}")))?;

    let credentials = match (&config.username, &config.password) {
        (Some(u), Some(p)) => Some(Credentials::new(u.clone(), p.clone())),
        _ => None,
    };

    let tls_transport = build_smtp_transport(&config.smtp_host, config.smtp_port, credentials.clone(), true);
    if let Ok(transport) = tls_transport
        && transport.send(email.clone()).await.is_ok()
    {
        return Ok(());
    }

    let starttls_transport = build_smtp_transport(&config.smtp_host, config.smtp_port, credentials, false)
        .map_err(|e| AcmeError::notify(format!("failed to build STARTTLS transport: {e}")))?;
    starttls_transport
        .send(email)
        .await
        .map_err(|e| AcmeError::notify(format!("email send failed over TLS and STARTTLS: {e}")))?;
    Ok(())
}

fn build_smtp_transport(
    host: &str,
    port: u16,
    credentials: Option<Credentials>,
    implicit_tls: bool,
) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let tls = if implicit_tls {
        Tls::Wrapper(
            TlsParameters::builder(host.to_string())
                .build()
                .map_err(|e| AcmeError::notify(format!("tls setup failed: {e}")))?,
        )
    } else {
        Tls::Required(
            TlsParameters::builder(host.to_string())
                .build()
                .map_err(|e| AcmeError::notify(format!("starttls setup failed: {e}")))?,
        )
    };

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        .port(port)
        .tls(tls);
    if let Some(creds) = credentials {
        builder = builder.credentials(creds);
    }
    Ok(builder.build())
}

/// POST to the Telegram Bot API with Markdown parse mode (spec §4.10).
async fn send_telegram(
    http: &reqwest::Client,
    config: &serde_json::Value,
    event: &NotificationEvent,
) -> Result<()> {
    let config: TelegramConfig = serde_json::from_value(config.clone())
        .map_err(|e| AcmeError::notify(format!("invalid telegram config: {e}")))?;

    let url = format!("https://api.telegram.org/bot{}/sendMessage", config.bot_token);
    let body = serde_json::json!({
        "chat_id": config.chat_id,
        "text": format!("*{}*\n{}", event.title, event.message),
        "parse_mode": "Markdown",
    });

    let response = http
        .post(&url)
        .timeout(NOTIFY_HTTP_TIMEOUT)
        .json(&body)
        .send()
        .await
        .map_err(|e| AcmeError::transport(format!("telegram request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(AcmeError::notify(format!(
            "telegram returned status {}",
            response.status()
        )));
    }
    Ok(())
}

/// GET `{server_url}/{device_key}/{title}/{message}` (spec §4.10).
async fn send_bark(
    http: &reqwest::Client,
    config: &serde_json::Value,
    event: &NotificationEvent,
) -> Result<()> {
    let config: BarkConfig = serde_json::from_value(config.clone())
        .map_err(|e| AcmeError::notify(format!("invalid bark config: {e}")))?;

    let url = format!(
        "{}/{}/{}/{}",
        config.server_url.trim_end_matches('/'),
        config.device_key,
        urlencoding::encode(&event.title),
        urlencoding::encode(&event.message),
    );

    let response = http
        .get(&url)
        .timeout(NOTIFY_HTTP_TIMEOUT)
        .send()
        .await
        .map_err(|e| AcmeError::transport(format!("bark request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(AcmeError::notify(format!("bark returned status {}", response.status())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_event_construction() {
        let event = NotificationEvent::new("Renewal succeeded", "example.com renewed", "renewal");
        assert_eq!(event.title, "Renewal succeeded");
        assert_eq!(event.source, "renewal");
    }

    #[test]
    fn test_webhook_config_parses_minimal_json() {
        let value = serde_json::json!({"url": "https://example.com/hook"});
        let config: WebhookConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.url, "https://example.com/hook");
        assert!(config.headers.is_empty());
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_telegram_config_requires_bot_token_and_chat_id() {
        let value = serde_json::json!({"bot_token": "abc", "chat_id": "123"});
        let config: TelegramConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.bot_token, "abc");
        assert_eq!(config.chat_id, "123");
    }

    #[tokio::test]
    async fn test_dispatch_with_no_channels_does_not_panic() {
        let store = crate::store::Store::open_in_memory([7u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        let dispatcher = NotificationDispatcher::new(store.notification_channels.clone());
        dispatcher
            .dispatch(NotificationEvent::new("t", "m", "test"))
            .await;
    }
}
