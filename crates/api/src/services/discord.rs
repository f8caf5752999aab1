//! Discord integration: webhook notifications and the community widget.
//!
//! Delivery is fail-open: the platform never fails a request because a
//! Discord call failed. State mutations happen first; notification
//! failures are logged and swallowed.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AppState;

const WEBHOOK_URL_KEY: &str = "discord_webhook_url";
const WEBHOOK_ENABLED_KEY: &str = "discord_webhook_enabled";
const SERVER_ID_KEY: &str = "discord_server_id";

/// How long resolved webhook settings stay cached (seconds).
const SETTINGS_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// Body posted to a Discord webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl WebhookPayload {
    /// Announcement posted when a new member registers.
    pub fn user_registration(username: &str, email: &str) -> Self {
        Self {
            content: None,
            username: Some("Hearth Platform".to_string()),
            embeds: vec![Embed {
                title: Some("👋 New Member".to_string()),
                color: Some(0x06b6d4),
                timestamp: Some(Utc::now().to_rfc3339()),
                fields: vec![
                    EmbedField {
                        name: "Username".to_string(),
                        value: username.to_string(),
                        inline: true,
                    },
                    EmbedField {
                        name: "Email".to_string(),
                        value: email.to_string(),
                        inline: true,
                    },
                ],
                ..Default::default()
            }],
        }
    }

    /// Message used by the admin "test webhook" button.
    pub fn test_message() -> Self {
        Self {
            content: Some(
                "🧪 **Webhook Test**\nThis is a test message from Hearth.".to_string(),
            ),
            username: Some("Hearth Test".to_string()),
            embeds: Vec::new(),
        }
    }
}

/// Discord HTTP surface the platform depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscordNotifier: Send + Sync {
    /// Deliver a payload to a webhook URL; returns whether Discord accepted
    /// it. Delivery failure is reported, never raised.
    async fn send_webhook(&self, webhook_url: &str, payload: WebhookPayload) -> bool;

    /// Public widget JSON for a server; None when unavailable.
    async fn fetch_widget(&self, server_id: &str) -> Option<Value>;
}

/// reqwest-backed implementation of DiscordNotifier.
#[derive(Clone)]
pub struct HttpDiscordNotifier {
    http: reqwest::Client,
}

impl HttpDiscordNotifier {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpDiscordNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscordNotifier for HttpDiscordNotifier {
    async fn send_webhook(&self, webhook_url: &str, payload: WebhookPayload) -> bool {
        match self.http.post(webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Discord webhook rejected");
                false
            }
            Err(err) => {
                tracing::warn!("Discord webhook delivery failed: {}", err);
                false
            }
        }
    }

    async fn fetch_widget(&self, server_id: &str) -> Option<Value> {
        let url = format!("https://discord.com/api/guilds/{}/widget.json", server_id);

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("Discord widget fetch failed: {}", err);
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        response.json::<Value>().await.ok()
    }
}

/// Resolved Discord settings: site_config rows override environment
/// fallbacks, so admins can rotate the webhook without a redeploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub server_id: Option<String>,
}

/// Read settings through the cache (tag `site-config`, 5 minute TTL).
pub async fn webhook_settings(state: &AppState) -> Result<WebhookSettings> {
    let repo = state.repos.site_config.clone();
    let config = state.config.clone();

    state
        .stores
        .cache
        .get_or_compute("site-config:discord", SETTINGS_TTL_SECS, &["site-config"], || async move {
            let webhook_url = match repo.get(WEBHOOK_URL_KEY).await? {
                Some(url) if !url.is_empty() => Some(url),
                _ => config.discord_webhook_url.clone(),
            };

            let enabled = repo
                .get(WEBHOOK_ENABLED_KEY)
                .await?
                .map(|value| value == "true")
                .unwrap_or(true);

            let server_id = match repo.get(SERVER_ID_KEY).await? {
                Some(id) if !id.is_empty() => Some(id),
                _ => config.discord_server_id.clone(),
            };

            Ok(WebhookSettings {
                enabled,
                webhook_url,
                server_id,
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_payload_carries_username_and_email() {
        let payload = WebhookPayload::user_registration("alice", "alice@example.com");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["embeds"][0]["fields"][0]["value"], "alice");
        assert_eq!(json["embeds"][0]["fields"][1]["value"], "alice@example.com");
    }

    #[test]
    fn empty_embed_fields_are_omitted_from_json() {
        let payload = WebhookPayload::test_message();
        let json = serde_json::to_value(&payload).unwrap();

        assert!(json.get("embeds").is_none());
        assert!(json["content"].as_str().unwrap().contains("Webhook Test"));
    }
}
