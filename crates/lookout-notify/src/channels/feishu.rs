use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use lookout_common::config::FeishuConfig;
use lookout_common::types::{Alert, AlertLevel};

use crate::error::{NotifyError, Result};
use crate::utils::{format_timestamp, level_emoji, should_mention, webhook_signature};
use crate::Notifier;

/// Feishu (Lark) bot webhook. Emits an interactive card with a level-colored
/// header; mentions use the platform's `<at>` tags inside a card element.
pub struct FeishuNotifier {
    config: FeishuConfig,
    client: reqwest::Client,
}

impl FeishuNotifier {
    pub fn new(config: FeishuConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Feishu wraps `"{timestamp}:{signature}"` in a second base64 pass and
    /// uses second-resolution timestamps.
    fn signed_url(&self) -> String {
        if self.config.secret.is_empty() {
            return self.config.webhook_url.clone();
        }
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let sign = webhook_signature(&self.config.secret, &timestamp);
        let sign = base64::engine::general_purpose::STANDARD
            .encode(format!("{timestamp}:{sign}").as_bytes());
        format!(
            "{}&timestamp={}&sign={}",
            self.config.webhook_url, timestamp, sign
        )
    }

    fn header_color(level: AlertLevel) -> &'static str {
        match level {
            AlertLevel::Critical => "red",
            AlertLevel::High => "orange",
            AlertLevel::Medium => "yellow",
            AlertLevel::Low => "green",
            AlertLevel::Info => "blue",
        }
    }

    /// lark_md keeps lightweight markdown; only code fences and excess blank
    /// lines need cleaning.
    fn format_content(message: &str) -> String {
        let mut formatted = message.replace("```", "");
        while formatted.contains("\n\n\n") {
            formatted = formatted.replace("\n\n\n", "\n\n");
        }
        formatted
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    fn mention_text(&self, level: AlertLevel) -> String {
        if !should_mention(level) {
            return String::new();
        }
        if self.config.at_all {
            return "<at id=\"all\"></at>".to_string();
        }
        self.config
            .at_user_ids
            .iter()
            .map(|id| format!("<at id=\"{id}\"></at>"))
            .collect()
    }

    fn build_payload(&self, alert: &Alert) -> Value {
        let emoji = level_emoji(alert.level);
        let mut elements = vec![
            json!({"tag": "div", "text": {"tag": "lark_md",
                "content": format!("🏷️ **Rule:** {}", alert.rule_name)}}),
            json!({"tag": "div", "text": {"tag": "lark_md",
                "content": format!("{emoji} **Level:** {}", alert.level)}}),
            json!({"tag": "div", "text": {"tag": "lark_md",
                "content": format!("🕒 **Time:** {}", format_timestamp(&alert.timestamp))}}),
            json!({"tag": "div", "text": {"tag": "lark_md",
                "content": format!("📈 **Matches:** {}", alert.count)}}),
            json!({"tag": "hr"}),
            json!({"tag": "div", "text": {"tag": "lark_md",
                "content": Self::format_content(&alert.message)}}),
        ];

        let mention = self.mention_text(alert.level);
        if !mention.is_empty() {
            elements.push(json!({"tag": "div", "text": {"tag": "lark_md", "content": mention}}));
        }

        json!({
            "msg_type": "interactive",
            "card": {
                "header": {
                    "title": {
                        "tag": "plain_text",
                        "content": format!("{emoji} Search Alert Notification"),
                    },
                    "template": Self::header_color(alert.level),
                },
                "elements": elements,
            }
        })
    }
}

#[async_trait]
impl Notifier for FeishuNotifier {
    fn name(&self) -> &'static str {
        "feishu"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = self.build_payload(alert);
        let url = self.signed_url();

        let mut last_err = None;
        for attempt in 0..3u32 {
            let request = self
                .client
                .post(&url)
                .timeout(std::time::Duration::from_secs(10))
                .json(&payload);
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(rule = %alert.rule_name, "Feishu alert sent");
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let detail = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status,
                        "Feishu webhook returned HTTP error, retrying"
                    );
                    last_err = Some(NotifyError::Api {
                        service: "feishu",
                        status,
                        detail,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Feishu webhook request failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or_else(|| NotifyError::Other("Feishu send failed".into())))
    }
}
