use async_trait::async_trait;
use serde_json::{json, Value};

use lookout_common::config::DingTalkConfig;
use lookout_common::types::Alert;

use crate::error::{NotifyError, Result};
use crate::utils::{format_timestamp, level_emoji, should_mention, webhook_signature};
use crate::Notifier;

/// DingTalk robot webhook. Speaks markdown with the platform's line-break
/// convention and signs the URL when a secret is configured.
pub struct DingTalkNotifier {
    config: DingTalkConfig,
    client: reqwest::Client,
}

impl DingTalkNotifier {
    pub fn new(config: DingTalkConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Appends `timestamp` (milliseconds) and the percent-encoded signature
    /// as query parameters.
    fn signed_url(&self) -> String {
        if self.config.secret.is_empty() {
            return self.config.webhook_url.clone();
        }
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let sign = webhook_signature(&self.config.secret, &timestamp);
        let sign = urlencoding::encode(&sign);
        format!(
            "{}&timestamp={}&sign={}",
            self.config.webhook_url, timestamp, sign
        )
    }

    /// DingTalk markdown keeps bold markers but needs `"  \n  "` around
    /// newlines to actually break lines. Code fences and divider rows render
    /// poorly, so they are dropped first.
    fn format_content(message: &str) -> String {
        let stripped = message.replace("```", "").replace("---", "");

        // drop divider rows made of nothing but hyphens
        let mut formatted = stripped
            .lines()
            .filter(|l| {
                let t = l.trim();
                !(t.len() >= 6 && t.chars().all(|c| c == '-'))
            })
            .collect::<Vec<_>>()
            .join("\n");

        while formatted.contains("\n\n\n") {
            formatted = formatted.replace("\n\n\n", "\n\n");
        }
        formatted.trim().replace('\n', "  \n  ")
    }

    fn build_payload(&self, alert: &Alert) -> Value {
        let emoji = level_emoji(alert.level);
        let mut markdown = format!(
            "**{emoji} Search Alert Notification**\n\n\
             🏷️ **Rule:** {rule}\n\
             {emoji} **Level:** {level}\n\
             🕒 **Time:** {time}\n\
             📈 **Matches:** {count}\n\n\
             📝 **Details:**\n{details}",
            rule = alert.rule_name,
            level = alert.level,
            time = format_timestamp(&alert.timestamp),
            count = alert.count,
            details = alert.message,
        );
        markdown = Self::format_content(&markdown);

        let mention = should_mention(alert.level);
        if mention {
            let at_text = if self.config.at_all || self.config.at_mobiles.is_empty() {
                "@all ".to_string()
            } else {
                self.config
                    .at_mobiles
                    .iter()
                    .map(|m| format!("@{m} "))
                    .collect()
            };
            markdown.push_str("\n\n");
            markdown.push_str(&at_text);
        }

        let at_mobiles = if mention {
            self.config.at_mobiles.clone()
        } else {
            Vec::new()
        };

        json!({
            "msgtype": "markdown",
            "markdown": {
                "title": "Search Alert Notification",
                "text": markdown,
            },
            "at": {
                "atMobiles": at_mobiles,
                "isAtAll": mention && self.config.at_all,
            }
        })
    }
}

#[async_trait]
impl Notifier for DingTalkNotifier {
    fn name(&self) -> &'static str {
        "dingtalk"
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
                    let body: Value = resp.json().await.unwrap_or_default();
                    if body.get("errcode").and_then(Value::as_i64).unwrap_or(0) == 0 {
                        tracing::info!(rule = %alert.rule_name, "DingTalk alert sent");
                        return Ok(());
                    }
                    let errmsg = body
                        .get("errmsg")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    tracing::warn!(
                        attempt = attempt + 1,
                        errmsg = %errmsg,
                        "DingTalk API returned error, retrying"
                    );
                    last_err = Some(NotifyError::Api {
                        service: "dingtalk",
                        status: 200,
                        detail: errmsg,
                    });
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let detail = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status,
                        "DingTalk webhook returned HTTP error, retrying"
                    );
                    last_err = Some(NotifyError::Api {
                        service: "dingtalk",
                        status,
                        detail,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "DingTalk webhook request failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or_else(|| NotifyError::Other("DingTalk send failed".into())))
    }
}
