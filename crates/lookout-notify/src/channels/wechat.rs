use async_trait::async_trait;
use serde_json::{json, Value};

use lookout_common::config::WeChatConfig;
use lookout_common::types::Alert;

use crate::error::{NotifyError, Result};
use crate::utils::{format_timestamp, level_emoji, should_mention};
use crate::Notifier;

/// WeChat Work group-robot webhook. Text messages only, so the markdown body
/// is flattened to plain text before sending.
pub struct WeChatNotifier {
    config: WeChatConfig,
    client: reqwest::Client,
}

impl WeChatNotifier {
    pub fn new(config: WeChatConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Markdown to plain text: bold markers, code fences, and divider rows
    /// all disappear; runs of blank lines collapse to one.
    fn format_content(message: &str) -> String {
        let mut formatted = message
            .replace("**", "")
            .replace("```", "")
            .replace("---", "");

        let without_dividers = formatted
            .lines()
            .filter(|l| {
                let t = l.trim();
                !(t.len() >= 6 && t.chars().all(|c| c == '-'))
            })
            .collect::<Vec<_>>()
            .join("\n");
        formatted = without_dividers;

        while formatted.contains("\n\n\n") {
            formatted = formatted.replace("\n\n\n", "\n\n");
        }
        formatted.trim().to_string()
    }

    fn build_payload(&self, alert: &Alert) -> Value {
        let emoji = level_emoji(alert.level);
        let content = format!(
            "{emoji} Search Alert Notification\n\n\
             🏷️ Rule: {rule}\n\
             {emoji} Level: {level}\n\
             🕒 Time: {time}\n\
             📈 Matches: {count}\n\n\
             📝 Details:\n{details}",
            rule = alert.rule_name,
            level = alert.level,
            time = format_timestamp(&alert.timestamp),
            count = alert.count,
            details = Self::format_content(&alert.message),
        );

        let mut text = json!({ "content": content });

        if should_mention(alert.level) {
            if self.config.at_all {
                text["mentioned_list"] = json!(["@all"]);
            } else {
                if !self.config.mentioned_list.is_empty() {
                    text["mentioned_list"] = json!(self.config.mentioned_list);
                }
                if !self.config.mentioned_mobile_list.is_empty() {
                    text["mentioned_mobile_list"] = json!(self.config.mentioned_mobile_list);
                }
            }
        }

        json!({ "msgtype": "text", "text": text })
    }
}

#[async_trait]
impl Notifier for WeChatNotifier {
    fn name(&self) -> &'static str {
        "wechat"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = self.build_payload(alert);

        let mut last_err = None;
        for attempt in 0..3u32 {
            let request = self
                .client
                .post(&self.config.webhook_url)
                .timeout(std::time::Duration::from_secs(10))
                .json(&payload);
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp.json().await.unwrap_or_default();
                    if body.get("errcode").and_then(Value::as_i64).unwrap_or(0) == 0 {
                        tracing::info!(rule = %alert.rule_name, "WeChat Work alert sent");
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
                        "WeChat Work API returned error, retrying"
                    );
                    last_err = Some(NotifyError::Api {
                        service: "wechat",
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
                        "WeChat Work webhook returned HTTP error, retrying"
                    );
                    last_err = Some(NotifyError::Api {
                        service: "wechat",
                        status,
                        detail,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "WeChat Work webhook request failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or_else(|| NotifyError::Other("WeChat Work send failed".into())))
    }
}
