use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

use lookout_common::config::NotificationsConfig;
use lookout_common::types::{Alert, AlertLevel};

use crate::channels::{DingTalkNotifier, EmailNotifier, FeishuNotifier, WeChatNotifier};
use crate::error::{NotifyError, Result};
use crate::Notifier;

/// The fixed channel registry and the fan-out over it.
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    /// Builds the standard registry: email plus the three chat webhooks.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let notifiers: Vec<Arc<dyn Notifier>> = vec![
            Arc::new(EmailNotifier::new(config.email.clone())?),
            Arc::new(DingTalkNotifier::new(config.dingtalk.clone())),
            Arc::new(WeChatNotifier::new(config.wechat.clone())),
            Arc::new(FeishuNotifier::new(config.feishu.clone())),
        ];
        Ok(Self { notifiers })
    }

    /// Registry injection point for tests and embedders.
    pub fn with_notifiers(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.notifiers
            .iter()
            .filter(|n| n.is_enabled())
            .map(|n| n.name())
            .collect()
    }

    pub fn has_enabled(&self) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled())
    }

    /// Scatter to every selected channel, gather every result.
    ///
    /// `channels` narrows the fan-out to the named adapters; empty means all
    /// enabled. Each send runs as its own task; the barrier waits for all of
    /// them and hands back `(channel, result)` pairs for aggregation.
    async fn fan_out(
        &self,
        alert: &Alert,
        channels: &[String],
    ) -> Vec<(&'static str, Result<()>)> {
        let mut set = JoinSet::new();
        for notifier in &self.notifiers {
            if !notifier.is_enabled() {
                continue;
            }
            if !channels.is_empty() && !channels.iter().any(|c| c == notifier.name()) {
                continue;
            }
            let notifier = Arc::clone(notifier);
            let alert = alert.clone();
            set.spawn(async move { (notifier.name(), notifier.send(&alert).await) });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(e) => tracing::error!(error = %e, "notifier task panicked"),
            }
        }
        results
    }

    /// Delivers one alert. Channel failures are logged, never propagated:
    /// the caller's history write must not depend on delivery succeeding.
    pub async fn send_alert(&self, alert: &Alert, channels: &[String]) {
        tracing::debug!(
            rule = %alert.rule_name,
            level = %alert.level,
            "dispatching alert to notifiers"
        );

        let results = self.fan_out(alert, channels).await;
        for (channel, result) in &results {
            if let Err(e) = result {
                tracing::error!(channel, error = %e, "notification failed");
            }
        }
    }

    /// Test-and-verify path: a synthetic Info alert through the same fan-out.
    pub async fn send_test(&self) -> Result<()> {
        let now = Utc::now();
        let alert = Alert {
            id: format!("test-alert-{}", now.timestamp()),
            rule_name: "Connectivity test".to_string(),
            level: AlertLevel::Info,
            message: "Test message verifying that notification channels are working.".to_string(),
            timestamp: now,
            data: json!({"test": true}),
            count: 1,
            matches: 1,
        };

        let results = self.fan_out(&alert, &[]).await;
        let failures: Vec<String> = results
            .iter()
            .filter_map(|(channel, r)| r.as_ref().err().map(|e| format!("{channel}: {e}")))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Other(format!(
                "test notification failed on {}",
                failures.join("; ")
            )))
        }
    }
}
