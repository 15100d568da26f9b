use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use lookout_common::config::EmailConfig;
use lookout_common::path::{get_map, get_str};
use lookout_common::types::{Alert, AlertLevel};

use crate::error::{NotifyError, Result};
use crate::utils::{format_timestamp, level_emoji};
use crate::Notifier;

/// SMTP delivery. The body is HTML with level-keyed CSS classes so mail
/// clients render severity at a glance.
pub struct EmailNotifier {
    config: EmailConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let transport = if config.enabled {
            if config.smtp_server.is_empty() || config.from_email.is_empty() {
                return Err(NotifyError::InvalidConfig(
                    "email requires smtp_server and from_email".into(),
                ));
            }
            let mut builder = if config.use_tls {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
                    .map_err(|e| NotifyError::Smtp(e.to_string()))?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
            };
            builder = builder.port(config.smtp_port);
            if !config.username.is_empty() {
                builder = builder.credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ));
            }
            Some(builder.build())
        } else {
            None
        };

        Ok(Self { config, transport })
    }

    fn level_class(level: AlertLevel) -> &'static str {
        match level {
            AlertLevel::Critical => "critical",
            AlertLevel::High => "high",
            AlertLevel::Medium => "medium",
            AlertLevel::Low => "low",
            AlertLevel::Info => "info",
        }
    }

    fn html_escape(raw: &str) -> String {
        raw.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    fn build_body(alert: &Alert) -> String {
        let class = Self::level_class(alert.level);
        let emoji = level_emoji(alert.level);
        let message = Self::html_escape(&alert.message.replace("```", ""));

        // example-document context, when the hit carried container metadata
        let sample = get_map(&alert.data, "sample_hit");
        let kube = get_map(sample, "kubernetes");
        let pod = get_str(kube, "pod_name");
        let namespace = get_str(kube, "namespace_name");
        let container = get_str(kube, "container_name");
        let mut kube_section = String::new();
        if !pod.is_empty() || !namespace.is_empty() || !container.is_empty() {
            kube_section = format!(
                r#"<div class="field {class}"><span class="label">Kubernetes:</span>
  <div>📦 Pod: {pod}</div>
  <div>📁 Namespace: {namespace}</div>
  <div>🐳 Container: {container}</div>
</div>"#,
                pod = Self::html_escape(pod),
                namespace = Self::html_escape(namespace),
                container = Self::html_escape(container),
            );
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<style>
  body {{ font-family: Arial, sans-serif; margin: 20px; line-height: 1.6; color: #333; }}
  .header {{ padding: 16px 20px; border-radius: 10px; margin-bottom: 20px; }}
  .header.critical {{ background: #f8d7da; border: 1px solid #f5c2c7; }}
  .header.high {{ background: #fff3cd; border: 1px solid #ffecb5; }}
  .header.medium {{ background: #fff8e1; border: 1px solid #ffe59b; }}
  .header.low {{ background: #d1e7dd; border: 1px solid #badbcc; }}
  .header.info {{ background: #cfe2ff; border: 1px solid #b6d4fe; }}
  .field {{ margin: 8px 0; }}
  .label {{ font-weight: bold; }}
  .message {{ background: #f6f8fa; border-radius: 6px; padding: 12px; white-space: pre-wrap; }}
</style>
</head>
<body>
<div class="header {class}"><h2>{emoji} Search Alert Notification</h2></div>
<div class="field"><span class="label">Rule:</span> {rule}</div>
<div class="field"><span class="label">Level:</span> {level}</div>
<div class="field"><span class="label">Time:</span> {time}</div>
<div class="field"><span class="label">Matches:</span> {count}</div>
{kube_section}
<div class="message {class}">{message}</div>
</body>
</html>"#,
            rule = Self::html_escape(&alert.rule_name),
            level = alert.level,
            time = format_timestamp(&alert.timestamp),
            count = alert.count,
        )
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.transport.is_some()
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };
        if self.config.to_emails.is_empty() {
            return Err(NotifyError::InvalidConfig("email has no recipients".into()));
        }

        let subject = format!("[{}] {}", alert.level, alert.rule_name);
        let body = Self::build_body(alert);
        let from: lettre::message::Mailbox = self
            .config
            .from_email
            .parse()
            .map_err(|e| NotifyError::Smtp(format!("bad from address: {e}")))?;

        for recipient in &self.config.to_emails {
            let to = recipient
                .parse()
                .map_err(|e| NotifyError::Smtp(format!("bad recipient {recipient}: {e}")))?;
            let email = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(&subject)
                .header(ContentType::TEXT_HTML)
                .body(body.clone())
                .map_err(|e| NotifyError::Smtp(e.to_string()))?;

            let mut last_err = None;
            for attempt in 0..3u32 {
                match transport.send(email.clone()).await {
                    Ok(_) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            recipient = %recipient,
                            error = %e,
                            "email send failed, retrying"
                        );
                        last_err = Some(e);
                        if attempt < 2 {
                            tokio::time::sleep(std::time::Duration::from_millis(
                                100 * 2u64.pow(attempt),
                            ))
                            .await;
                        }
                    }
                }
            }
            if let Some(e) = last_err {
                return Err(NotifyError::Smtp(e.to_string()));
            }
        }

        tracing::info!(rule = %alert.rule_name, "email alert sent");
        Ok(())
    }
}
