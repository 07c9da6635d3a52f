// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP email channel.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use spendwise_config::model::EmailConfig;
use spendwise_core::SpendwiseError;

use crate::channel::{NotificationChannel, format_line};
use crate::rule::Alert;

pub struct EmailChannel {
    name: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    /// Build a STARTTLS transport. Nothing is sent until the first alert.
    pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self, SpendwiseError> {
        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(SpendwiseError::Config(
                "email channel needs at least one recipient".to_string(),
            ));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| SpendwiseError::Config(format!("invalid SMTP relay: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(timeout));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            name: config.name.clone(),
            from,
            to,
            transport: builder.build(),
        })
    }

    fn failure(&self, message: String) -> SpendwiseError {
        SpendwiseError::DispatchFailure {
            channel: self.name.clone(),
            message,
        }
    }

    fn compose(&self, alert: &Alert) -> Result<Message, SpendwiseError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject_line(alert))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(format_line(alert))
            .map_err(|e| self.failure(format!("failed to build message: {e}")))
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, SpendwiseError> {
    addr.parse()
        .map_err(|e| SpendwiseError::Config(format!("invalid email address `{addr}`: {e}")))
}

fn subject_line(alert: &Alert) -> String {
    format!("[spendwise] {} {}: {}", alert.severity, alert.rule_id, alert.scope)
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), SpendwiseError> {
        let message = self.compose(alert)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| self.failure(format!("SMTP send failed: {e}")))?;
        debug!(channel = %self.name, rule = %alert.rule_id, "email delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spendwise_core::Severity;

    fn config(to: Vec<&str>) -> EmailConfig {
        EmailConfig {
            name: "finance".into(),
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: Some("alerts".into()),
            password: Some("pw".into()),
            from: "Spendwise <alerts@example.com>".into(),
            to: to.into_iter().map(str::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn composes_plain_text_message() {
        let channel = EmailChannel::new(&config(vec!["cfo@example.com"]), Duration::from_secs(5))
            .unwrap();
        assert_eq!(channel.name(), "finance");

        let alert = Alert {
            rule_id: "budget-overrun".into(),
            severity: Severity::Critical,
            scope: "monthly|*".into(),
            scope_values: Default::default(),
            subject: "budget",
            timestamp: Utc::now(),
            message: "projected over".into(),
        };
        let message = channel.compose(&alert).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [spendwise] critical budget-overrun: monthly|*"));
        assert!(raw.contains("To: cfo@example.com"));
    }

    #[tokio::test]
    async fn bad_address_is_config_error() {
        let err = EmailChannel::new(&config(vec!["not an address"]), Duration::from_secs(5));
        assert!(matches!(err, Err(SpendwiseError::Config(_))));
    }

    #[tokio::test]
    async fn no_recipients_is_config_error() {
        let err = EmailChannel::new(&config(vec![]), Duration::from_secs(5));
        assert!(matches!(err, Err(SpendwiseError::Config(_))));
    }
}
