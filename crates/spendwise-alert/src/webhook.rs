// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP webhook channel.
//!
//! Each alert is POSTed as JSON. A non-2xx response or transport error is a
//! dispatch failure; the manager records it and moves on.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use spendwise_config::model::WebhookConfig;
use spendwise_core::{Severity, SpendwiseError};

use crate::channel::NotificationChannel;
use crate::rule::{Alert, ScopeValues};

#[derive(Serialize)]
struct Payload<'a> {
    rule: &'a str,
    severity: Severity,
    scope: &'a ScopeValues,
    scope_key: &'a str,
    subject: &'a str,
    timestamp: String,
    message: &'a str,
}

pub struct WebhookChannel {
    name: String,
    url: String,
    token: Option<String>,
    min_severity: Severity,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig, timeout: Duration) -> Result<Self, SpendwiseError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpendwiseError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            token: config.token.clone(),
            min_severity: config.min_severity,
            client,
        })
    }

    fn failure(&self, message: String) -> SpendwiseError {
        SpendwiseError::DispatchFailure {
            channel: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    async fn send(&self, alert: &Alert) -> Result<(), SpendwiseError> {
        let payload = Payload {
            rule: &alert.rule_id,
            severity: alert.severity,
            scope: &alert.scope_values,
            scope_key: &alert.scope,
            subject: alert.subject,
            timestamp: alert.timestamp.to_rfc3339(),
            message: &alert.message,
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.failure(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failure(format!("webhook returned {status}")));
        }
        debug!(channel = %self.name, rule = %alert.rule_id, "webhook delivered");
        Ok(())
    }
}
