// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification channel trait and the local console channel.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use spendwise_core::{Severity, SpendwiseError};

use crate::rule::Alert;

/// Name the console channel registers under.
pub const CONSOLE_CHANNEL: &str = "console";

/// A destination for alerts.
#[async_trait]
pub trait NotificationChannel: Send + Sync + 'static {
    /// Name rules use to address this channel.
    fn name(&self) -> &str;

    /// Whether alerts of `severity` should be delivered here.
    fn accepts(&self, _severity: Severity) -> bool {
        true
    }

    /// Deliver one alert. Network channels may take up to the manager's
    /// dispatch timeout before being abandoned.
    async fn send(&self, alert: &Alert) -> Result<(), SpendwiseError>;
}

/// Writes one line per alert to a local stream (stderr by default).
pub struct ConsoleChannel {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// `[warning] 2026-03-10T12:00:00+00:00 budget-overrun monthly|*: message`
pub fn format_line(alert: &Alert) -> String {
    format!(
        "[{}] {} {} {}: {}",
        alert.severity,
        alert.timestamp.to_rfc3339(),
        alert.rule_id,
        alert.scope,
        alert.message
    )
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        CONSOLE_CHANNEL
    }

    async fn send(&self, alert: &Alert) -> Result<(), SpendwiseError> {
        let failure = |message: String| SpendwiseError::DispatchFailure {
            channel: CONSOLE_CHANNEL.to_string(),
            message,
        };
        let mut out = self
            .out
            .lock()
            .map_err(|_| failure("console writer poisoned".to_string()))?;
        writeln!(out, "{}", format_line(alert)).map_err(|e| failure(e.to_string()))?;
        out.flush().map_err(|e| failure(e.to_string()))
    }
}
