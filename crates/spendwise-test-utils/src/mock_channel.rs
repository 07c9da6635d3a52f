// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification channel that captures alerts for assertions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use spendwise_alert::{Alert, NotificationChannel};
use spendwise_core::SpendwiseError;

/// Captures every alert passed to `send()`.
///
/// A failing channel records nothing and returns a dispatch failure, which
/// lets tests check that one broken channel does not affect the others.
pub struct RecordingChannel {
    name: String,
    fail: bool,
    received: Arc<Mutex<Vec<Alert>>>,
    notify: Arc<Notify>,
}

impl RecordingChannel {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fail: false,
            received: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        })
    }

    pub fn failing(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fail: true,
            received: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        })
    }

    /// All captured alerts, in delivery order.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.received.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.received.lock().await.len()
    }

    /// Wait until at least `n` alerts have arrived or `timeout` passes.
    /// Returns the number received.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let count = self.count().await;
            if count >= n {
                return count;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count().await;
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), SpendwiseError> {
        if self.fail {
            return Err(SpendwiseError::DispatchFailure {
                channel: self.name.clone(),
                message: "channel configured to fail".to_string(),
            });
        }
        self.received.lock().await.push(alert.clone());
        self.notify.notify_one();
        Ok(())
    }
}
