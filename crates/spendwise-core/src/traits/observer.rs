// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook for components that react to freshly ingested events.

use crate::types::UsageEvent;

/// Notified after an event has been durably written.
///
/// Called on the ingesting task, so implementations must return promptly
/// and hand any slow work (network dispatch) to a background task.
pub trait UsageObserver: Send + Sync + 'static {
    fn on_event(&self, event: &UsageEvent);
}
