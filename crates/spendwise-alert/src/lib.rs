// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alerting for Spendwise.
//!
//! An [`AlertManager`] holds [`AlertRule`]s and [`NotificationChannel`]s.
//! Rules are evaluated against usage events, budget statuses, and anomalies;
//! each (rule, scope) pair fires at most once per cooldown.

pub mod channel;
pub mod email;
pub mod manager;
pub mod rule;
pub mod webhook;

pub use channel::{CONSOLE_CHANNEL, ConsoleChannel, NotificationChannel};
pub use email::EmailChannel;
pub use manager::{AlertManager, DispatchFailureRecord};
pub use rule::{Alert, AlertRule, RulePredicate, ScopeValues, Subject};
pub use webhook::WebhookChannel;
