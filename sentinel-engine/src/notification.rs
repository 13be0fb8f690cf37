//! Alert notification payloads and the dispatcher seam.
//!
//! The engine decides that a notification is due and what it says. Delivery
//! belongs to a `NotificationDispatcher` supplied by the caller, and only
//! runs when the caller triggers `dispatch_alerts`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::deviation_alerter::AlertReport;
use crate::error::{EngineError, EngineResult};
use crate::types::AlertEvent;
use crate::util;

/// Payload handed to a dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlertNotification {
    pub subject: String,
    /// Newline-joined `material: value (mean ± stddev)` lines.
    pub body: String,
    pub recipient: String,
}

/// Build the notification for a set of alerts. Returns `None` when there
/// is nothing to report.
pub fn build_notification(
    alerts: &[AlertEvent],
    recipient: &str,
) -> EngineResult<Option<AlertNotification>> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(EngineError::invalid_parameter(
            "recipient",
            "must not be empty",
        ));
    }
    if alerts.is_empty() {
        return Ok(None);
    }

    let subject = format!(
        "Stock alert: {} material{} outside expected range",
        alerts.len(),
        if alerts.len() == 1 { "" } else { "s" }
    );
    let body = alerts
        .iter()
        .map(AlertEvent::summary_line)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Some(AlertNotification {
        subject,
        body,
        recipient: recipient.to_string(),
    }))
}

/// Delivers a fully formed notification. Implementations own the transport.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Decide if this dispatcher should run for the given payload.
    fn enable(&self, _notification: &AlertNotification) -> bool {
        true
    }

    /// Deliver the payload.
    async fn dispatch(&self, notification: Arc<AlertNotification>) -> Result<(), String>;

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        util::short_type_name(std::any::type_name::<Self>())
    }
}

/// Writes the payload to the log instead of delivering it.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: Arc<AlertNotification>) -> Result<(), String> {
        log::info!(
            "to={} subject=\"{}\"\n{}",
            notification.recipient,
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

/// Manual trigger: build the payload for `report` and hand it to
/// `dispatcher`. Returns whether anything was dispatched.
pub async fn dispatch_alerts(
    dispatcher: &dyn NotificationDispatcher,
    report: &AlertReport,
    recipient: &str,
) -> EngineResult<bool> {
    let Some(notification) = build_notification(&report.alerts, recipient)? else {
        log::info!("no deviation alerts, nothing to dispatch");
        return Ok(false);
    };

    if !dispatcher.enable(&notification) {
        log::debug!("{} declined the notification", dispatcher.name());
        return Ok(false);
    }

    dispatcher
        .dispatch(Arc::new(notification))
        .await
        .map_err(EngineError::Dispatch)?;
    log::info!(
        "{} dispatched {} alerts to {}",
        dispatcher.name(),
        report.alerts.len(),
        recipient.trim()
    );
    Ok(true)
}
