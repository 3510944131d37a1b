use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{message, Alert, RecipientResolver};
use crate::{
    db::models::{NewNotification, Notification, Reading, Severity},
    error::StorageError,
    notifications::NotificationStore,
    notifier::Notifier,
};

/// What happened to the alert email. Never affects dispatch success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// The recipient has no email address.
    NotAttempted,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    /// Severity was normal; nothing recorded.
    Skipped,
    /// No principal to alert; nothing recorded.
    NoRecipient,
    Sent {
        notification: Notification,
        email: EmailStatus,
    },
}

impl DispatchResult {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            DispatchResult::Sent { notification, .. } => Some(notification),
            _ => None,
        }
    }
}

/// Records notifications for non-normal readings and emails the recipient.
///
/// Only a failure to store the notification is an error. Email delivery is
/// best effort: its outcome is reported in [`EmailStatus`] and logged.
pub struct AlertDispatcher {
    notifications: Arc<NotificationStore>,
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(notifications: Arc<NotificationStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { notifications, notifier }
    }

    pub async fn dispatch(
        &self,
        reading: &Reading,
        severity: Severity,
        resolver: &dyn RecipientResolver,
    ) -> Result<DispatchResult, StorageError> {
        if !severity.is_alert() {
            return Ok(DispatchResult::Skipped);
        }
        self.dispatch_alert(Alert::for_reading(reading, severity), resolver).await
    }

    /// Dispatch an alert whose severity and message were decided upstream.
    pub async fn dispatch_alert(
        &self,
        alert: Alert,
        resolver: &dyn RecipientResolver,
    ) -> Result<DispatchResult, StorageError> {
        if !alert.severity.is_alert() {
            return Ok(DispatchResult::Skipped);
        }

        let recipient = match resolver.resolve(&alert).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!(
                    sensor_type = %alert.sensor_type,
                    severity = %alert.severity,
                    value = alert.value,
                    "No recipient for alert; notification not created"
                );
                return Ok(DispatchResult::NoRecipient);
            }
            Err(e) => {
                warn!(
                    sensor_type = %alert.sensor_type,
                    error = %e,
                    "Recipient lookup failed; notification not created"
                );
                return Ok(DispatchResult::NoRecipient);
            }
        };

        let notification = self
            .notifications
            .save(NewNotification {
                sensor_type: alert.sensor_type,
                severity: alert.severity,
                message: alert.message,
                value: alert.value,
                recorded_at: alert.recorded_at,
                recipient_id: recipient.id,
            })
            .await?;

        info!(
            notification_id = %notification.id,
            recipient_id = %recipient.id,
            sensor_type = %notification.sensor_type,
            severity = %notification.severity,
            value = notification.value,
            "Alert notification created"
        );

        let email = match recipient.email.as_deref() {
            None => EmailStatus::NotAttempted,
            Some(to) => {
                let rendered = message::render_email(to, &notification);
                match self.notifier.send(&rendered).await {
                    Ok(()) => EmailStatus::Delivered,
                    Err(e) => {
                        warn!(
                            notification_id = %notification.id,
                            to = %to,
                            error = %e,
                            "Alert email delivery failed; notification kept"
                        );
                        EmailStatus::Failed
                    }
                }
            }
        };

        Ok(DispatchResult::Sent { notification, email })
    }
}
