use std::sync::Arc;

use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    db::models::{NewNotification, Notification},
    error::StorageError,
    storage::NotificationRepository,
};

/// Persists notification records and serves per-principal history.
pub struct NotificationStore {
    repo: Arc<dyn NotificationRepository>,
}

impl NotificationStore {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    /// Assign an identity to `notification` and persist it.
    pub async fn save(&self, notification: NewNotification) -> Result<Notification, StorageError> {
        let recipient_id = notification.recipient_id;
        match self.repo.insert(notification).await {
            Ok(saved) => {
                debug!(notification_id = %saved.id, recipient_id = %recipient_id, "Notification saved");
                Ok(saved)
            }
            Err(e) => {
                error!(recipient_id = %recipient_id, error = %e, "Failed to save notification");
                Err(e)
            }
        }
    }

    /// Full history for `principal_id`, newest first.
    pub async fn list_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<Notification>, StorageError> {
        self.repo.list_for_recipient(principal_id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{
        db::models::{SensorType, Severity},
        storage::memory::MemoryNotifications,
    };

    fn new_notification(recipient_id: Uuid, value: f64, age_secs: i64) -> NewNotification {
        NewNotification {
            sensor_type: SensorType::Sound,
            severity: Severity::Warning,
            message: format!("sound elevated: {value}"),
            value,
            recorded_at: Utc::now() - Duration::seconds(age_secs),
            recipient_id,
        }
    }

    #[tokio::test]
    async fn save_assigns_identity() {
        let store = NotificationStore::new(Arc::new(MemoryNotifications::new()));
        let a = store.save(new_notification(Uuid::new_v4(), 85.0, 0)).await.unwrap();
        let b = store.save(new_notification(Uuid::new_v4(), 85.0, 0)).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn history_is_newest_first_even_when_saved_out_of_order() {
        let store = NotificationStore::new(Arc::new(MemoryNotifications::new()));
        let me = Uuid::new_v4();
        store.save(new_notification(me, 81.0, 0)).await.unwrap();
        store.save(new_notification(me, 82.0, 120)).await.unwrap();
        store.save(new_notification(me, 83.0, 60)).await.unwrap();

        let values: Vec<f64> = store
            .list_for_principal(me)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.value)
            .collect();
        assert_eq!(values, vec![81.0, 83.0, 82.0]);
    }

    #[tokio::test]
    async fn save_surfaces_storage_errors() {
        let repo = MemoryNotifications::new();
        repo.set_offline(true);
        let store = NotificationStore::new(Arc::new(repo));
        assert!(store.save(new_notification(Uuid::new_v4(), 90.0, 0)).await.is_err());
    }
}
