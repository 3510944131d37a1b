use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{NewNotification, Notification};
use crate::{error::StorageError, storage::NotificationRepository};

#[derive(Clone)]
pub struct PgNotifications {
    pool: PgPool,
}

impl PgNotifications {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotifications {
    async fn insert(&self, n: NewNotification) -> Result<Notification, StorageError> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications
                (id, sensor_type, severity, message, value, recorded_at, recipient_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, sensor_type, severity, message, value, recorded_at, recipient_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(n.sensor_type)
        .bind(n.severity)
        .bind(&n.message)
        .bind(n.value)
        .bind(n.recorded_at)
        .bind(n.recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, StorageError> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, sensor_type, severity, message, value, recorded_at, recipient_id
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
