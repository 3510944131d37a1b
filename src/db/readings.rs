use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Reading, SensorType};
use crate::{error::StorageError, storage::ReadingRepository};

#[derive(Clone)]
pub struct PgReadings {
    pool: PgPool,
}

impl PgReadings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingRepository for PgReadings {
    async fn insert(
        &self,
        sensor_type: SensorType,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Reading, StorageError> {
        let reading = sqlx::query_as::<_, Reading>(
            r#"
            INSERT INTO readings (id, sensor_type, value, recorded_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sensor_type, value, recorded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sensor_type)
        .bind(value)
        .bind(recorded_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(reading)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        let rows = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, sensor_type, value, recorded_at
            FROM readings
            ORDER BY recorded_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn insert_then_recent_returns_newest_first(pool: PgPool) {
        let repo = PgReadings::new(pool);
        let now = Utc::now();
        repo.insert(SensorType::Gas, 310.0, now - Duration::seconds(30)).await.unwrap();
        repo.insert(SensorType::Sound, 72.5, now).await.unwrap();

        let rows = repo.recent(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sensor_type, SensorType::Sound);
        assert_eq!(rows[0].value, 72.5);
        assert_eq!(rows[1].sensor_type, SensorType::Gas);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn recent_respects_limit(pool: PgPool) {
        let repo = PgReadings::new(pool);
        for v in [1.0, 2.0, 3.0] {
            repo.insert(SensorType::Temperature, v, Utc::now()).await.unwrap();
        }
        assert_eq!(repo.recent(2).await.unwrap().len(), 2);
        assert_eq!(repo.count().await.unwrap(), 3);
    }
}
