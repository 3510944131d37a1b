use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use super::models::{ThresholdConfig, ThresholdLevels, ThresholdRecord};
use crate::{error::StorageError, storage::ThresholdRepository};

/// Advisory lock key serialising default creation across connections.
const DEFAULT_CONFIG_LOCK: i64 = 0x7468_7265_7368;

const COLUMNS: &str = "id, gas_normal_max, gas_warning_max, gas_danger_max, \
     temp_normal_max, temp_warning_max, temp_danger_max, \
     sound_normal_max, sound_warning_max, sound_danger_max, \
     updated_by, created_at";

#[derive(Debug, FromRow)]
struct ThresholdRow {
    id: Uuid,
    gas_normal_max: f64,
    gas_warning_max: f64,
    gas_danger_max: f64,
    temp_normal_max: f64,
    temp_warning_max: f64,
    temp_danger_max: f64,
    sound_normal_max: f64,
    sound_warning_max: f64,
    sound_danger_max: f64,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<ThresholdRow> for ThresholdRecord {
    fn from(r: ThresholdRow) -> Self {
        Self {
            id: r.id,
            config: ThresholdConfig {
                gas: ThresholdLevels::new(r.gas_normal_max, r.gas_warning_max, r.gas_danger_max),
                temperature: ThresholdLevels::new(
                    r.temp_normal_max,
                    r.temp_warning_max,
                    r.temp_danger_max,
                ),
                sound: ThresholdLevels::new(
                    r.sound_normal_max,
                    r.sound_warning_max,
                    r.sound_danger_max,
                ),
            },
            updated_by: r.updated_by,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgThresholds {
    pool: PgPool,
}

impl PgThresholds {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_config<'e, E: PgExecutor<'e>>(
    executor: E,
    config: &ThresholdConfig,
    updated_by: Option<Uuid>,
) -> Result<ThresholdRecord, StorageError> {
    let sql = format!(
        "INSERT INTO threshold_configs ( \
             id, gas_normal_max, gas_warning_max, gas_danger_max, \
             temp_normal_max, temp_warning_max, temp_danger_max, \
             sound_normal_max, sound_warning_max, sound_danger_max, updated_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, ThresholdRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(config.gas.normal_max)
        .bind(config.gas.warning_max)
        .bind(config.gas.danger_max)
        .bind(config.temperature.normal_max)
        .bind(config.temperature.warning_max)
        .bind(config.temperature.danger_max)
        .bind(config.sound.normal_max)
        .bind(config.sound.warning_max)
        .bind(config.sound.danger_max)
        .bind(updated_by)
        .fetch_one(executor)
        .await?;

    Ok(row.into())
}

#[async_trait]
impl ThresholdRepository for PgThresholds {
    async fn latest_or_insert_default(
        &self,
        default: &ThresholdConfig,
    ) -> Result<ThresholdRecord, StorageError> {
        let mut tx = self.pool.begin().await?;

        // Released automatically at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(DEFAULT_CONFIG_LOCK)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT {COLUMNS} FROM threshold_configs \
             ORDER BY created_at DESC, revision DESC LIMIT 1"
        );
        let existing = sqlx::query_as::<_, ThresholdRow>(&sql)
            .fetch_optional(&mut *tx)
            .await?;

        let record = match existing {
            Some(row) => row.into(),
            None => insert_config(&mut *tx, default, None).await?,
        };

        tx.commit().await?;
        Ok(record)
    }

    async fn insert(
        &self,
        config: &ThresholdConfig,
        updated_by: Option<Uuid>,
    ) -> Result<ThresholdRecord, StorageError> {
        insert_config(&self.pool, config, updated_by).await
    }

    async fn history(&self, limit: i64) -> Result<Vec<ThresholdRecord>, StorageError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM threshold_configs \
             ORDER BY created_at DESC, revision DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, ThresholdRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM threshold_configs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
