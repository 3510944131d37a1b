use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::{
    alerts::classify,
    db::models::{Reading, SensorType, Severity},
    error::{CoreError, ValidationError},
    storage::ReadingRepository,
    thresholds::ThresholdStore,
};

/// A stored reading and the severity it was classified at.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub reading: Reading,
    pub severity: Severity,
}

/// Outcome of a multi-sensor payload. Failed items do not affect the others.
#[derive(Debug, Default)]
pub struct BatchIngest {
    pub ingested: Vec<Ingested>,
    pub failures: Vec<(SensorType, CoreError)>,
}

/// The single ingestion path for readings from MQTT and the HTTP API.
pub struct ReadingIngestor {
    readings: Arc<dyn ReadingRepository>,
    thresholds: Arc<ThresholdStore>,
}

impl ReadingIngestor {
    pub fn new(readings: Arc<dyn ReadingRepository>, thresholds: Arc<ThresholdStore>) -> Self {
        Self { readings, thresholds }
    }

    /// Persist one reading, then classify it against the active thresholds.
    ///
    /// The reading is stored before classification so a threshold lookup
    /// failure never loses captured data.
    pub async fn ingest(
        &self,
        sensor_type: SensorType,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Ingested, CoreError> {
        if !value.is_finite() {
            return Err(ValidationError::single("value", "must be a finite number").into());
        }

        let recorded_at = timestamp.unwrap_or_else(Utc::now);
        let reading = self.readings.insert(sensor_type, value, recorded_at).await?;

        let active = self.thresholds.get_active().await?;
        let severity = classify(sensor_type, value, &active.config);
        debug!(
            reading_id = %reading.id,
            sensor_type = %sensor_type,
            value,
            severity = %severity,
            "Reading ingested"
        );

        Ok(Ingested { reading, severity })
    }

    /// Ingest every item independently. Errors are logged and collected.
    pub async fn ingest_batch(
        &self,
        items: &[(SensorType, f64)],
        timestamp: Option<DateTime<Utc>>,
    ) -> BatchIngest {
        // One arrival time for the whole payload.
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let mut out = BatchIngest::default();

        for &(sensor_type, value) in items {
            match self.ingest(sensor_type, value, Some(timestamp)).await {
                Ok(ingested) => out.ingested.push(ingested),
                Err(e) => {
                    error!(sensor_type = %sensor_type, value, error = %e, "Failed to ingest reading");
                    out.failures.push((sensor_type, e));
                }
            }
        }

        out
    }

    /// Latest stored readings, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Reading>, CoreError> {
        Ok(self.readings.recent(limit).await?)
    }
}
