use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::{Ingested, ReadingIngestor};
use crate::{
    alerts::{classify, Alert, AlertDispatcher, DispatchResult, RecipientResolver},
    db::models::{Reading, SensorType, Severity},
    error::{CoreError, StorageError, ValidationError},
    thresholds::ThresholdStore,
};

/// A reading that went through the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub reading: Reading,
    pub severity: Severity,
    pub dispatch: DispatchResult,
}

/// A reading that was stored but whose notification could not be recorded.
#[derive(Debug)]
pub struct DispatchFailure {
    pub reading: Reading,
    pub severity: Severity,
    pub error: StorageError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<Processed>,
    /// Stored readings whose alert was lost.
    pub dispatch_failed: Vec<DispatchFailure>,
    /// Items that never reached storage.
    pub failures: Vec<(SensorType, CoreError)>,
}

impl BatchReport {
    /// Number of readings that reached the dispatcher with a non-normal severity.
    pub fn dispatch_attempts(&self) -> usize {
        self.processed.iter().filter(|p| p.severity.is_alert()).count()
            + self.dispatch_failed.len()
    }

    /// Number of readings persisted, whatever became of their alerts.
    pub fn stored(&self) -> usize {
        self.processed.len() + self.dispatch_failed.len()
    }
}

/// Ingest → classify → dispatch, shared by the MQTT subscriber and the API.
pub struct SensorService {
    ingestor: Arc<ReadingIngestor>,
    dispatcher: Arc<AlertDispatcher>,
    thresholds: Arc<ThresholdStore>,
}

impl SensorService {
    pub fn new(
        ingestor: Arc<ReadingIngestor>,
        dispatcher: Arc<AlertDispatcher>,
        thresholds: Arc<ThresholdStore>,
    ) -> Self {
        Self { ingestor, dispatcher, thresholds }
    }

    /// Store, classify and (if needed) dispatch a single reading.
    ///
    /// The reading stays stored even if recording the notification fails.
    pub async fn process(
        &self,
        sensor_type: SensorType,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
        resolver: &dyn RecipientResolver,
    ) -> Result<Processed, CoreError> {
        let ingested = self.ingestor.ingest(sensor_type, value, timestamp).await?;
        self.dispatch(ingested, resolver).await
    }

    /// Process every item of a multi-sensor payload independently.
    pub async fn process_batch(
        &self,
        items: &[(SensorType, f64)],
        timestamp: Option<DateTime<Utc>>,
        resolver: &dyn RecipientResolver,
    ) -> BatchReport {
        let batch = self.ingestor.ingest_batch(items, timestamp).await;
        let mut report = BatchReport { failures: batch.failures, ..BatchReport::default() };

        for Ingested { reading, severity } in batch.ingested {
            match self.dispatcher.dispatch(&reading, severity, resolver).await {
                Ok(dispatch) => report.processed.push(Processed { reading, severity, dispatch }),
                Err(e) => {
                    error!(
                        reading_id = %reading.id,
                        sensor_type = %reading.sensor_type,
                        error = %e,
                        "Reading stored but alert could not be recorded"
                    );
                    report.dispatch_failed.push(DispatchFailure {
                        reading,
                        severity,
                        error: e,
                    });
                }
            }
        }

        info!(
            stored = report.stored(),
            alerts = report.dispatch_attempts(),
            failed = report.failures.len(),
            "Sensor batch processed"
        );
        report
    }

    /// Legacy pre-classified alert: the classifier is bypassed and no reading
    /// is stored.
    pub async fn process_alert(
        &self,
        alert: Alert,
        resolver: &dyn RecipientResolver,
    ) -> Result<DispatchResult, CoreError> {
        if !alert.value.is_finite() {
            return Err(ValidationError::single("value", "must be a finite number").into());
        }
        Ok(self.dispatcher.dispatch_alert(alert, resolver).await?)
    }

    /// Client-reported alert. The reported status is only a hint: severity is
    /// re-derived from the active thresholds before anything is recorded.
    pub async fn process_reported(
        &self,
        sensor_type: SensorType,
        reported: Severity,
        message: String,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
        resolver: &dyn RecipientResolver,
    ) -> Result<DispatchResult, CoreError> {
        if !value.is_finite() {
            return Err(ValidationError::single("value", "must be a finite number").into());
        }

        let active = self.thresholds.get_active().await?;
        let severity = classify(sensor_type, value, &active.config);
        if severity != reported {
            warn!(
                sensor_type = %sensor_type,
                value,
                reported = %reported,
                derived = %severity,
                "Reported status disagrees with thresholds; using derived severity"
            );
        }

        let alert = Alert {
            sensor_type,
            severity,
            value,
            message,
            recorded_at: timestamp.unwrap_or_else(Utc::now),
        };
        Ok(self.dispatcher.dispatch_alert(alert, resolver).await?)
    }

    /// Latest stored readings, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Reading>, CoreError> {
        self.ingestor.recent(limit).await
    }

    async fn dispatch(
        &self,
        ingested: Ingested,
        resolver: &dyn RecipientResolver,
    ) -> Result<Processed, CoreError> {
        let Ingested { reading, severity } = ingested;
        let dispatch = self.dispatcher.dispatch(&reading, severity, resolver).await?;
        Ok(Processed { reading, severity, dispatch })
    }
}
