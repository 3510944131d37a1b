//! Storage reachability and record counts for `/health` and `/admin/stats`.

use std::sync::Arc;

use tracing::warn;

use crate::{
    error::StorageError,
    storage::{NotificationRepository, ReadingRepository, StorageHealth, ThresholdRepository},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCounts {
    pub readings: i64,
    pub notifications: i64,
    pub threshold_configs: i64,
}

pub struct Diagnostics {
    health: Arc<dyn StorageHealth>,
    readings: Arc<dyn ReadingRepository>,
    notifications: Arc<dyn NotificationRepository>,
    thresholds: Arc<dyn ThresholdRepository>,
}

impl Diagnostics {
    pub fn new(
        health: Arc<dyn StorageHealth>,
        readings: Arc<dyn ReadingRepository>,
        notifications: Arc<dyn NotificationRepository>,
        thresholds: Arc<dyn ThresholdRepository>,
    ) -> Self {
        Self { health, readings, notifications, thresholds }
    }

    pub fn backend(&self) -> &'static str {
        self.health.backend()
    }

    pub async fn storage_reachable(&self) -> bool {
        match self.health.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.backend(), error = %e, "Storage health check failed");
                false
            }
        }
    }

    pub async fn counts(&self) -> Result<RecordCounts, StorageError> {
        let (readings, notifications, threshold_configs) = tokio::try_join!(
            self.readings.count(),
            self.notifications.count(),
            self.thresholds.count(),
        )?;
        Ok(RecordCounts { readings, notifications, threshold_configs })
    }
}
