//! The active threshold configuration.
//!
//! Configurations are immutable records; "replacing" inserts a new record
//! that becomes active. Readers always get one fully-formed record.
//!
//! The active record is cached and re-read from storage once it is older than
//! the refresh interval, so a replace made by another instance sharing the
//! database takes effect here within that interval.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::models::{SensorType, ThresholdConfig, ThresholdRecord},
    error::{CoreError, StorageError, ValidationError},
    storage::ThresholdRepository,
};

// ---------------------------------------------------------------------------
// Field naming
// ---------------------------------------------------------------------------

/// One of the three cut points of a sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Normal,
    Warning,
    Danger,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Normal, Level::Warning, Level::Danger];
}

/// Wire name of a threshold field, e.g. `gasThreshold` or `tempDangerThreshold`.
pub fn field_name(sensor_type: SensorType, level: Level) -> String {
    let suffix = match level {
        Level::Normal => "Threshold",
        Level::Warning => "WarningThreshold",
        Level::Danger => "DangerThreshold",
    };
    format!("{}{suffix}", sensor_type.field_prefix())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check every cut point of `config`, collecting all violations.
///
/// Each sensor type needs finite values with
/// `normal_max < warning_max < danger_max`.
pub fn validate(config: &ThresholdConfig) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();

    for sensor_type in SensorType::ALL {
        let levels = config.levels(sensor_type);
        let values = [levels.normal_max, levels.warning_max, levels.danger_max];

        let mut all_finite = true;
        for (level, value) in Level::ALL.into_iter().zip(values) {
            if !value.is_finite() {
                all_finite = false;
                err.push(field_name(sensor_type, level), "must be a finite number");
            }
        }
        if !all_finite {
            continue;
        }

        if levels.normal_max >= levels.warning_max {
            err.push(
                field_name(sensor_type, Level::Warning),
                format!(
                    "must be greater than {} ({})",
                    field_name(sensor_type, Level::Normal),
                    levels.normal_max
                ),
            );
        }
        if levels.warning_max >= levels.danger_max {
            err.push(
                field_name(sensor_type, Level::Danger),
                format!(
                    "must be greater than {} ({})",
                    field_name(sensor_type, Level::Warning),
                    levels.warning_max
                ),
            );
        }
    }

    err.into_result()
}

// ---------------------------------------------------------------------------
// ThresholdStore
// ---------------------------------------------------------------------------

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(30);

struct Snapshot {
    record: Arc<ThresholdRecord>,
    loaded_at: Instant,
}

impl Snapshot {
    fn new(record: Arc<ThresholdRecord>) -> Self {
        Self { record, loaded_at: Instant::now() }
    }
}

pub struct ThresholdStore {
    repo: Arc<dyn ThresholdRepository>,
    /// `None` until first loaded.
    active: RwLock<Option<Snapshot>>,
    refresh: Duration,
}

impl ThresholdStore {
    pub fn new(repo: Arc<dyn ThresholdRepository>) -> Self {
        Self::with_refresh(repo, DEFAULT_REFRESH)
    }

    /// A zero `refresh` re-reads storage on every call.
    pub fn with_refresh(repo: Arc<dyn ThresholdRepository>, refresh: Duration) -> Self {
        Self { repo, active: RwLock::new(None), refresh }
    }

    fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        snapshot.loaded_at.elapsed() < self.refresh
    }

    /// The active configuration, creating the built-in default on first access.
    ///
    /// If a refresh fails after the first load, the cached record is served.
    pub async fn get_active(&self) -> Result<Arc<ThresholdRecord>, StorageError> {
        if let Some(snapshot) = self.active.read().await.as_ref() {
            if self.is_fresh(snapshot) {
                return Ok(Arc::clone(&snapshot.record));
            }
        }

        let mut guard = self.active.write().await;
        // Another task may have reloaded it while we waited for the write lock.
        if let Some(snapshot) = guard.as_ref() {
            if self.is_fresh(snapshot) {
                return Ok(Arc::clone(&snapshot.record));
            }
        }

        match self.repo.latest_or_insert_default(&ThresholdConfig::default()).await {
            Ok(record) => {
                let record = Arc::new(record);
                if guard.as_ref().map_or(true, |s| s.record.id != record.id) {
                    info!(
                        threshold_id = %record.id,
                        created_at = %record.created_at,
                        "Loaded active threshold configuration"
                    );
                }
                *guard = Some(Snapshot::new(Arc::clone(&record)));
                Ok(record)
            }
            Err(e) => match guard.as_mut() {
                Some(snapshot) => {
                    warn!(
                        threshold_id = %snapshot.record.id,
                        error = %e,
                        "Threshold refresh failed; serving cached configuration"
                    );
                    snapshot.loaded_at = Instant::now();
                    Ok(Arc::clone(&snapshot.record))
                }
                None => Err(e),
            },
        }
    }

    /// Validate `candidate` and, if every constraint holds, persist it as the
    /// new active configuration. On any violation nothing is written.
    pub async fn replace(
        &self,
        candidate: ThresholdConfig,
        updated_by: Uuid,
    ) -> Result<Arc<ThresholdRecord>, CoreError> {
        if let Err(err) = validate(&candidate) {
            warn!(updated_by = %updated_by, error = %err, "Rejected threshold update");
            return Err(err.into());
        }

        // Held across the insert so two concurrent replaces cannot leave the
        // snapshot pointing at the older record.
        let mut guard = self.active.write().await;
        let record = Arc::new(self.repo.insert(&candidate, Some(updated_by)).await?);
        info!(
            threshold_id = %record.id,
            updated_by = %updated_by,
            "Threshold configuration replaced"
        );
        *guard = Some(Snapshot::new(Arc::clone(&record)));
        Ok(record)
    }

    /// Past configurations, newest first.
    pub async fn history(&self, limit: i64) -> Result<Vec<ThresholdRecord>, StorageError> {
        self.repo.history(limit).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
