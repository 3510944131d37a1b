//! Persistence seams used by the alerting core.
//!
//! The Postgres implementations live in `crate::db`; `memory` holds an
//! in-process backend used when no `DATABASE_URL` is configured and by tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::models::{
        NewNotification, Notification, Principal, Reading, SensorType, ThresholdConfig,
        ThresholdRecord,
    },
    error::StorageError,
};

#[async_trait]
pub trait ReadingRepository: Send + Sync {
    async fn insert(
        &self,
        sensor_type: SensorType,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Reading, StorageError>;

    /// Latest readings, newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<Reading>, StorageError>;

    async fn count(&self) -> Result<i64, StorageError>;
}

#[async_trait]
pub trait ThresholdRepository: Send + Sync {
    /// Return the newest record, inserting `default` first if the table is
    /// empty. Must never create two defaults under concurrent callers.
    async fn latest_or_insert_default(
        &self,
        default: &ThresholdConfig,
    ) -> Result<ThresholdRecord, StorageError>;

    async fn insert(
        &self,
        config: &ThresholdConfig,
        updated_by: Option<Uuid>,
    ) -> Result<ThresholdRecord, StorageError>;

    /// Past configurations, newest first.
    async fn history(&self, limit: i64) -> Result<Vec<ThresholdRecord>, StorageError>;

    async fn count(&self) -> Result<i64, StorageError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: NewNotification) -> Result<Notification, StorageError>;

    /// All notifications addressed to `recipient_id`, newest first.
    async fn list_for_recipient(&self, recipient_id: Uuid)
        -> Result<Vec<Notification>, StorageError>;

    async fn count(&self) -> Result<i64, StorageError>;
}

/// Reachability of the backend behind the repositories.
#[async_trait]
pub trait StorageHealth: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StorageError>;
}

/// Read-only view of the accounts owned by the identity service.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Principal>, StorageError>;

    /// The earliest-created principal holding the admin role.
    async fn first_admin(&self) -> Result<Option<Principal>, StorageError>;
}
