use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    NotificationRepository, PrincipalDirectory, ReadingRepository, StorageHealth,
    ThresholdRepository,
};
use crate::{
    db::models::{
        NewNotification, Notification, Principal, Reading, Role, SensorType, ThresholdConfig,
        ThresholdRecord,
    },
    error::StorageError,
};

fn unavailable(what: &str) -> StorageError {
    StorageError::Unavailable(format!("in-memory {what} store is offline"))
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Append-only reading log.
///
/// `fail_sensor` makes inserts for one sensor type fail, which lets callers
/// exercise partial-failure handling without a real backend.
#[derive(Clone, Default)]
pub struct MemoryReadings {
    rows: Arc<RwLock<Vec<Reading>>>,
    failing: Arc<RwLock<HashSet<SensorType>>>,
}

impl MemoryReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_sensor(&self, sensor_type: SensorType) {
        self.failing.write().await.insert(sensor_type);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl ReadingRepository for MemoryReadings {
    async fn insert(
        &self,
        sensor_type: SensorType,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Reading, StorageError> {
        if self.failing.read().await.contains(&sensor_type) {
            return Err(unavailable("reading"));
        }
        let reading = Reading { id: Uuid::new_v4(), sensor_type, value, recorded_at };
        self.rows.write().await.push(reading.clone());
        Ok(reading)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        let rows = self.rows.read().await;
        // Reverse first so equal timestamps keep newest-inserted first.
        let mut out: Vec<Reading> = rows.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn count(&self) -> Result<i64, StorageError> {
        Ok(self.rows.read().await.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryThresholds {
    // A Mutex rather than a RwLock: check-then-insert must be one critical section.
    records: Arc<Mutex<Vec<ThresholdRecord>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(unavailable("threshold"))
        } else {
            Ok(())
        }
    }
}

fn new_record(config: &ThresholdConfig, updated_by: Option<Uuid>) -> ThresholdRecord {
    ThresholdRecord {
        id: Uuid::new_v4(),
        config: *config,
        updated_by,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl ThresholdRepository for MemoryThresholds {
    async fn latest_or_insert_default(
        &self,
        default: &ThresholdConfig,
    ) -> Result<ThresholdRecord, StorageError> {
        self.check_online()?;
        let mut records = self.records.lock().await;
        if let Some(latest) = records.last() {
            return Ok(latest.clone());
        }
        let record = new_record(default, None);
        records.push(record.clone());
        Ok(record)
    }

    async fn insert(
        &self,
        config: &ThresholdConfig,
        updated_by: Option<Uuid>,
    ) -> Result<ThresholdRecord, StorageError> {
        self.check_online()?;
        let record = new_record(config, updated_by);
        self.records.lock().await.push(record.clone());
        Ok(record)
    }

    async fn history(&self, limit: i64) -> Result<Vec<ThresholdRecord>, StorageError> {
        self.check_online()?;
        let records = self.records.lock().await;
        Ok(records.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn count(&self) -> Result<i64, StorageError> {
        self.check_online()?;
        Ok(self.records.lock().await.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryNotifications {
    rows: Arc<RwLock<Vec<Notification>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotifications {
    async fn insert(&self, n: NewNotification) -> Result<Notification, StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(unavailable("notification"));
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            sensor_type: n.sensor_type,
            severity: n.severity,
            message: n.message,
            value: n.value,
            recorded_at: n.recorded_at,
            recipient_id: n.recipient_id,
        };
        self.rows.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, StorageError> {
        let rows = self.rows.read().await;
        let mut out: Vec<Notification> = rows
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(out)
    }

    async fn count(&self) -> Result<i64, StorageError> {
        Ok(self.rows.read().await.len() as i64)
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Always reachable unless switched offline.
#[derive(Clone, Default)]
pub struct MemoryHealth {
    offline: Arc<AtomicBool>,
}

impl MemoryHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageHealth for MemoryHealth {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(unavailable("health"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

/// Principals in registration order.
#[derive(Clone, Default)]
pub struct MemoryPrincipals {
    rows: Arc<RwLock<Vec<Principal>>>,
}

impl MemoryPrincipals {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, principal: Principal) {
        self.rows.write().await.push(principal);
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryPrincipals {
    async fn find(&self, id: Uuid) -> Result<Option<Principal>, StorageError> {
        Ok(self.rows.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn first_admin(&self) -> Result<Option<Principal>, StorageError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|p| p.role == Role::Admin)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::models::Severity;

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let repo = MemoryReadings::new();
        let now = Utc::now();
        repo.insert(SensorType::Gas, 1.0, now - Duration::seconds(20)).await.unwrap();
        repo.insert(SensorType::Gas, 2.0, now).await.unwrap();
        repo.insert(SensorType::Gas, 3.0, now - Duration::seconds(10)).await.unwrap();

        let recent = repo.recent(2).await.unwrap();
        let values: Vec<f64> = recent.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn failing_sensor_only_affects_that_type() {
        let repo = MemoryReadings::new();
        repo.fail_sensor(SensorType::Sound).await;

        assert!(repo.insert(SensorType::Sound, 10.0, Utc::now()).await.is_err());
        assert!(repo.insert(SensorType::Gas, 10.0, Utc::now()).await.is_ok());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_first_access_creates_one_default() {
        let repo = MemoryThresholds::new();
        let default = ThresholdConfig::default();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.latest_or_insert_default(&default).await.unwrap() })
            })
            .collect();

        let mut ids = HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap().id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn notifications_are_filtered_by_recipient() {
        let repo = MemoryNotifications::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for recipient_id in [alice, bob, alice] {
            repo.insert(NewNotification {
                sensor_type: SensorType::Gas,
                severity: Severity::Warning,
                message: "gas elevated: 500".into(),
                value: 500.0,
                recorded_at: Utc::now(),
                recipient_id,
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.list_for_recipient(alice).await.unwrap().len(), 2);
        assert_eq!(repo.list_for_recipient(bob).await.unwrap().len(), 1);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn health_follows_offline_switch() {
        let health = MemoryHealth::new();
        assert_eq!(health.backend(), "memory");
        assert!(health.ping().await.is_ok());

        health.set_offline(true);
        assert!(health.ping().await.is_err());
    }

    #[tokio::test]
    async fn first_admin_follows_registration_order() {
        let dir = MemoryPrincipals::new();
        let first = Uuid::new_v4();
        dir.add(Principal { id: Uuid::new_v4(), email: None, role: Role::User }).await;
        dir.add(Principal { id: first, email: None, role: Role::Admin }).await;
        dir.add(Principal { id: Uuid::new_v4(), email: None, role: Role::Admin }).await;

        assert_eq!(dir.first_admin().await.unwrap().unwrap().id, first);
    }
}
