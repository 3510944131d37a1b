use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    alerts::{AlertDispatcher, FallbackResolver},
    api::auth::JwtConfig,
    config::Config,
    db::{PgHealth, PgNotifications, PgPrincipals, PgReadings, PgThresholds},
    diagnostics::Diagnostics,
    messaging::MqttLink,
    notifications::NotificationStore,
    notifier::{LogOnlyNotifier, Notifier, RetryingNotifier, SmtpNotifier},
    payload_archive::PayloadArchive,
    sensors::{ReadingIngestor, SensorService},
    storage::{
        memory::{
            MemoryHealth, MemoryNotifications, MemoryPrincipals, MemoryReadings, MemoryThresholds,
        },
        NotificationRepository, PrincipalDirectory, ReadingRepository, StorageHealth,
        ThresholdRepository,
    },
    thresholds::ThresholdStore,
};

/// One backend for each storage seam.
#[derive(Clone)]
pub struct Repositories {
    pub readings: Arc<dyn ReadingRepository>,
    pub thresholds: Arc<dyn ThresholdRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub directory: Arc<dyn PrincipalDirectory>,
    pub health: Arc<dyn StorageHealth>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            readings: Arc::new(PgReadings::new(pool.clone())),
            thresholds: Arc::new(PgThresholds::new(pool.clone())),
            notifications: Arc::new(PgNotifications::new(pool.clone())),
            directory: Arc::new(PgPrincipals::new(pool.clone())),
            health: Arc::new(PgHealth::new(pool)),
        }
    }

    /// Process-local storage. Nothing survives a restart and the principal
    /// directory starts empty.
    pub fn in_memory() -> Self {
        Self {
            readings: Arc::new(MemoryReadings::new()),
            thresholds: Arc::new(MemoryThresholds::new()),
            notifications: Arc::new(MemoryNotifications::new()),
            directory: Arc::new(MemoryPrincipals::new()),
            health: Arc::new(MemoryHealth::new()),
        }
    }
}

/// Shared application state for the HTTP handlers and the MQTT subscriber.
///
/// Cheap to clone; every component sits behind an `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub thresholds: Arc<ThresholdStore>,
    pub sensors: Arc<SensorService>,
    pub notifications: Arc<NotificationStore>,
    pub directory: Arc<dyn PrincipalDirectory>,
    /// Recipient strategy for device-originated alerts.
    pub fallback: Arc<FallbackResolver>,
    pub archive: PayloadArchive,
    pub jwt: JwtConfig,
    pub diagnostics: Arc<Diagnostics>,
    /// Broker connection state; stays `Disabled` when no broker is configured.
    pub mqtt: MqttLink,
}

impl AppContext {
    pub fn new(
        repos: Repositories,
        notifier: Arc<dyn Notifier>,
        jwt: JwtConfig,
        alert_recipient_id: Option<Uuid>,
        archive: PayloadArchive,
        threshold_refresh: Duration,
    ) -> Self {
        let diagnostics = Arc::new(Diagnostics::new(
            repos.health,
            Arc::clone(&repos.readings),
            Arc::clone(&repos.notifications),
            Arc::clone(&repos.thresholds),
        ));
        let thresholds = Arc::new(ThresholdStore::with_refresh(repos.thresholds, threshold_refresh));
        let notifications = Arc::new(NotificationStore::new(repos.notifications));
        let ingestor = Arc::new(ReadingIngestor::new(repos.readings, Arc::clone(&thresholds)));
        let dispatcher = Arc::new(AlertDispatcher::new(Arc::clone(&notifications), notifier));
        let sensors = Arc::new(SensorService::new(ingestor, dispatcher, Arc::clone(&thresholds)));
        let fallback = Arc::new(FallbackResolver::new(
            Arc::clone(&repos.directory),
            alert_recipient_id,
        ));

        Self {
            thresholds,
            sensors,
            notifications,
            directory: repos.directory,
            fallback,
            archive,
            jwt,
            diagnostics,
            mqtt: MqttLink::default(),
        }
    }

    /// Wire everything from the loaded configuration.
    pub fn from_config(config: &Config, repos: Repositories) -> Result<Self> {
        Ok(Self::new(
            repos,
            build_notifier(config)?,
            JwtConfig::new(&config.jwt_secret),
            config.alert_recipient_id,
            PayloadArchive::new(&config.rejected_payload_dir)
                .with_max_files(config.rejected_payload_max_files),
            config.threshold_refresh,
        ))
    }
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match &config.email {
        Some(email) => {
            let smtp = SmtpNotifier::new(email)
                .with_context(|| format!("invalid SMTP relay {:?}", email.smtp_host))?;
            info!(
                smtp_host = %email.smtp_host,
                smtp_port = email.smtp_port,
                max_attempts = config.email_retry.max_attempts,
                "Alert emails enabled"
            );
            Ok(Arc::new(RetryingNotifier::new(smtp, config.email_retry)))
        }
        None => {
            info!("SMTP_HOST not set; alert emails will only be logged");
            Ok(Arc::new(LogOnlyNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_context_serves_default_thresholds() {
        let config = Config::from_lookup(|key| (key == "JWT_SECRET").then(|| "s".to_owned()))
            .unwrap();
        let ctx = AppContext::from_config(&config, Repositories::in_memory()).unwrap();

        let active = ctx.thresholds.get_active().await.unwrap();
        assert_eq!(active.config, crate::db::models::ThresholdConfig::default());
        assert!(ctx.sensors.recent(10).await.unwrap().is_empty());
        assert_eq!(ctx.diagnostics.backend(), "memory");
        assert_eq!(ctx.mqtt.state(), crate::messaging::LinkState::Disabled);
    }
}
