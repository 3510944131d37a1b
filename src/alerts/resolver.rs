use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::Alert;
use crate::{db::models::Principal, error::StorageError, storage::PrincipalDirectory};

/// Decides who should be alerted about `alert`. `None` means nobody.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn resolve(&self, alert: &Alert) -> Result<Option<Principal>, StorageError>;
}

/// Alerts the authenticated API caller that submitted the reading.
pub struct CallerResolver {
    directory: Arc<dyn PrincipalDirectory>,
    caller: Uuid,
}

impl CallerResolver {
    pub fn new(directory: Arc<dyn PrincipalDirectory>, caller: Uuid) -> Self {
        Self { directory, caller }
    }
}

#[async_trait]
impl RecipientResolver for CallerResolver {
    async fn resolve(&self, _alert: &Alert) -> Result<Option<Principal>, StorageError> {
        self.directory.find(self.caller).await
    }
}

/// Device messages carry no principal; they go to one designated account.
///
/// With an explicit recipient configured that account must exist. Otherwise
/// the earliest-registered admin receives the alert.
pub struct FallbackResolver {
    directory: Arc<dyn PrincipalDirectory>,
    configured: Option<Uuid>,
}

impl FallbackResolver {
    pub fn new(directory: Arc<dyn PrincipalDirectory>, configured: Option<Uuid>) -> Self {
        Self { directory, configured }
    }
}

#[async_trait]
impl RecipientResolver for FallbackResolver {
    async fn resolve(&self, _alert: &Alert) -> Result<Option<Principal>, StorageError> {
        match self.configured {
            Some(id) => {
                let found = self.directory.find(id).await?;
                if found.is_none() {
                    warn!(recipient_id = %id, "Configured alert recipient does not exist");
                }
                Ok(found)
            }
            None => self.directory.first_admin().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        db::models::{Role, SensorType, Severity},
        storage::memory::MemoryPrincipals,
    };

    fn alert() -> Alert {
        Alert {
            sensor_type: SensorType::Gas,
            severity: Severity::Danger,
            value: 700.0,
            message: "gas too high: 700".into(),
            recorded_at: Utc::now(),
        }
    }

    async fn directory() -> (MemoryPrincipals, Principal, Principal) {
        let dir = MemoryPrincipals::new();
        let user = Principal { id: Uuid::new_v4(), email: Some("u@example.com".into()), role: Role::User };
        let admin = Principal { id: Uuid::new_v4(), email: Some("a@example.com".into()), role: Role::Admin };
        dir.add(user.clone()).await;
        dir.add(admin.clone()).await;
        (dir, user, admin)
    }

    #[tokio::test]
    async fn caller_resolver_finds_known_caller() {
        let (dir, user, _) = directory().await;
        let resolver = CallerResolver::new(Arc::new(dir), user.id);
        assert_eq!(resolver.resolve(&alert()).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn caller_resolver_unknown_caller_is_none() {
        let (dir, _, _) = directory().await;
        let resolver = CallerResolver::new(Arc::new(dir), Uuid::new_v4());
        assert_eq!(resolver.resolve(&alert()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fallback_defaults_to_first_admin() {
        let (dir, _, admin) = directory().await;
        let resolver = FallbackResolver::new(Arc::new(dir), None);
        assert_eq!(resolver.resolve(&alert()).await.unwrap(), Some(admin));
    }

    #[tokio::test]
    async fn fallback_prefers_configured_recipient() {
        let (dir, user, _) = directory().await;
        let resolver = FallbackResolver::new(Arc::new(dir), Some(user.id));
        assert_eq!(resolver.resolve(&alert()).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn fallback_with_missing_configured_recipient_is_none() {
        let (dir, _, _) = directory().await;
        let resolver = FallbackResolver::new(Arc::new(dir), Some(Uuid::new_v4()));
        assert_eq!(resolver.resolve(&alert()).await.unwrap(), None);
    }
}
