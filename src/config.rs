use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::notifier::{EmailConfig, RetryPolicy};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service on in-memory storage.
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    /// HS256 secret shared with the account service that issues tokens.
    pub jwt_secret: String,
    /// `None` disables the MQTT subscriber.
    pub mqtt: Option<MqttConfig>,
    /// `None` logs alert emails instead of sending them.
    pub email: Option<EmailConfig>,
    pub email_retry: RetryPolicy,
    /// Recipient of device-originated alerts; defaults to the earliest admin.
    pub alert_recipient_id: Option<Uuid>,
    /// How long the active threshold configuration is cached.
    pub threshold_refresh: Duration,
    pub rejected_payload_dir: PathBuf,
    /// Archived payloads kept per topic; older files are pruned.
    pub rejected_payload_max_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub client_id: String,
    /// Messages processed concurrently before intake waits.
    pub max_in_flight: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        let mqtt = match env.get("MQTT_HOST") {
            Some(host) => Some(MqttConfig {
                host,
                port: env.parse("MQTT_PORT", "1883")?,
                username: env.get("MQTT_USERNAME"),
                password: env.get("MQTT_PASSWORD"),
                topic: env.optional("MQTT_TOPIC", "esp32/sensors"),
                client_id: env.optional("MQTT_CLIENT_ID", "env-monitor"),
                max_in_flight: env.parse("MQTT_MAX_IN_FLIGHT", "32")?,
            }),
            None => None,
        };

        let email = match env.get("SMTP_HOST") {
            Some(smtp_host) => Some(EmailConfig {
                smtp_host,
                smtp_port: env.parse("SMTP_PORT", "587")?,
                from_address: env.optional("EMAIL_FROM", "alerts@env-monitor.local"),
                smtp_user: env.get("SMTP_USER"),
                smtp_password: env.get("SMTP_PASS"),
            }),
            None => None,
        };

        let alert_recipient_id = env
            .get("ALERT_RECIPIENT_ID")
            .map(|raw| {
                raw.parse::<Uuid>()
                    .with_context(|| format!("ALERT_RECIPIENT_ID must be a UUID, got {raw:?}"))
            })
            .transpose()?;

        Ok(Self {
            database_url: env.get("DATABASE_URL"),
            server_host: env.optional("SERVER_HOST", "0.0.0.0"),
            server_port: env.parse("SERVER_PORT", "3001")?,
            jwt_secret: env.required("JWT_SECRET")?,
            mqtt,
            email,
            email_retry: RetryPolicy {
                max_attempts: env.parse("EMAIL_MAX_ATTEMPTS", "3")?,
                base_delay: Duration::from_millis(env.parse("EMAIL_BACKOFF_MS", "1000")?),
            },
            alert_recipient_id,
            threshold_refresh: Duration::from_secs(env.parse("THRESHOLD_REFRESH_SECS", "30")?),
            rejected_payload_dir: PathBuf::from(env.optional("REJECTED_PAYLOAD_DIR", "rejected")),
            rejected_payload_max_files: env.parse("REJECTED_PAYLOAD_MAX_FILES", "1000")?,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("missing required env var: {key}"))
    }

    fn optional(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T>(&self, key: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw = self.optional(key, default);
        raw.parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = load(&[("JWT_SECRET", "s3cret")]).unwrap();

        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.server_host, "0.0.0.0");
        assert_eq!(cfg.server_port, 3001);
        assert!(cfg.mqtt.is_none());
        assert!(cfg.email.is_none());
        assert_eq!(cfg.email_retry, RetryPolicy::default());
        assert_eq!(cfg.alert_recipient_id, None);
        assert_eq!(cfg.threshold_refresh, Duration::from_secs(30));
        assert_eq!(cfg.rejected_payload_dir, PathBuf::from("rejected"));
        assert_eq!(cfg.rejected_payload_max_files, 1000);
    }

    #[test]
    fn intake_bounds_are_configurable() {
        let cfg = load(&[
            ("JWT_SECRET", "x"),
            ("MQTT_HOST", "broker.local"),
            ("MQTT_MAX_IN_FLIGHT", "4"),
            ("REJECTED_PAYLOAD_MAX_FILES", "50"),
            ("THRESHOLD_REFRESH_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(cfg.mqtt.unwrap().max_in_flight, 4);
        assert_eq!(cfg.rejected_payload_max_files, 50);
        assert_eq!(cfg.threshold_refresh, Duration::ZERO);
    }

    #[test]
    fn jwt_secret_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let err = load(&[("JWT_SECRET", "  ")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        let cfg = load(&[("JWT_SECRET", "x"), ("MQTT_HOST", ""), ("DATABASE_URL", "")]).unwrap();
        assert!(cfg.mqtt.is_none());
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn mqtt_section_with_defaults() {
        let cfg = load(&[("JWT_SECRET", "x"), ("MQTT_HOST", "broker.local")]).unwrap();
        assert_eq!(
            cfg.mqtt,
            Some(MqttConfig {
                host: "broker.local".into(),
                port: 1883,
                username: None,
                password: None,
                topic: "esp32/sensors".into(),
                client_id: "env-monitor".into(),
                max_in_flight: 32,
            })
        );
    }

    #[test]
    fn email_section_and_retry_policy() {
        let cfg = load(&[
            ("JWT_SECRET", "x"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "465"),
            ("SMTP_USER", "alerts"),
            ("SMTP_PASS", "pw"),
            ("EMAIL_MAX_ATTEMPTS", "5"),
            ("EMAIL_BACKOFF_MS", "250"),
        ])
        .unwrap();

        let email = cfg.email.unwrap();
        assert_eq!(email.smtp_host, "smtp.example.com");
        assert_eq!(email.smtp_port, 465);
        assert_eq!(email.from_address, "alerts@env-monitor.local");
        assert_eq!(email.smtp_user.as_deref(), Some("alerts"));
        assert_eq!(cfg.email_retry.max_attempts, 5);
        assert_eq!(cfg.email_retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn invalid_port_errors() {
        let err = load(&[("JWT_SECRET", "x"), ("SERVER_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn recipient_id_must_be_uuid() {
        let err = load(&[("JWT_SECRET", "x"), ("ALERT_RECIPIENT_ID", "admin")]).unwrap_err();
        assert!(err.to_string().contains("ALERT_RECIPIENT_ID"));

        let id = Uuid::new_v4();
        let raw = id.to_string();
        let cfg = load(&[("JWT_SECRET", "x"), ("ALERT_RECIPIENT_ID", raw.as_str())]).unwrap();
        assert_eq!(cfg.alert_recipient_id, Some(id));
    }
}
