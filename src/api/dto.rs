//! Wire types for the HTTP API.
//!
//! Request bodies are taken as raw JSON and decoded here so that every bad
//! field is reported at once instead of failing on the first one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    alerts::{DispatchResult, EmailStatus},
    diagnostics::RecordCounts,
    db::models::{Notification, Reading, SensorType, Severity, ThresholdConfig, ThresholdRecord},
    error::{FieldViolation, ValidationError},
    messaging::payload::timestamp,
    sensors::{DispatchFailure, Processed},
    thresholds::{field_name, Level},
};

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn object<'a>(body: &'a Value) -> Result<&'a Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::single("body", "must be a JSON object"))
}

fn finite_number(map: &Map<String, Value>, key: &str, err: &mut ValidationError) -> Option<f64> {
    match map.get(key) {
        None | Some(Value::Null) => {
            err.push(key, "is required");
            None
        }
        Some(v) => match v.as_f64().filter(|n| n.is_finite()) {
            Some(n) => Some(n),
            None => {
                err.push(key, "must be a number");
                None
            }
        },
    }
}

fn required_str<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    err: &mut ValidationError,
) -> Option<&'a str> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            err.push(key, "is required");
            None
        }
        Some(_) => {
            err.push(key, "must be a string");
            None
        }
    }
}

fn optional_timestamp(
    map: &Map<String, Value>,
    err: &mut ValidationError,
) -> Option<DateTime<Utc>> {
    match map.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let ts = timestamp(raw);
            if ts.is_none() {
                err.push("timestamp", "must be an RFC 3339 string or Unix milliseconds");
            }
            ts
        }
    }
}

fn parse_field<T>(raw: Option<&str>, err: &mut ValidationError) -> Option<T>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    match raw?.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            err.violations.extend(e.violations);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /sensors/readings`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReadingRequest {
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub value: f64,
    /// RFC 3339 or Unix milliseconds; defaults to the time of receipt.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReadingRequest {
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let map = object(body)?;
        let mut err = ValidationError::new();

        let sensor_type = parse_field::<SensorType>(required_str(map, "type", &mut err), &mut err);
        let value = finite_number(map, "value", &mut err);
        let timestamp = optional_timestamp(map, &mut err);

        match (sensor_type, value) {
            (Some(sensor_type), Some(value)) if err.is_empty() => {
                Ok(Self { sensor_type, value, timestamp })
            }
            _ => Err(err),
        }
    }
}

/// Body of `POST /sensors/notifications`: an alert computed by a client.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReportedAlertRequest {
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    /// `normal`, `warning` or `danger` (`dangerous` is accepted).
    pub status: Severity,
    pub message: String,
    pub value: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReportedAlertRequest {
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let map = object(body)?;
        let mut err = ValidationError::new();

        let sensor_type = parse_field::<SensorType>(required_str(map, "type", &mut err), &mut err);
        let status = parse_field::<Severity>(required_str(map, "status", &mut err), &mut err);
        let message = required_str(map, "message", &mut err).map(|m| m.trim().to_owned());
        let value = finite_number(map, "value", &mut err);
        let timestamp = optional_timestamp(map, &mut err);

        match (sensor_type, status, message, value) {
            (Some(sensor_type), Some(status), Some(message), Some(value)) if err.is_empty() => {
                Ok(Self { sensor_type, status, message, value, timestamp })
            }
            _ => Err(err),
        }
    }
}

/// Body of `POST /sensors/data`. Keys are case-insensitive; `mq2` is the
/// firmware name of the gas sensor. Numeric strings are accepted.
#[allow(dead_code)] // schema only; decoded by `BatchPayload::from_value`
#[derive(Debug, ToSchema)]
pub struct BatchRequest {
    pub gas: Option<f64>,
    pub mq2: Option<f64>,
    pub temperature: Option<f64>,
    pub sound: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The nine cut points under their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdValues {
    pub gas_threshold: f64,
    pub gas_warning_threshold: f64,
    pub gas_danger_threshold: f64,
    pub temp_threshold: f64,
    pub temp_warning_threshold: f64,
    pub temp_danger_threshold: f64,
    pub sound_threshold: f64,
    pub sound_warning_threshold: f64,
    pub sound_danger_threshold: f64,
}

/// Decode a full replacement configuration. All nine fields are required.
pub fn thresholds_from_json(body: &Value) -> Result<ThresholdConfig, ValidationError> {
    let map = object(body)?;
    let mut err = ValidationError::new();
    let mut config = ThresholdConfig::default();

    for sensor_type in SensorType::ALL {
        for level in Level::ALL {
            let key = field_name(sensor_type, level);
            if let Some(v) = finite_number(map, &key, &mut err) {
                let levels = config.levels_mut(sensor_type);
                match level {
                    Level::Normal => levels.normal_max = v,
                    Level::Warning => levels.warning_max = v,
                    Level::Danger => levels.danger_max = v,
                }
            }
        }
    }

    err.into_result().map(|()| config)
}

impl From<&ThresholdConfig> for ThresholdValues {
    fn from(c: &ThresholdConfig) -> Self {
        Self {
            gas_threshold: c.gas.normal_max,
            gas_warning_threshold: c.gas.warning_max,
            gas_danger_threshold: c.gas.danger_max,
            temp_threshold: c.temperature.normal_max,
            temp_warning_threshold: c.temperature.warning_max,
            temp_danger_threshold: c.temperature.danger_max,
            sound_threshold: c.sound.normal_max,
            sound_warning_threshold: c.sound.warning_max,
            sound_danger_threshold: c.sound.danger_max,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    /// Maximum number of entries to return.
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn resolve(&self, default: i64, max: i64) -> Result<i64, ValidationError> {
        match self.limit {
            None => Ok(default),
            Some(n) if (1..=max).contains(&n) => Ok(n),
            Some(_) => Err(ValidationError::single(
                "limit",
                format!("must be between 1 and {max}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self { id: r.id, sensor_type: r.sensor_type, value: r.value, timestamp: r.recorded_at }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub status: Severity,
    pub message: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Uuid,
}

impl From<Notification> for NotificationDto {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            sensor_type: n.sensor_type,
            status: n.severity,
            message: n.message,
            value: n.value,
            timestamp: n.recorded_at,
            user_id: n.recipient_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsDto {
    pub id: Uuid,
    #[serde(flatten)]
    pub values: ThresholdValues,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&ThresholdRecord> for ThresholdsDto {
    fn from(r: &ThresholdRecord) -> Self {
        Self {
            id: r.id,
            values: ThresholdValues::from(&r.config),
            updated_by: r.updated_by,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThresholdsUpdatedResponse {
    pub message: String,
    pub thresholds: ThresholdsDto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Normal severity; nothing recorded.
    Skipped,
    /// Nobody to alert; nothing recorded.
    NoRecipient,
    Sent,
    /// The reading is stored but its notification could not be recorded.
    StorageFailed,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DispatchDto {
    pub outcome: DispatchOutcome,
    pub notification: Option<NotificationDto>,
    pub email: Option<EmailStatus>,
}

impl From<DispatchResult> for DispatchDto {
    fn from(d: DispatchResult) -> Self {
        match d {
            DispatchResult::Skipped => Self {
                outcome: DispatchOutcome::Skipped,
                notification: None,
                email: None,
            },
            DispatchResult::NoRecipient => Self {
                outcome: DispatchOutcome::NoRecipient,
                notification: None,
                email: None,
            },
            DispatchResult::Sent { notification, email } => Self {
                outcome: DispatchOutcome::Sent,
                notification: Some(notification.into()),
                email: Some(email),
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub reading: ReadingDto,
    pub severity: Severity,
    pub dispatch: DispatchDto,
}

impl From<Processed> for IngestResponse {
    fn from(p: Processed) -> Self {
        Self { reading: p.reading.into(), severity: p.severity, dispatch: p.dispatch.into() }
    }
}

impl From<DispatchFailure> for IngestResponse {
    fn from(f: DispatchFailure) -> Self {
        Self {
            reading: f.reading.into(),
            severity: f.severity,
            dispatch: DispatchDto {
                outcome: DispatchOutcome::StorageFailed,
                notification: None,
                email: None,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub message: String,
    /// Every stored reading, including those whose alert was lost.
    pub results: Vec<IngestResponse>,
    /// Values that were dropped or never stored.
    pub rejected: Vec<FieldViolation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationCreatedResponse {
    pub message: String,
    pub notification: Option<NotificationDto>,
    pub email: Option<EmailStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    /// `postgres` or `memory`.
    pub storage: String,
    /// `connected` or `disconnected`.
    pub database: String,
    /// `connected`, `disconnected` or `disabled`.
    pub mqtt: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when storage or the broker is unreachable.
    pub status: String,
    pub version: String,
    pub services: ServiceStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub storage: String,
    pub readings: i64,
    pub notifications: i64,
    pub threshold_configs: i64,
}

impl StatsResponse {
    pub fn new(storage: &str, counts: RecordCounts) -> Self {
        Self {
            storage: storage.to_owned(),
            readings: counts.readings,
            notifications: counts.notifications,
            threshold_configs: counts.threshold_configs,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_thresholds() -> Value {
        json!({
            "gasThreshold": 300, "gasWarningThreshold": 450, "gasDangerThreshold": 600,
            "tempThreshold": 25, "tempWarningThreshold": 27, "tempDangerThreshold": 31,
            "soundThreshold": 60, "soundWarningThreshold": 80, "soundDangerThreshold": 100,
        })
    }

    #[test]
    fn thresholds_parse_all_nine_fields() {
        let cfg = thresholds_from_json(&full_thresholds()).unwrap();
        assert_eq!(cfg, ThresholdConfig::default());
    }

    #[test]
    fn thresholds_report_every_missing_or_bad_field() {
        let mut body = full_thresholds();
        let map = body.as_object_mut().unwrap();
        map.remove("tempDangerThreshold");
        map.insert("gasThreshold".into(), json!("300"));

        let err = thresholds_from_json(&body).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert!(err.mentions("tempDangerThreshold"));
        assert!(err.mentions("gasThreshold"));
    }

    #[test]
    fn threshold_values_serialize_with_legacy_names() {
        let v = serde_json::to_value(ThresholdValues::from(&ThresholdConfig::default())).unwrap();
        assert_eq!(v["gasThreshold"], 300.0);
        assert_eq!(v["tempWarningThreshold"], 27.0);
        assert_eq!(v["soundDangerThreshold"], 100.0);
    }

    #[test]
    fn reading_request_collects_violations() {
        let err = ReadingRequest::from_json(&json!({ "type": "humidity", "value": "hot" }))
            .unwrap_err();
        assert!(err.mentions("type"));
        assert!(err.mentions("value"));
    }

    #[test]
    fn reading_request_accepts_timestamp() {
        let req = ReadingRequest::from_json(&json!({
            "type": "Gas",
            "value": 412.5,
            "timestamp": "2025-03-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(req.sensor_type, SensorType::Gas);
        assert_eq!(req.value, 412.5);
        assert!(req.timestamp.is_some());
    }

    #[test]
    fn reported_alert_requires_message_and_valid_status() {
        let err = ReportedAlertRequest::from_json(&json!({
            "type": "gas",
            "status": "critical",
            "value": 700,
        }))
        .unwrap_err();
        assert!(err.mentions("status"));
        assert!(err.mentions("message"));
        assert!(!err.mentions("type"));
    }

    #[test]
    fn reported_alert_normalizes_dangerous() {
        let req = ReportedAlertRequest::from_json(&json!({
            "type": "gas",
            "status": "dangerous",
            "message": "leak",
            "value": 700,
        }))
        .unwrap();
        assert_eq!(req.status, Severity::Danger);
    }

    #[test]
    fn limit_defaults_and_bounds() {
        assert_eq!(LimitQuery { limit: None }.resolve(100, 1000).unwrap(), 100);
        assert_eq!(LimitQuery { limit: Some(5) }.resolve(100, 1000).unwrap(), 5);
        assert!(LimitQuery { limit: Some(0) }.resolve(100, 1000).is_err());
        assert!(LimitQuery { limit: Some(5000) }.resolve(100, 1000).is_err());
    }
}
