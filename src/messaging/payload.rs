//! Decoding of device messages.
//!
//! Two shapes are accepted on the sensor topic:
//!
//! - batch: `{"gas": 412, "temperature": 24.5, "sound": 61}`; keys are
//!   case-insensitive, `mq2` is the gas sensor's firmware name, and an
//!   optional `timestamp` (RFC 3339 or Unix milliseconds) applies to all.
//! - legacy alert: `{"type": "gas", "status": "dangerous", "message": "...", "value": 700}`,
//!   already classified by the device.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    alerts::{message::alert_text, Alert},
    db::models::{SensorType, Severity},
    error::ValidationError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SensorMessage {
    Batch(BatchPayload),
    Alert(Alert),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPayload {
    pub items: Vec<(SensorType, f64)>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Fields that were dropped; the remaining items are still processed.
    pub rejected: ValidationError,
}

impl BatchPayload {
    /// Decode a batch from an already-parsed JSON body.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => parse_batch(map),
            _ => Err(ValidationError::single("payload", "must be a JSON object")),
        }
    }
}

impl SensorMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::single("payload", format!("invalid JSON: {e}")))?;
        let Value::Object(map) = value else {
            return Err(ValidationError::single("payload", "must be a JSON object"));
        };

        if map.contains_key("type") && map.contains_key("status") {
            parse_alert(&map).map(SensorMessage::Alert)
        } else {
            parse_batch(&map).map(SensorMessage::Batch)
        }
    }
}

/// Map a batch key to its sensor type.
fn sensor_for_key(key: &str) -> Option<SensorType> {
    match key.to_ascii_lowercase().as_str() {
        "gas" | "mq2" => Some(SensorType::Gas),
        "temperature" => Some(SensorType::Temperature),
        "sound" => Some(SensorType::Sound),
        _ => None,
    }
}

/// Numbers, or strings holding a number (some firmware sends `"24.5"`).
pub(crate) fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

pub(crate) fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_batch(map: &Map<String, Value>) -> Result<BatchPayload, ValidationError> {
    let mut items: Vec<(SensorType, f64)> = Vec::new();
    let mut rejected = ValidationError::new();
    let mut ts = None;

    for (key, raw) in map {
        if key.eq_ignore_ascii_case("timestamp") {
            ts = timestamp(raw);
            if ts.is_none() {
                rejected.push(key.as_str(), "must be an RFC 3339 string or Unix milliseconds");
            }
            continue;
        }
        let Some(sensor_type) = sensor_for_key(key) else {
            debug!(key = %key, "Ignoring unknown key in sensor payload");
            continue;
        };
        if items.iter().any(|(t, _)| *t == sensor_type) {
            rejected.push(key.as_str(), format!("duplicate value for {sensor_type}"));
            continue;
        }
        match number(raw) {
            Some(v) => items.push((sensor_type, v)),
            None => rejected.push(key.as_str(), "must be a number"),
        }
    }

    if items.is_empty() {
        if rejected.is_empty() {
            rejected.push("payload", "no gas, temperature or sound value present");
        }
        return Err(rejected);
    }

    Ok(BatchPayload { items, timestamp: ts, rejected })
}

fn parse_alert(map: &Map<String, Value>) -> Result<Alert, ValidationError> {
    let mut err = ValidationError::new();

    let sensor_type = match map.get("type").and_then(Value::as_str) {
        Some(s) => s.parse::<SensorType>().map_err(|e| err.violations.extend(e.violations)).ok(),
        None => {
            err.push("type", "must be a string");
            None
        }
    };
    let severity = match map.get("status").and_then(Value::as_str) {
        Some(s) => s.parse::<Severity>().map_err(|e| err.violations.extend(e.violations)).ok(),
        None => {
            err.push("status", "must be a string");
            None
        }
    };
    let value = map.get("value").and_then(number);
    if value.is_none() {
        err.push("value", "must be a number");
    }
    let recorded_at = match map.get("timestamp") {
        None | Some(Value::Null) => Some(Utc::now()),
        Some(raw) => {
            let parsed = timestamp(raw);
            if parsed.is_none() {
                err.push("timestamp", "must be an RFC 3339 string or Unix milliseconds");
            }
            parsed
        }
    };

    match (sensor_type, severity, value, recorded_at) {
        (Some(sensor_type), Some(severity), Some(value), Some(recorded_at)) if err.is_empty() => {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| alert_text(sensor_type, severity, value));
            Ok(Alert { sensor_type, severity, value, message, recorded_at })
        }
        _ => Err(err),
    }
}
