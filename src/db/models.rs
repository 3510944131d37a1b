use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// SensorType
// ---------------------------------------------------------------------------

/// Mirrors the `sensor_type` Postgres enum.
///
/// Units: gas in ppm, temperature in °C, sound in dB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "sensor_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Gas,
    Temperature,
    Sound,
}

impl SensorType {
    pub const ALL: [SensorType; 3] = [SensorType::Gas, SensorType::Temperature, SensorType::Sound];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorType::Gas => "gas",
            SensorType::Temperature => "temperature",
            SensorType::Sound => "sound",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorType::Gas => "ppm",
            SensorType::Temperature => "°C",
            SensorType::Sound => "dB",
        }
    }

    /// Prefix of the legacy threshold field names (`gasThreshold`, `tempWarningThreshold`, ...).
    pub(crate) fn field_prefix(self) -> &'static str {
        match self {
            SensorType::Gas => "gas",
            SensorType::Temperature => "temp",
            SensorType::Sound => "sound",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gas" => Ok(Self::Gas),
            "temperature" => Ok(Self::Temperature),
            "sound" => Ok(Self::Sound),
            other => Err(ValidationError::single(
                "type",
                format!("unknown sensor type {other:?}, expected gas, temperature or sound"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Mirrors the `severity` Postgres enum. Declaration order is severity order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }

    pub fn is_alert(self) -> bool {
        self != Severity::Normal
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the canonical names plus the legacy `dangerous` spelling still
/// sent by older firmware and clients.
impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "warning" => Ok(Self::Warning),
            "danger" | "dangerous" => Ok(Self::Danger),
            other => Err(ValidationError::single(
                "status",
                format!("unknown status {other:?}, expected normal, warning or danger"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub sensor_type: SensorType,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Cut points for one sensor type. A value at or above `warning_max` is a
/// warning, at or above `danger_max` a danger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLevels {
    pub normal_max: f64,
    pub warning_max: f64,
    pub danger_max: f64,
}

impl ThresholdLevels {
    pub const fn new(normal_max: f64, warning_max: f64, danger_max: f64) -> Self {
        Self { normal_max, warning_max, danger_max }
    }
}

/// The nine cut points in effect. Always replaced as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub gas: ThresholdLevels,
    pub temperature: ThresholdLevels,
    pub sound: ThresholdLevels,
}

impl ThresholdConfig {
    pub fn levels(&self, sensor_type: SensorType) -> &ThresholdLevels {
        match sensor_type {
            SensorType::Gas => &self.gas,
            SensorType::Temperature => &self.temperature,
            SensorType::Sound => &self.sound,
        }
    }

    pub fn levels_mut(&mut self, sensor_type: SensorType) -> &mut ThresholdLevels {
        match sensor_type {
            SensorType::Gas => &mut self.gas,
            SensorType::Temperature => &mut self.temperature,
            SensorType::Sound => &mut self.sound,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            gas: ThresholdLevels::new(300.0, 450.0, 600.0),
            temperature: ThresholdLevels::new(25.0, 27.0, 31.0),
            sound: ThresholdLevels::new(60.0, 80.0, 100.0),
        }
    }
}

/// A persisted configuration. The most recently created record is active.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRecord {
    pub id: Uuid,
    pub config: ThresholdConfig,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub sensor_type: SensorType,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub recipient_id: Uuid,
}

/// A notification that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub sensor_type: SensorType,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub recipient_id: Uuid,
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Unrecognised role names get the least privilege.
    pub fn parse_lossy(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// An identity owned by the account service. Only read here.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}
