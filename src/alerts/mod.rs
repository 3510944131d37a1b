pub mod classifier;
pub mod dispatcher;
pub mod message;
pub mod resolver;

use chrono::{DateTime, Utc};

use crate::db::models::{Reading, SensorType, Severity};

pub use classifier::classify;
pub use dispatcher::{AlertDispatcher, DispatchResult, EmailStatus};
pub use resolver::{CallerResolver, FallbackResolver, RecipientResolver};

/// A severity decision about one value, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub sensor_type: SensorType,
    pub severity: Severity,
    pub value: f64,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl Alert {
    /// Alert for a classified reading, with the standard message text.
    pub fn for_reading(reading: &Reading, severity: Severity) -> Self {
        Self {
            sensor_type: reading.sensor_type,
            severity,
            value: reading.value,
            message: message::alert_text(reading.sensor_type, severity, reading.value),
            recorded_at: reading.recorded_at,
        }
    }
}
