use crate::db::models::{SensorType, Severity, ThresholdConfig};

/// Map a value to its severity under `config`.
///
/// A value equal to a cut point belongs to the higher severity. `normal_max`
/// only bounds the "normal" band for display; it never changes the result.
pub fn classify(sensor_type: SensorType, value: f64, config: &ThresholdConfig) -> Severity {
    let levels = config.levels(sensor_type);
    if value >= levels.danger_max {
        Severity::Danger
    } else if value >= levels.warning_max {
        Severity::Warning
    } else {
        Severity::Normal
    }
}
