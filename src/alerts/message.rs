use crate::{
    db::models::{Notification, SensorType, Severity},
    notifier::AlertEmail,
};

/// Short human-readable text stored on the notification.
pub fn alert_text(sensor_type: SensorType, severity: Severity, value: f64) -> String {
    match severity {
        Severity::Danger => format!("{sensor_type} too high: {value}"),
        Severity::Warning => format!("{sensor_type} elevated: {value}"),
        Severity::Normal => format!("{sensor_type} normal: {value}"),
    }
}

/// Render the alert email for a stored notification.
pub fn render_email(to: &str, n: &Notification) -> AlertEmail {
    let background = match n.severity {
        Severity::Danger => "#ffebee",
        _ => "#fff3e0",
    };
    let subject = format!(
        "Alert: {} {}",
        n.sensor_type.as_str().to_uppercase(),
        n.severity.as_str().to_uppercase()
    );
    let html = format!(
        r#"<div style="padding:20px;background-color:{background}">
  <h2>Sensor Alert</h2>
  <p><strong>Type:</strong> {sensor_type}</p>
  <p><strong>Status:</strong> {severity}</p>
  <p><strong>Value:</strong> {value}{unit}</p>
  <p><strong>Message:</strong> {message}</p>
  <p><strong>Time:</strong> {time}</p>
</div>"#,
        sensor_type = n.sensor_type,
        severity = n.severity,
        value = n.value,
        unit = n.sensor_type.unit(),
        message = escape_html(&n.message),
        time = n.recorded_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    AlertEmail { to: to.to_owned(), subject, html }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
