//! SMTP delivery of alert emails.
//!
//! [`SmtpNotifier`] wraps the `lettre` async SMTP transport. Without an
//! `SMTP_HOST` the service falls back to [`super::LogOnlyNotifier`].

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{AlertEmail, DeliveryError, Notifier};

/// Port on which the relay expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

pub struct SmtpNotifier {
    from_address: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, DeliveryError> {
        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        };
        let mut builder = builder.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from_address: config.from_address.clone(),
            transport: builder.build(),
        })
    }
}

/// Assemble the MIME message for `email`.
fn build_message(from: &str, email: &AlertEmail) -> Result<Message, DeliveryError> {
    Message::builder()
        .from(from.parse()?)
        .to(email.to.parse()?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML)
        .body(email.html.clone())
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, email: &AlertEmail) -> Result<(), DeliveryError> {
        let message = build_message(&self.from_address, email)?;
        self.transport.send(message).await?;
        info!(to = %email.to, subject = %email.subject, "Alert email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> AlertEmail {
        AlertEmail {
            to: to.to_owned(),
            subject: "Alert: SOUND WARNING".into(),
            html: "<p>sound elevated: 85</p>".into(),
        }
    }

    #[test]
    fn build_message_accepts_valid_addresses() {
        assert!(build_message("alerts@example.com", &email("ops@example.com")).is_ok());
    }

    #[test]
    fn build_message_rejects_bad_recipient() {
        let err = build_message("alerts@example.com", &email("not-an-email")).unwrap_err();
        assert!(matches!(err, DeliveryError::Address(_)));
        assert!(err.to_string().contains("email address parse error"));
    }

    #[test]
    fn build_error_display() {
        let err = DeliveryError::Build("missing body".to_owned());
        assert_eq!(err.to_string(), "email build error: missing body");
    }
}
