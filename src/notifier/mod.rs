//! Outbound alert delivery.
//!
//! The dispatcher only sees the [`Notifier`] trait. Retries belong to
//! [`RetryingNotifier`], which wraps the real transport.

pub mod email;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

pub use email::{EmailConfig, SmtpNotifier};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),

    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },
}

// ---------------------------------------------------------------------------
// Message + trait
// ---------------------------------------------------------------------------

/// A rendered alert ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &AlertEmail) -> Result<(), DeliveryError>;
}

/// Used when no SMTP relay is configured: the alert is only logged.
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn send(&self, email: &AlertEmail) -> Result<(), DeliveryError> {
        info!(to = %email.to, subject = %email.subject, "SMTP not configured; alert email not sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// The wait after failed attempt `n` (1-based) is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

/// Retries the wrapped notifier with exponential backoff.
pub struct RetryingNotifier<N> {
    inner: N,
    policy: RetryPolicy,
}

impl<N: Notifier> RetryingNotifier<N> {
    pub fn new(inner: N, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<N: Notifier> Notifier for RetryingNotifier<N> {
    async fn send(&self, email: &AlertEmail) -> Result<(), DeliveryError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.send(email).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => {
                    return Err(DeliveryError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        to = %email.to,
                        attempt,
                        max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Alert email attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
