//! Outbound delivery with a minimum inter-send spacing.
//!
//! The engine submits rendered messages to a [`MailTransport`] one at a
//! time. After every attempt, success or failure, the configured minimum
//! spacing must elapse before the next send is issued. This is a deliberate
//! outbound rate limit, not a retry backoff; the engine never retries.
//! Transport failures come back as typed [`DeliveryError`] values and are
//! counted by the orchestrator.

mod transport;

pub use transport::{MailTransport, SmtpConfig, SmtpTransport, TlsMode};

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::render::RenderedMessage;

/// Spacing between consecutive sends when none is configured.
pub const DEFAULT_SEND_SPACING: Duration = Duration::from_secs(10);

/// Typed failure of one send attempt. Never panics past this boundary.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends rendered messages through a transport, enforcing the minimum
/// spacing between consecutive attempts.
pub struct DeliveryEngine<T: MailTransport> {
    transport: T,
    from: String,
    min_spacing: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl<T: MailTransport> DeliveryEngine<T> {
    pub fn new(transport: T, from: impl Into<String>, min_spacing: Duration) -> Self {
        Self {
            transport,
            from: from.into(),
            min_spacing,
            last_attempt: Mutex::new(None),
        }
    }

    /// Submit one rendered message.
    ///
    /// Blocks until the spacing since the previous attempt has elapsed,
    /// then performs exactly one transport call.
    pub async fn send(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let mut last_attempt = self.last_attempt.lock().await;
        if let Some(last) = *last_attempt {
            let elapsed = last.elapsed();
            if elapsed < self.min_spacing {
                tokio::time::sleep(self.min_spacing - elapsed).await;
            }
        }

        let result = self.transport.deliver(&self.from, message).await;
        *last_attempt = Some(Instant::now());
        result
    }
}
