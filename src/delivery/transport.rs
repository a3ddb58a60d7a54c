//! Mail transport trait and SMTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::DeliveryError;
use crate::render::RenderedMessage;

/// One-shot submission of a rendered message to an outbound transport.
///
/// Implement this trait to provide alternative backends (e.g. SES, Mailgun,
/// or a recording mock in tests).
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Send one message. Must return a typed error rather than panic.
    async fn deliver(&self, from: &str, message: &RenderedMessage) -> Result<(), DeliveryError>;
}

/// TLS mode for the SMTP connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    #[default]
    Starttls,
    Tls,
    None,
}

/// Configuration for the SMTP transport.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    #[serde(rename = "smtp_host")]
    pub host: String,

    /// SMTP server port (default: 587).
    #[serde(rename = "smtp_port", default = "default_port")]
    pub port: u16,

    /// SMTP username for authentication.
    #[serde(rename = "smtp_username")]
    pub username: Option<String>,

    /// SMTP password for authentication.
    #[serde(rename = "smtp_password")]
    pub password: Option<String>,

    /// Sender address for every outbound newsletter.
    #[serde(rename = "smtp_from")]
    pub from: String,

    #[serde(rename = "smtp_tls", default)]
    pub tls: TlsMode,

    /// Connection timeout in seconds (default: 10).
    #[serde(rename = "smtp_timeout", default = "default_timeout")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    587
}

fn default_timeout() -> u64 {
    10
}

/// SMTP-based [`MailTransport`] using lettre.
#[derive(Clone)]
pub struct SmtpTransport {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpTransport {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let mut builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| DeliveryError::Transport(e.to_string()))?,
            TlsMode::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| DeliveryError::Transport(e.to_string()))?
            }
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: Arc::new(builder.build()),
        })
    }

    /// Build a lettre Message from a rendered newsletter.
    ///
    /// Messages with embedded covers become multipart/related with one
    /// inline attachment per cover, referenced from the HTML body by cid.
    fn build_message(&self, from: &str, message: &RenderedMessage) -> Result<Message, DeliveryError> {
        let from: Mailbox = from
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(from.to_string()))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(message.to.clone()))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone());

        if message.embeds.is_empty() {
            return builder
                .singlepart(SinglePart::html(message.html.clone()))
                .map_err(|e| DeliveryError::Message(e.to_string()));
        }

        let mut related = MultiPart::related().singlepart(SinglePart::html(message.html.clone()));
        for embed in &message.embeds {
            let content_type = ContentType::parse(&embed.mime)
                .map_err(|_| DeliveryError::Message(format!("invalid mime type: {}", embed.mime)))?;
            related = related.singlepart(
                Attachment::new_inline(embed.cid.clone())
                    .body(Body::new(embed.content.clone()), content_type),
            );
        }

        builder
            .multipart(related)
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, from: &str, message: &RenderedMessage) -> Result<(), DeliveryError> {
        let email = self.build_message(from, message)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(())
    }
}
