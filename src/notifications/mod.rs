use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub mod templates;

use templates::{render_cancellation, render_verification, EmailMessage, MailIdentity};

/// Order facts included in the cancellation notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    pub item_count: usize,
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail API rejected the message with status {0}")]
    Rejected(u16),
}

/// Transactional email. Delivery is attempted once; `false` means not sent.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_verification_email(&self, to: &str, name: &str, otp: &str) -> bool;

    async fn send_cancellation_email(&self, to: &str, name: &str, order: &OrderSummary) -> bool;
}

/// Delivers mail through a JSON HTTP mail API (`POST {url}` with a bearer key)
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    identity: MailIdentity,
}

impl HttpMailer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        identity: MailIdentity,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            api_key,
            identity,
        })
    }

    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn deliver(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }

        info!("email delivered");
        Ok(())
    }

    async fn deliver_logged(&self, message: EmailMessage, kind: &str) -> bool {
        match self.deliver(&message).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, kind, "Failed to send email");
                false
            }
        }
    }
}

#[async_trait]
impl NotificationGateway for HttpMailer {
    async fn send_verification_email(&self, to: &str, name: &str, otp: &str) -> bool {
        let message = render_verification(&self.identity, to, name, otp);
        self.deliver_logged(message, "verification").await
    }

    async fn send_cancellation_email(&self, to: &str, name: &str, order: &OrderSummary) -> bool {
        let message = render_cancellation(&self.identity, to, name, order);
        self.deliver_logged(message, "cancellation").await
    }
}

/// Used when no mail API is configured; nothing is sent.
#[derive(Debug, Clone, Default)]
pub struct DisabledMailer;

#[async_trait]
impl NotificationGateway for DisabledMailer {
    async fn send_verification_email(&self, _to: &str, _name: &str, _otp: &str) -> bool {
        warn!("mail delivery disabled; verification email not sent");
        false
    }

    async fn send_cancellation_email(&self, _to: &str, _name: &str, order: &OrderSummary) -> bool {
        warn!(order_id = %order.id, "mail delivery disabled; cancellation email not sent");
        false
    }
}
