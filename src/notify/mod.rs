//! OTP delivery
//!
//! Out-of-band delivery of one-time passcodes. Delivery is best-effort by
//! contract: callers log failures and never surface them, and a failed send
//! never rolls back the transaction that generated the OTP.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;

/// Delivery failure. Observed in logs only; never returned to API clients.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gateway responded with status {0}")]
    Status(u16),
}

/// Outbound gateway for one-time passcodes.
#[async_trait]
pub trait OtpGateway: Send + Sync {
    async fn send_otp(
        &self,
        to_email: &str,
        transaction_id: Uuid,
        otp: &str,
    ) -> Result<(), NotifyError>;
}

/// Development gateway: logs instead of sending.
pub struct LogGateway;

#[async_trait]
impl OtpGateway for LogGateway {
    async fn send_otp(
        &self,
        to_email: &str,
        transaction_id: Uuid,
        otp: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            to = %to_email,
            transaction_id = %transaction_id,
            otp = %otp,
            "OTP delivery (dev gateway, not sent)"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct OtpMessage<'a> {
    to: &'a str,
    transaction_id: Uuid,
    otp: &'a str,
}

/// Production gateway: posts the OTP to a mail/SMS webhook.
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
}

impl WebhookGateway {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl OtpGateway for WebhookGateway {
    async fn send_otp(
        &self,
        to_email: &str,
        transaction_id: Uuid,
        otp: &str,
    ) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&OtpMessage {
                to: to_email,
                transaction_id,
                otp,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}

/// Select a gateway from configuration.
pub fn from_config(config: &Config) -> std::sync::Arc<dyn OtpGateway> {
    match &config.otp_webhook_url {
        Some(url) => std::sync::Arc::new(WebhookGateway::new(
            reqwest::Client::new(),
            url.clone(),
        )),
        None => std::sync::Arc::new(LogGateway),
    }
}
