use crate::clients::api::{base_url_from, join_segments};
use crate::clients::traits::{Checkout, PaymentGateway};
use crate::config::PaymentsConfig;
use crate::error::{BookingError, Result};
use crate::models::PaymentStatus;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Envelope every Lahza endpoint answers with
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

/// Lahza hosted-checkout gateway
pub struct LahzaGateway {
    client: Client,
    base_url: Url,
    secret_key: String,
    callback_url: Url,
    currency: String,
}

impl LahzaGateway {
    pub fn new(config: &PaymentsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.gateway_timeout_ms))
            .build()
            .map_err(|e| BookingError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url_from(&config.gateway_url)?,
            secret_key: config.secret_key.clone(),
            callback_url: Url::parse(&config.callback_url).map_err(|e| {
                BookingError::Config(format!("invalid callback URL {}: {e}", config.callback_url))
            })?,
            currency: config.currency.clone(),
        })
    }

    fn callback_for(&self, booking_id: &str) -> Url {
        let mut url = self.callback_url.clone();
        url.query_pairs_mut().append_pair("booking_id", booking_id);
        url
    }

    fn map_status(raw: &str) -> PaymentStatus {
        match raw {
            "success" | "completed" => PaymentStatus::Completed,
            "failed" | "abandoned" | "reversed" | "cancelled" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

#[async_trait]
impl PaymentGateway for LahzaGateway {
    async fn create_checkout(&self, amount: u64, booking_id: &str) -> Result<Checkout> {
        let url = join_segments(&self.base_url, &["transaction", "initialize"]);
        // Lahza expects minor units
        let minor = amount
            .checked_mul(100)
            .ok_or_else(|| BookingError::Validation("amount too large".to_string()))?;
        let body = json!({
            "amount": minor.to_string(),
            "currency": self.currency,
            "callback_url": self.callback_for(booking_id).as_str(),
            "metadata": { "booking_id": booking_id },
        });

        debug!("Initializing Lahza checkout for booking {}", booking_id);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BookingError::GatewayUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            warn!("Lahza returned status: {}", response.status());
            return Err(BookingError::GatewayUnavailable(format!(
                "initialize returned {}",
                response.status()
            )));
        }

        let envelope: Envelope<InitializeData> = response
            .json()
            .await
            .map_err(|e| BookingError::GatewayUnavailable(e.to_string()))?;

        match envelope.data {
            Some(data) if envelope.status => {
                info!(
                    booking_id = %booking_id,
                    reference = %data.reference,
                    "Lahza checkout created"
                );
                Ok(Checkout {
                    checkout_url: data.authorization_url,
                    reference: data.reference,
                })
            }
            _ => Err(BookingError::GatewayUnavailable(format!(
                "initialize rejected: {}",
                envelope.message
            ))),
        }
    }

    async fn get_status(&self, reference: &str) -> Result<PaymentStatus> {
        let url = join_segments(&self.base_url, &["transaction", "verify", reference]);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| BookingError::VerificationFailed(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BookingError::VerificationFailed(format!(
                "unknown reference {reference}"
            )));
        }
        if !response.status().is_success() {
            return Err(BookingError::VerificationFailed(format!(
                "verify returned {}",
                response.status()
            )));
        }

        let envelope: Envelope<VerifyData> = response
            .json()
            .await
            .map_err(|e| BookingError::VerificationFailed(e.to_string()))?;

        match envelope.data {
            Some(data) if envelope.status => {
                debug!("Lahza reports {} for {}", data.status, reference);
                Ok(Self::map_status(&data.status))
            }
            _ => Err(BookingError::VerificationFailed(envelope.message)),
        }
    }

    fn gateway_name(&self) -> &'static str {
        "Lahza"
    }
}
