use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Outbound order creation request, amount in currency subunits (paise for INR)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOrderRequest {
    #[serde(rename = "amount")]
    pub amount_subunits: i64,
    pub currency: String,
    pub receipt: String,
    pub payment_capture: u8,
}

impl ProviderOrderRequest {
    pub fn new(amount_subunits: i64, currency: impl Into<String>, receipt: impl Into<String>) -> Self {
        Self {
            amount_subunits,
            currency: currency.into(),
            receipt: receipt.into(),
            payment_capture: 1,
        }
    }
}

/// Provider-side order as returned by the payment gateway
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Error)]
pub enum PaymentProviderError {
    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payment provider credentials are not configured")]
    NotConfigured,

    #[error("invalid amount for payment provider: {0}")]
    InvalidAmount(Decimal),
}

/// Converts a decimal amount into integer subunits, rounding half away from zero.
pub fn to_subunits(amount: Decimal) -> Result<i64, PaymentProviderError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentProviderError::InvalidAmount(amount));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(PaymentProviderError::InvalidAmount(amount))
}

/// Creates orders on the payment gateway ahead of checkout
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(
        &self,
        request: ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError>;
}

/// Razorpay Orders API client
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    api_base: String,
    key_id: Option<String>,
    key_secret: Option<String>,
}

impl RazorpayClient {
    pub fn new(
        api_base: impl Into<String>,
        key_id: Option<String>,
        key_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        })
    }
}

#[async_trait]
impl PaymentProvider for RazorpayClient {
    #[instrument(skip(self), fields(receipt = %request.receipt))]
    async fn create_order(
        &self,
        request: ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError> {
        let (Some(key_id), Some(key_secret)) = (&self.key_id, &self.key_secret) else {
            return Err(PaymentProviderError::NotConfigured);
        };

        let url = format!("{}/v1/orders", self.api_base);
        let response = self
            .client
            .post(&url)
            .basic_auth(key_id, Some(key_secret))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Razorpay order creation rejected");
            return Err(PaymentProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let order: ProviderOrder = response.json().await?;
        info!(provider_order_id = %order.id, "Razorpay order created");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> RazorpayClient {
        RazorpayClient::new(
            base,
            Some("rzp_test_key".into()),
            Some("rzp_test_secret".into()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn subunits_round_to_nearest_paisa() {
        assert_eq!(to_subunits(dec!(499)).unwrap(), 49_900);
        assert_eq!(to_subunits(dec!(10.005)).unwrap(), 1_001);
        assert_eq!(to_subunits(dec!(0.01)).unwrap(), 1);
        assert_matches!(to_subunits(dec!(0)), Err(PaymentProviderError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn creates_order_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(basic_auth("rzp_test_key", "rzp_test_secret"))
            .and(body_json(serde_json::json!({
                "amount": 99_800,
                "currency": "INR",
                "receipt": "order_abc",
                "payment_capture": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_EKwxwAgItmmXdp",
                "entity": "order",
                "amount": 99_800,
                "currency": "INR",
                "receipt": "order_abc",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server.uri())
            .create_order(ProviderOrderRequest::new(99_800, "INR", "order_abc"))
            .await
            .unwrap();

        assert_eq!(order.id, "order_EKwxwAgItmmXdp");
        assert_eq!(order.amount, 99_800);
        assert_eq!(order.status.as_deref(), Some("created"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad amount"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .create_order(ProviderOrderRequest::new(1, "INR", "order_x"))
            .await
            .unwrap_err();

        assert_matches!(err, PaymentProviderError::Rejected { status: 400, ref body } if body == "bad amount");
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit() {
        let client = RazorpayClient::new(
            "http://127.0.0.1:9",
            None,
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        assert_matches!(
            client
                .create_order(ProviderOrderRequest::new(100, "INR", "order_y"))
                .await,
            Err(PaymentProviderError::NotConfigured)
        );
    }
}
