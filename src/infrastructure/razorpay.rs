use super::signature::PaymentSignature;
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{GatewayIntent, PaymentGateway, PaymentStatus};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";

#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: u64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentCollection {
    #[serde(default)]
    items: Vec<Value>,
}

/// Razorpay Orders/Payments REST adapter.
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: reqwest::Client,
    signer: PaymentSignature,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrderError::InternalError(Box::new(e)))?;
        let signer = PaymentSignature::new(&config.key_secret);
        Ok(Self {
            config,
            client,
            signer,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await
            .map_err(|e| OrderError::GatewayUnavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrderError::GatewayUnavailable(e.to_string()))?;
        if !status.is_success() {
            warn!(%status, "razorpay returned an error response");
            return Err(classify(status, &body));
        }
        serde_json::from_str(&body).map_err(OrderError::from)
    }
}

/// 5xx and 429 are transient; every other non-success status is a rejection.
pub(crate) fn classify(status: StatusCode, body: &str) -> OrderError {
    let description = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["description"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        OrderError::GatewayUnavailable(format!("{status}: {description}"))
    } else {
        OrderError::GatewayRejected(format!("{status}: {description}"))
    }
}

pub(crate) fn payment_status(raw: Value) -> Result<PaymentStatus> {
    let payment: PaymentResponse = serde_json::from_value(raw.clone())?;
    Ok(PaymentStatus {
        captured: payment.status == "captured",
        payment_ref: payment.id,
        gateway_order_ref: payment.order_id,
        raw,
    })
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn public_key(&self) -> &str {
        &self.config.key_id
    }

    #[instrument(skip(self), fields(minor_units = amount.minor_units, currency = %amount.currency))]
    async fn create_intent(&self, amount: &Money, receipt_ref: &str) -> Result<GatewayIntent> {
        let body = json!({
            "amount": amount.minor_units,
            "currency": amount.currency.code(),
            "receipt": receipt_ref,
        });
        let raw = self
            .send(self.client.post(self.url("/v1/orders")).json(&body))
            .await?;
        let order: OrderResponse = serde_json::from_value(raw.clone())?;
        let currency = Currency::new(&order.currency)?;
        debug!(gateway_order_ref = %order.id, "razorpay order created");
        Ok(GatewayIntent {
            gateway_order_ref: order.id,
            amount: Money::new(order.amount, currency),
            raw,
        })
    }

    fn verify_signature(&self, gateway_order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        self.signer.verify(gateway_order_ref, payment_ref, signature)
    }

    #[instrument(skip(self))]
    async fn fetch_payment_status(&self, payment_ref: &str) -> Result<PaymentStatus> {
        let raw = self
            .send(self.client.get(self.url(&format!("/v1/payments/{payment_ref}"))))
            .await?;
        payment_status(raw)
    }

    #[instrument(skip(self))]
    async fn find_payments_for_order(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Option<Vec<PaymentStatus>>> {
        let raw = self
            .send(
                self.client
                    .get(self.url(&format!("/v1/orders/{gateway_order_ref}/payments"))),
            )
            .await?;
        let collection: PaymentCollection = serde_json::from_value(raw)?;
        collection
            .items
            .into_iter()
            .map(payment_status)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
