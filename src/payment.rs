//! Hosted payment gateway integration.
//!
//! Orders are created server-side over the gateway's REST API. The browser
//! checkout then posts back the payment id together with an HMAC-SHA256
//! signature over `"{order_id}|{payment_id}"`, keyed with the API secret.

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{error, info, instrument};

use crate::config::GatewayConfig;
use crate::error::{AppError, Result};

pub const CURRENCY: &str = "INR";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Smallest currency unit (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub payment_capture: u8,
}

impl OrderRequest {
    pub fn auto_capture(amount: i64, receipt: Option<String>) -> Self {
        Self {
            amount,
            currency: CURRENCY.to_string(),
            receipt,
            payment_capture: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Order {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// The three values the checkout widget posts back after a payment.
#[derive(Debug, Clone)]
pub struct CheckoutCallback<'a> {
    pub order_id: &'a str,
    pub payment_id: &'a str,
    pub signature: &'a str,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the browser checkout.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &OrderRequest) -> Result<Order>;

    /// Fails with `AppError::SignatureMismatch` unless the callback was signed with our secret.
    fn verify_payment_signature(&self, callback: &CheckoutCallback<'_>) -> Result<()>;
}

pub struct RazorpayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl RazorpayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    #[instrument(skip(self), fields(amount = request.amount, currency = %request.currency))]
    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        let response = self
            .http
            .post(format!("{}/orders", self.config.base_url))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Error creating order: {e:?}");
                AppError::Gateway(format!("Error creating order: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Gateway rejected order with {status}: {body}");
            return Err(AppError::Gateway(format!(
                "Order creation failed with status {status}: {body}"
            )));
        }

        let order: Order = response.json().await.map_err(|e| {
            error!("Error decoding order response: {e:?}");
            AppError::Gateway(format!("Malformed order response: {e}"))
        })?;
        info!("Created order with id: {}", order.id);
        Ok(order)
    }

    fn verify_payment_signature(&self, callback: &CheckoutCallback<'_>) -> Result<()> {
        verify_signature(&self.config.key_secret, callback)
    }
}

/// Hex HMAC-SHA256 of `"{order_id}|{payment_id}"`, as the checkout signs it.
pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> Result<String> {
    let mac = signature_mac(secret, order_id, payment_id)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of the posted signature against our own.
pub fn verify_signature(secret: &str, callback: &CheckoutCallback<'_>) -> Result<()> {
    let provided = hex::decode(callback.signature.trim()).map_err(|_| AppError::SignatureMismatch)?;
    signature_mac(secret, callback.order_id, callback.payment_id)?
        .verify_slice(&provided)
        .map_err(|_| AppError::SignatureMismatch)
}

fn signature_mac(secret: &str, order_id: &str, payment_id: &str) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid signing key: {e}")))?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(mac)
}

/// Converts a rupee price to whole paise.
pub fn to_paise(price: &BigDecimal) -> Result<i64> {
    (price * BigDecimal::from(100))
        .with_scale(0)
        .to_i64()
        .ok_or_else(|| AppError::BadRequest(format!("Price {price} cannot be charged")))
}
