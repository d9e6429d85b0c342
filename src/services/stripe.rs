use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::services::signature;

/// Maximum age of a webhook signature timestamp, in seconds
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(thiserror::Error, Debug)]
pub enum StripeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Stripe API error: {0}")]
    ApiError(String),

    #[error("Malformed Stripe-Signature header")]
    MalformedSignatureHeader,

    #[error("Webhook timestamp outside tolerance")]
    StaleSignature,

    #[error("Webhook signature mismatch")]
    SignatureMismatch,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub member_id: Uuid,
    pub family_account_id: Option<Uuid>,
    pub customer_email: String,
    pub description: String,
    pub monthly_amount_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: JsonValue,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base_url: String,
    secret_key: Secret<String>,
}

impl StripeClient {
    pub fn new(api_base_url: &str, secret_key: Secret<String>) -> Self {
        Self {
            client: Client::new(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    /// Creates a monthly subscription checkout session
    #[tracing::instrument(skip(self, request), fields(member_id = %request.member_id))]
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StripeError> {
        let mut params: Vec<(&str, String)> = vec![
            ("mode", "subscription".to_string()),
            ("customer_email", request.customer_email.clone()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", "usd".to_string()),
            (
                "line_items[0][price_data][unit_amount]",
                request.monthly_amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][recurring][interval]",
                "month".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("metadata[member_id]", request.member_id.to_string()),
            (
                "subscription_data[metadata][member_id]",
                request.member_id.to_string(),
            ),
        ];

        if let Some(family_id) = request.family_account_id {
            params.push(("metadata[family_account_id]", family_id.to_string()));
            params.push((
                "subscription_data[metadata][family_account_id]",
                family_id.to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = %status, error = %error_text, "Checkout session request failed");
            return Err(StripeError::ApiError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| StripeError::ApiError(format!("Failed to parse response: {}", e)))?;

        tracing::info!(session_id = %session.id, "Checkout session created");

        Ok(session)
    }

    /// Cancels a subscription immediately
    #[tracing::instrument(skip(self))]
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), StripeError> {
        let response = self
            .client
            .delete(format!(
                "{}/v1/subscriptions/{}",
                self.api_base_url, subscription_id
            ))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StripeError::ApiError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        tracing::info!(subscription_id = %subscription_id, "Subscription cancelled");

        Ok(())
    }
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
/// against the raw request body
pub fn verify_webhook_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| StripeError::MalformedSignatureHeader)?,
                )
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::MalformedSignatureHeader)?;
    if signatures.is_empty() {
        return Err(StripeError::MalformedSignatureHeader);
    }

    if (now_unix - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(StripeError::StaleSignature);
    }

    let signed_payload = format!("{}.{}", timestamp, payload);
    if signatures
        .iter()
        .any(|sig| signature::verify(&signed_payload, sig, secret.as_bytes()).is_ok())
    {
        Ok(())
    } else {
        Err(StripeError::SignatureMismatch)
    }
}

/// Builds a header value the way Stripe signs webhook deliveries
pub fn sign_webhook_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let sig = signature::sign(&format!("{}.{}", timestamp, payload), secret.as_bytes());
    format!("t={},v1={}", timestamp, sig)
}
