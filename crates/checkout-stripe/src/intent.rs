//! # Stripe Payment Intents
//!
//! Implementation of the Stripe Payment Intents API.
//! The checkout page confirms the card payment in the browser with the
//! returned client secret; this side only creates the intent and verifies
//! webhooks.

use crate::config::StripeConfig;
use async_trait::async_trait;
use checkout_core::{
    CheckoutError, CheckoutResult, Currency, PaymentIntent, PaymentIntentRequest,
    PaymentIntentStatus, PaymentStrategy, Price, WebhookEvent, WebhookEventType,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Signed webhook timestamps older than this are rejected
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Stripe Payment Intent strategy
pub struct StripePaymentIntentStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripePaymentIntentStrategy {
    /// Create a new Stripe payment intent strategy
    pub fn new(config: StripeConfig) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| {
                CheckoutError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Form parameters for `POST /v1/payment_intents`
    fn intent_params(request: &PaymentIntentRequest) -> Vec<(String, String)> {
        let mut params = vec![
            ("amount".to_string(), request.amount.amount.to_string()),
            (
                "currency".to_string(),
                request.amount.currency.as_str().to_string(),
            ),
        ];

        let mut metadata: Vec<_> = request.metadata.iter().collect();
        metadata.sort();
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }
        params
    }
}

#[async_trait]
impl PaymentStrategy for StripePaymentIntentStrategy {
    #[instrument(skip(self, request), fields(amount = request.amount.amount))]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> CheckoutResult<PaymentIntent> {
        if request.amount.amount <= 0 {
            return Err(CheckoutError::InvalidPrice {
                message: format!(
                    "payment amount must be positive, got {}",
                    request.amount.amount
                ),
            });
        }

        let form_params = Self::intent_params(request);
        debug!(
            "Creating Stripe payment intent: amount={}",
            request.amount.display()
        );

        let url = format!("{}/v1/payment_intents", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .form(&form_params)
            .send()
            .await
            .map_err(|e| CheckoutError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);

            // Parse Stripe error
            if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(CheckoutError::ProviderError {
                    provider: PROVIDER.to_string(),
                    message: error_response.error.message,
                });
            }

            return Err(CheckoutError::ProviderError {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let intent: StripePaymentIntentResponse = serde_json::from_str(&body).map_err(|e| {
            CheckoutError::Serialization(format!("Failed to parse Stripe response: {}", e))
        })?;

        info!("Created Stripe payment intent: id={}", intent.id);

        let currency = Currency::from_str(&intent.currency)?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount: Price::from_cents(intent.amount, currency),
            status: intent.status,
            created_at: intent
                .created
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now),
        })
    }

    #[instrument(skip(self, payload, signature))]
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> CheckoutResult<WebhookEvent> {
        let secret = self.config.webhook_secret.as_deref().ok_or_else(|| {
            CheckoutError::Configuration("STRIPE_WEBHOOK_SECRET not set".to_string())
        })?;

        verify_signature(secret, payload, signature, Utc::now().timestamp())?;

        let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            CheckoutError::WebhookParseError(format!("Failed to parse webhook: {}", e))
        })?;

        debug!("Verified Stripe webhook: type={}", event.event_type);

        let event_type = match event.event_type.as_str() {
            "payment_intent.succeeded" => WebhookEventType::PaymentSucceeded,
            "payment_intent.payment_failed" => WebhookEventType::PaymentFailed,
            other => WebhookEventType::Unknown(other.to_string()),
        };

        let object = &event.data.object;
        let is_intent = object.get("object").and_then(|v| v.as_str()) == Some("payment_intent");

        let payment_intent_id = if is_intent {
            object.get("id").and_then(|v| v.as_str()).map(String::from)
        } else {
            object
                .get("payment_intent")
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        let amount = object.get("amount").and_then(|v| v.as_i64());

        let currency = object
            .get("currency")
            .and_then(|v| v.as_str())
            .and_then(|c| Currency::from_str(c).ok());

        let metadata: HashMap<String, String> = object
            .get("metadata")
            .and_then(|m| m.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(WebhookEvent {
            event_id: event.id,
            event_type,
            provider: PROVIDER.to_string(),
            payment_intent_id,
            amount,
            currency,
            metadata,
            raw_data: Some(serde_json::Value::Object(event.data.object)),
            timestamp: DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripePaymentIntentResponse {
    id: String,
    client_secret: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    status: PaymentIntentStatus,
    #[serde(default)]
    created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Map<String, serde_json::Value>,
}

// =============================================================================
// Webhook Signature Verification
// =============================================================================

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> CheckoutResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = value.parse().ok();
            }
            "v1" => {
                signatures.push(value.to_string());
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        CheckoutError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(CheckoutError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Check a `Stripe-Signature` header against the payload at time `now`
pub(crate) fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> CheckoutResult<()> {
    let sig_parts = parse_signature_header(header)?;

    if (now - sig_parts.timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(CheckoutError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let signed_payload = format!(
        "{}.{}",
        sig_parts.timestamp,
        String::from_utf8_lossy(payload)
    );
    let expected_sig = compute_hmac_sha256(secret, &signed_payload)?;

    let valid = sig_parts
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected_sig));

    if !valid {
        return Err(CheckoutError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn compute_hmac_sha256(secret: &str, message: &str) -> CheckoutResult<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WEBHOOK_SECRET: &str = "whsec_test_secret";

    fn strategy(base_url: &str) -> StripePaymentIntentStrategy {
        let config = StripeConfig::new("sk_test_abc123", Currency::GBP)
            .with_webhook_secret(WEBHOOK_SECRET)
            .with_api_base_url(base_url);
        StripePaymentIntentStrategy::new(config).unwrap()
    }

    fn signed_header(payload: &str, timestamp: i64) -> String {
        let sig = compute_hmac_sha256(WEBHOOK_SECRET, &format!("{}.{}", timestamp, payload)).unwrap();
        format!("t={},v1={}", timestamp, sig)
    }

    #[tokio::test]
    async fn test_create_payment_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("Authorization", "Bearer sk_test_abc123"))
            .and(body_string_contains("amount=2750"))
            .and(body_string_contains("currency=gbp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_123",
                "object": "payment_intent",
                "client_secret": "pi_123_secret_456",
                "amount": 2750,
                "currency": "gbp",
                "status": "requires_payment_method",
                "created": 1_700_000_000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = PaymentIntentRequest::new(Price::from_cents(2750, Currency::GBP))
            .with_metadata("product_count", "2");
        let intent = strategy(&server.uri())
            .create_payment_intent(&request)
            .await
            .unwrap();

        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.client_secret, "pi_123_secret_456");
        assert_eq!(intent.amount, Price::from_cents(2750, Currency::GBP));
        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
    }

    #[tokio::test]
    async fn test_create_payment_intent_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Invalid API Key provided", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let request = PaymentIntentRequest::new(Price::from_cents(100, Currency::GBP));
        let err = strategy(&server.uri())
            .create_payment_intent(&request)
            .await
            .unwrap_err();

        match err {
            CheckoutError::ProviderError { provider, message } => {
                assert_eq!(provider, "stripe");
                assert_eq!(message, "Invalid API Key provided");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_stripe_is_network_error() {
        // nothing listens on port 1
        let request = PaymentIntentRequest::new(Price::from_cents(100, Currency::GBP));
        let err = strategy("http://127.0.0.1:1")
            .create_payment_intent(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::NetworkError(_)), "{:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_zero_amount_rejected_without_calling_stripe() {
        let server = MockServer::start().await;
        let request = PaymentIntentRequest::new(Price::zero(Currency::GBP));

        let err = strategy(&server.uri())
            .create_payment_intent(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPrice { .. }));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_intent_params_sorted_metadata() {
        let request = PaymentIntentRequest::new(Price::from_cents(500, Currency::USD))
            .with_metadata("b", "2")
            .with_metadata("a", "1");
        let params = StripePaymentIntentStrategy::intent_params(&request);

        assert_eq!(params[0], ("amount".to_string(), "500".to_string()));
        assert_eq!(params[1], ("currency".to_string(), "usd".to_string()));
        assert_eq!(params[2].0, "metadata[a]");
        assert_eq!(params[3].0, "metadata[b]");
    }

    #[tokio::test]
    async fn test_verify_webhook_payment_succeeded() {
        let payload = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": "pi_123",
                "object": "payment_intent",
                "amount": 2750,
                "currency": "gbp",
                "metadata": { "product_count": "2" }
            }}
        })
        .to_string();
        let header = signed_header(&payload, Utc::now().timestamp());

        let event = strategy("http://unused")
            .verify_webhook(payload.as_bytes(), &header)
            .await
            .unwrap();

        assert_eq!(event.event_type, WebhookEventType::PaymentSucceeded);
        assert_eq!(event.payment_intent_id.as_deref(), Some("pi_123"));
        assert_eq!(event.amount, Some(2750));
        assert_eq!(event.currency, Some(Currency::GBP));
        assert_eq!(event.metadata.get("product_count").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_verify_webhook_rejects_bad_signature() {
        let payload = r#"{"id":"evt_1","type":"payment_intent.succeeded","created":1,"data":{"object":{}}}"#;
        let now = Utc::now().timestamp();
        let header = format!("t={},v1={}", now, "0".repeat(64));

        let err = strategy("http://unused")
            .verify_webhook(payload.as_bytes(), &header)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::WebhookVerificationFailed(_)));
    }

    #[test]
    fn test_signature_tolerance() {
        let payload = "{}";
        let header = signed_header(payload, 1_000);

        assert!(verify_signature(WEBHOOK_SECRET, payload.as_bytes(), &header, 1_100).is_ok());
        assert!(verify_signature(WEBHOOK_SECRET, payload.as_bytes(), &header, 1_400).is_err());
    }

    #[test]
    fn test_parse_signature_header() {
        let parsed = parse_signature_header("t=1234567890,v1=abc123,v0=old,v1=def456").unwrap();

        assert_eq!(parsed.timestamp, 1234567890);
        assert_eq!(parsed.signatures, vec!["abc123", "def456"]);
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=1").is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
