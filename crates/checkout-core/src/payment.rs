//! # Payment Strategy Trait
//!
//! Seam between the checkout and the hosted payment gateway. The checkout
//! creates a payment intent for the bag's grand total and hands the client
//! secret to the browser, which confirms the card payment directly with the
//! gateway. Webhooks report the outcome back.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            PaymentStrategy (trait)           │
//! │  ├── create_payment_intent()                 │
//! │  ├── verify_webhook()                        │
//! │  └── provider_name()                         │
//! └──────────────────────────────────────────────┘
//!                        ▲
//!          ┌─────────────┴─────────────┐
//!  ┌───────┴────────────┐   ┌──────────┴─────────┐
//!  │ StripePaymentIntent│   │  test doubles      │
//!  │      Strategy      │   │                    │
//!  └────────────────────┘   └────────────────────┘
//! ```

use crate::error::CheckoutResult;
use crate::product::{Currency, Price};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Request to start a charge attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// Amount in the smallest currency unit, with its currency
    pub amount: Price,

    /// Passed through to the gateway
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntentRequest {
    pub fn new(amount: Price) -> Self {
        Self {
            amount,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Status of a payment intent as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl Default for PaymentIntentStatus {
    fn default() -> Self {
        PaymentIntentStatus::RequiresPaymentMethod
    }
}

/// A server-side charge attempt created with the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Provider's intent id (`pi_...`)
    pub id: String,

    /// Secret handed to the browser to confirm the payment
    pub client_secret: String,

    pub amount: Price,

    #[serde(default)]
    pub status: PaymentIntentStatus,

    pub created_at: DateTime<Utc>,
}

/// The payment intent id embedded in a client secret (`pi_123_secret_abc` -> `pi_123`)
pub fn payment_intent_id_from_client_secret(client_secret: &str) -> Option<&str> {
    let (id, _) = client_secret.split_once("_secret")?;
    (!id.is_empty()).then_some(id)
}

/// Webhook event types we care about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    /// Payment succeeded
    PaymentSucceeded,
    /// Payment failed
    PaymentFailed,
    /// Unknown event (passthrough)
    Unknown(String),
}

/// A parsed webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider
    pub event_id: String,

    pub event_type: WebhookEventType,

    /// Provider name
    pub provider: String,

    /// Related payment intent ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,

    /// Amount (in smallest unit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,

    /// Metadata attached to the payment intent
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    /// Raw event object (for debugging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

/// Core trait for payment gateway implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create a payment intent for the given amount.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> CheckoutResult<PaymentIntent>;

    /// Verify a webhook signature and parse the event.
    ///
    /// # Arguments
    /// * `payload` - Raw webhook body bytes
    /// * `signature` - Signature header from the request
    async fn verify_webhook(&self, payload: &[u8], signature: &str)
        -> CheckoutResult<WebhookEvent>;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;

    /// Webhook endpoint path for this provider.
    /// Default: `/webhook/{provider_name}`
    fn webhook_path(&self) -> String {
        format!("/webhook/{}", self.provider_name())
    }
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;
