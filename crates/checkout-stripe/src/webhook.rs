//! # Stripe Webhook Handling
//!
//! Webhooks notify the server of the outcome of payment intents confirmed in
//! the browser.

use async_trait::async_trait;
use checkout_core::{CheckoutError, CheckoutResult, Currency, WebhookEvent, WebhookEventType};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Parsed payment_intent.* event data
#[derive(Debug, Clone)]
pub struct PaymentIntentData {
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: Option<Currency>,
    pub metadata: HashMap<String, String>,
    /// Decline message on failed payments
    pub failure_message: Option<String>,
}

impl PaymentIntentData {
    /// Parse from a webhook event
    pub fn from_event(event: &WebhookEvent) -> CheckoutResult<Self> {
        let payment_intent_id = event.payment_intent_id.clone().ok_or_else(|| {
            CheckoutError::WebhookParseError("Missing payment intent id".to_string())
        })?;

        let failure_message = event
            .raw_data
            .as_ref()
            .and_then(|raw| raw.get("last_payment_error"))
            .and_then(|err| err.get("message"))
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Self {
            payment_intent_id,
            amount: event.amount.unwrap_or(0),
            currency: event.currency,
            metadata: event.metadata.clone(),
            failure_message,
        })
    }
}

/// Webhook event handler trait
///
/// Implement this trait to react to payment events.
#[async_trait]
#[allow(unused_variables)]
pub trait WebhookHandler: Send + Sync {
    /// Called when a payment intent succeeds
    async fn on_payment_succeeded(&self, data: PaymentIntentData) -> CheckoutResult<()> {
        info!(
            "Payment succeeded: intent={}, amount={}",
            data.payment_intent_id, data.amount
        );
        Ok(())
    }

    /// Called when a payment intent fails
    async fn on_payment_failed(&self, data: PaymentIntentData) -> CheckoutResult<()> {
        warn!(
            "Payment failed: intent={}, reason={:?}",
            data.payment_intent_id, data.failure_message
        );
        Ok(())
    }

    /// Called for unknown/unhandled events
    async fn on_unknown_event(&self, event: &WebhookEvent) -> CheckoutResult<()> {
        debug!("Unhandled webhook event: {:?}", event.event_type);
        Ok(())
    }
}

/// Default webhook handler (just logs events)
pub struct LoggingWebhookHandler;

impl WebhookHandler for LoggingWebhookHandler {}

/// Dispatch a webhook event to the appropriate handler method
pub async fn dispatch_webhook_event(
    handler: &dyn WebhookHandler,
    event: WebhookEvent,
) -> CheckoutResult<()> {
    match &event.event_type {
        WebhookEventType::PaymentSucceeded => {
            let data = PaymentIntentData::from_event(&event)?;
            handler.on_payment_succeeded(data).await
        }
        WebhookEventType::PaymentFailed => {
            let data = PaymentIntentData::from_event(&event)?;
            handler.on_payment_failed(data).await
        }
        WebhookEventType::Unknown(_) => handler.on_unknown_event(&event).await,
    }
}
