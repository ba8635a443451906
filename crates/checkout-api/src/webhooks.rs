//! # Order Webhook Handler
//!
//! Reconciles Stripe payment events against stored orders. Orders are only
//! ever created by the checkout form; webhooks report what they find.

use async_trait::async_trait;
use checkout_core::{CheckoutResult, SharedOrderStore};
use checkout_stripe::{PaymentIntentData, WebhookHandler};
use tracing::{info, warn};

pub struct OrderWebhookHandler {
    orders: SharedOrderStore,
}

impl OrderWebhookHandler {
    pub fn new(orders: SharedOrderStore) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl WebhookHandler for OrderWebhookHandler {
    async fn on_payment_succeeded(&self, data: PaymentIntentData) -> CheckoutResult<()> {
        match self.orders.find_by_payment_intent(&data.payment_intent_id).await? {
            Some(order) => info!(
                "Payment {} succeeded: order {} already in database",
                data.payment_intent_id, order.order_number
            ),
            None => warn!(
                "Payment {} succeeded but no order references it (amount={})",
                data.payment_intent_id, data.amount
            ),
        }
        Ok(())
    }

    async fn on_payment_failed(&self, data: PaymentIntentData) -> CheckoutResult<()> {
        let reason = data.failure_message.as_deref().unwrap_or("unknown");
        match self.orders.find_by_payment_intent(&data.payment_intent_id).await? {
            Some(order) => warn!(
                "Payment {} failed for order {}: {}",
                data.payment_intent_id, order.order_number, reason
            ),
            None => info!("Payment {} failed: {}", data.payment_intent_id, reason),
        }
        Ok(())
    }
}
