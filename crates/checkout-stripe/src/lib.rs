//! # checkout-stripe
//!
//! Stripe payment gateway for the storefront checkout.
//!
//! **StripePaymentIntentStrategy** - Payment Intents API
//!    - Creates an intent for the bag's grand total
//!    - Returns the client secret the browser confirms the card payment with
//!    - Verifies `Stripe-Signature` webhooks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use checkout_stripe::StripePaymentIntentStrategy;
//! use checkout_core::{PaymentIntentRequest, PaymentStrategy};
//!
//! // Create strategy from environment
//! let strategy = StripePaymentIntentStrategy::from_env()?;
//!
//! let intent = strategy
//!     .create_payment_intent(&PaymentIntentRequest::new(contents.grand_total))
//!     .await?;
//!
//! // Render intent.client_secret into the checkout page
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! use checkout_stripe::{dispatch_webhook_event, PaymentIntentData, WebhookHandler};
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl WebhookHandler for MyHandler {
//!     async fn on_payment_succeeded(&self, data: PaymentIntentData) -> CheckoutResult<()> {
//!         println!("Intent {} paid!", data.payment_intent_id);
//!         Ok(())
//!     }
//! }
//!
//! // In your webhook endpoint:
//! let event = strategy.verify_webhook(payload, signature).await?;
//! dispatch_webhook_event(&MyHandler, event).await?;
//! ```

pub mod config;
pub mod intent;
pub mod webhook;

// Re-exports
pub use config::StripeConfig;
pub use intent::StripePaymentIntentStrategy;
pub use webhook::{
    dispatch_webhook_event, LoggingWebhookHandler, PaymentIntentData, WebhookHandler,
};
