//! # checkout-core
//!
//! Core types for the storefront checkout.
//!
//! This crate provides:
//! - `Bag` and `bag_contents` for the session shopping bag and its totals
//! - `Order`, `OrderLineItem` and `OrderForm` validation
//! - `OrderStore` with in-memory and SQLite implementations
//! - `CheckoutService` for placing orders from a bag
//! - `PaymentStrategy` trait for the payment gateway
//! - `CheckoutError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use checkout_core::{Bag, CheckoutService, OrderForm};
//!
//! let mut bag = Bag::new();
//! bag.add("7", 1, Some("m"));
//!
//! let contents = checkout.bag_contents(&bag)?;
//! let intent = strategy
//!     .create_payment_intent(&PaymentIntentRequest::new(contents.grand_total))
//!     .await?;
//!
//! let details = form.clean()?;
//! let order = checkout.place_order(&bag, details, Some(&intent.id)).await?;
//! ```

pub mod bag;
pub mod checkout;
pub mod error;
pub mod form;
pub mod order;
pub mod payment;
pub mod product;
pub mod sqlite;
pub mod store;

// Re-exports for convenience
pub use bag::{bag_contents, Bag, BagContents, BagEntry, BagItem, DeliveryPolicy};
pub use checkout::CheckoutService;
pub use error::{CheckoutError, CheckoutResult};
pub use form::{FieldErrors, OrderForm, ORDER_FORM_FIELDS};
pub use order::{generate_order_number, CustomerDetails, Order, OrderLineItem};
pub use payment::{
    payment_intent_id_from_client_secret, BoxedPaymentStrategy, PaymentIntent,
    PaymentIntentRequest, PaymentIntentStatus, PaymentStrategy, WebhookEvent, WebhookEventType,
};
pub use product::{Currency, Price, Product, ProductCatalog};
pub use sqlite::SqliteOrderStore;
pub use store::{InMemoryOrderStore, OrderStore, SharedOrderStore};
