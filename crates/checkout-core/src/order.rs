//! # Order Types
//!
//! Persisted checkout records: an [`Order`] with its customer details and
//! totals, and one [`OrderLineItem`] per bag entry (or per size of a sized entry).

use crate::bag::DeliveryPolicy;
use crate::error::CheckoutResult;
use crate::product::{Currency, Price, Product};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validated customer contact and delivery address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    /// ISO 3166-1 alpha-2, upper case
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    pub town_or_city: String,
    pub street_address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

/// A placed order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 32 upper-case hex characters
    pub order_number: String,

    #[serde(flatten)]
    pub customer: CustomerDetails,

    /// When the order was placed
    pub date: DateTime<Utc>,

    pub delivery_cost: Price,
    pub order_total: Price,
    pub grand_total: Price,

    /// JSON snapshot of the session bag the order was built from
    #[serde(default)]
    pub original_bag: String,

    /// Payment intent id, empty when unknown
    #[serde(default)]
    pub stripe_pid: String,
}

impl Order {
    /// Create an order with a fresh order number and zero totals
    pub fn new(customer: CustomerDetails, currency: Currency) -> Self {
        Self {
            order_number: generate_order_number(),
            customer,
            date: Utc::now(),
            delivery_cost: Price::zero(currency),
            order_total: Price::zero(currency),
            grand_total: Price::zero(currency),
            original_bag: String::new(),
            stripe_pid: String::new(),
        }
    }

    pub fn with_original_bag(mut self, bag_json: impl Into<String>) -> Self {
        self.original_bag = bag_json.into();
        self
    }

    pub fn with_stripe_pid(mut self, pid: impl Into<String>) -> Self {
        self.stripe_pid = pid.into();
        self
    }

    pub fn currency(&self) -> Currency {
        self.grand_total.currency
    }

    pub fn email(&self) -> &str {
        &self.customer.email
    }

    /// Recompute totals from the order's line items
    pub fn update_total(
        &mut self,
        line_items: &[OrderLineItem],
        delivery: &DeliveryPolicy,
    ) -> CheckoutResult<()> {
        let mut order_total = Price::zero(self.currency());
        for item in line_items {
            order_total = order_total.checked_add(&item.lineitem_total)?;
        }
        self.delivery_cost = delivery.delivery_for(&order_total);
        self.grand_total = order_total.checked_add(&self.delivery_cost)?;
        self.order_total = order_total;
        Ok(())
    }
}

/// Random order number: a v4 UUID as upper-case hex without dashes
pub fn generate_order_number() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// One product (and size) within an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_number: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_size: Option<String>,
    pub quantity: u32,
    /// Product price times quantity at the time of ordering
    pub lineitem_total: Price,
}

impl OrderLineItem {
    pub fn new(order: &Order, product: &Product, quantity: u32, size: Option<&str>) -> Self {
        Self {
            order_number: order.order_number.clone(),
            product_id: product.id.clone(),
            product_size: size.map(str::to_string),
            quantity,
            lineitem_total: product.price.times(quantity),
        }
    }
}
