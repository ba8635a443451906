//! # Checkout Service
//!
//! Turns a session bag and validated customer details into a persisted
//! [`Order`] with its [`OrderLineItem`]s.

use crate::bag::{bag_contents, Bag, BagContents, BagEntry, DeliveryPolicy};
use crate::error::{CheckoutError, CheckoutResult};
use crate::order::{CustomerDetails, Order, OrderLineItem};
use crate::product::{Currency, ProductCatalog};
use crate::store::SharedOrderStore;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Order placement over a catalog and an order store
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<ProductCatalog>,
    orders: SharedOrderStore,
    delivery: DeliveryPolicy,
    currency: Currency,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        orders: SharedOrderStore,
        delivery: DeliveryPolicy,
        currency: Currency,
    ) -> Self {
        Self {
            catalog,
            orders,
            delivery,
            currency,
        }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn orders(&self) -> &SharedOrderStore {
        &self.orders
    }

    pub fn delivery(&self) -> &DeliveryPolicy {
        &self.delivery
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Resolve and total the bag
    pub fn bag_contents(&self, bag: &Bag) -> CheckoutResult<BagContents> {
        bag_contents(bag, &self.catalog, &self.delivery, self.currency)
    }

    /// Persist an order built from the bag.
    ///
    /// The order row is written first, then one line item per bag entry (or per
    /// size). If any entry cannot be reconciled with the catalog the order is
    /// deleted again and the error returned.
    #[instrument(skip(self, bag, details), fields(entries = bag.len()))]
    pub async fn place_order(
        &self,
        bag: &Bag,
        details: CustomerDetails,
        stripe_pid: Option<&str>,
    ) -> CheckoutResult<Order> {
        if bag.is_empty() {
            return Err(CheckoutError::InvalidRequest("bag is empty".to_string()));
        }

        let mut order =
            Order::new(details, self.currency).with_original_bag(serde_json::to_string(bag)?);
        if let Some(pid) = stripe_pid {
            order = order.with_stripe_pid(pid);
        }

        self.orders.insert_order(&order).await?;

        if let Err(err) = self.persist_line_items(&mut order, bag).await {
            warn!(
                "Rolling back order {}: {}",
                order.order_number, err
            );
            if let Err(cleanup) = self.orders.delete_order(&order.order_number).await {
                error!(
                    "Failed to delete order {} after error: {}",
                    order.order_number, cleanup
                );
            }
            return Err(err);
        }

        info!(
            "Placed order {}: {} items, grand_total={}",
            order.order_number,
            bag.product_count(),
            order.grand_total.display()
        );
        Ok(order)
    }

    async fn persist_line_items(&self, order: &mut Order, bag: &Bag) -> CheckoutResult<()> {
        let mut line_items = Vec::new();

        for (item_id, entry) in bag.iter() {
            let product =
                self.catalog
                    .get(item_id)
                    .ok_or_else(|| CheckoutError::ProductNotFound {
                        product_id: item_id.clone(),
                    })?;

            let items: Vec<OrderLineItem> = match entry {
                BagEntry::Quantity(quantity) => {
                    vec![OrderLineItem::new(order, product, *quantity, None)]
                }
                BagEntry::Sized { items_by_size } => items_by_size
                    .iter()
                    .map(|(size, quantity)| {
                        OrderLineItem::new(order, product, *quantity, Some(size.as_str()))
                    })
                    .collect(),
            };

            for item in items {
                self.orders.insert_line_item(&item).await?;
                line_items.push(item);
            }
        }

        order.update_total(&line_items, &self.delivery)?;
        self.orders.update_order(order).await
    }

    /// Load an order and its line items
    pub async fn order_with_items(
        &self,
        order_number: &str,
    ) -> CheckoutResult<(Order, Vec<OrderLineItem>)> {
        let order = self
            .orders
            .get_order(order_number)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound {
                order_number: order_number.to_string(),
            })?;
        let items = self.orders.line_items(order_number).await?;
        Ok((order, items))
    }
}
