//! # Order Store
//!
//! Persistence port for orders and their line items, plus an in-memory
//! implementation used when no database is configured.

use crate::error::{CheckoutError, CheckoutResult};
use crate::order::{Order, OrderLineItem};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage for orders and line items.
///
/// Deleting an order deletes its line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> CheckoutResult<()>;

    /// Overwrite an existing order's fields (totals, payment id)
    async fn update_order(&self, order: &Order) -> CheckoutResult<()>;

    /// Returns whether an order was deleted
    async fn delete_order(&self, order_number: &str) -> CheckoutResult<bool>;

    async fn get_order(&self, order_number: &str) -> CheckoutResult<Option<Order>>;

    async fn insert_line_item(&self, item: &OrderLineItem) -> CheckoutResult<()>;

    /// Line items of an order, in insertion order
    async fn line_items(&self, order_number: &str) -> CheckoutResult<Vec<OrderLineItem>>;

    async fn find_by_payment_intent(&self, pid: &str) -> CheckoutResult<Option<Order>>;
}

/// Type alias for a shared order store (dynamic dispatch)
pub type SharedOrderStore = Arc<dyn OrderStore>;

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    line_items: HashMap<String, Vec<OrderLineItem>>,
}

/// Thread-safe in-memory order store.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> CheckoutResult<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.order_number) {
            return Err(CheckoutError::Storage(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }
        tables
            .orders
            .insert(order.order_number.clone(), order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> CheckoutResult<()> {
        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&order.order_number) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(CheckoutError::OrderNotFound {
                order_number: order.order_number.clone(),
            }),
        }
    }

    async fn delete_order(&self, order_number: &str) -> CheckoutResult<bool> {
        let mut tables = self.tables.write().await;
        tables.line_items.remove(order_number);
        Ok(tables.orders.remove(order_number).is_some())
    }

    async fn get_order(&self, order_number: &str) -> CheckoutResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(order_number).cloned())
    }

    async fn insert_line_item(&self, item: &OrderLineItem) -> CheckoutResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&item.order_number) {
            return Err(CheckoutError::OrderNotFound {
                order_number: item.order_number.clone(),
            });
        }
        tables
            .line_items
            .entry(item.order_number.clone())
            .or_default()
            .push(item.clone());
        Ok(())
    }

    async fn line_items(&self, order_number: &str) -> CheckoutResult<Vec<OrderLineItem>> {
        Ok(self
            .tables
            .read()
            .await
            .line_items
            .get(order_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_payment_intent(&self, pid: &str) -> CheckoutResult<Option<Order>> {
        if pid.is_empty() {
            return Ok(None);
        }
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .find(|o| o.stripe_pid == pid)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::customer;
    use crate::product::{Currency, Price, Product};

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order = Order::new(customer(), Currency::GBP).with_stripe_pid("pi_123");

        store.insert_order(&order).await.unwrap();

        let fetched = store.get_order(&order.order_number).await.unwrap().unwrap();
        assert_eq!(fetched.email(), "ada@example.com");
        assert!(store.get_order("missing").await.unwrap().is_none());

        let by_pid = store.find_by_payment_intent("pi_123").await.unwrap();
        assert_eq!(by_pid.map(|o| o.order_number), Some(order.order_number));
        assert!(store.find_by_payment_intent("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades_line_items() {
        let store = InMemoryOrderStore::new();
        let order = Order::new(customer(), Currency::GBP);
        let product = Product::new("2", "Canvas Tote", Price::from_cents(1250, Currency::GBP));

        store.insert_order(&order).await.unwrap();
        store
            .insert_line_item(&OrderLineItem::new(&order, &product, 2, None))
            .await
            .unwrap();
        assert_eq!(store.line_items(&order.order_number).await.unwrap().len(), 1);

        assert!(store.delete_order(&order.order_number).await.unwrap());
        assert!(store.line_items(&order.order_number).await.unwrap().is_empty());
        assert!(!store.delete_order(&order.order_number).await.unwrap());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_line_item_requires_order() {
        let store = InMemoryOrderStore::new();
        let order = Order::new(customer(), Currency::GBP);
        let product = Product::new("2", "Canvas Tote", Price::from_cents(1250, Currency::GBP));

        let err = store
            .insert_line_item(&OrderLineItem::new(&order, &product, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound { .. }));
    }
}
