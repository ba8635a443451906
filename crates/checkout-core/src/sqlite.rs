//! # SQLite Order Store
//!
//! `sqlx`-backed [`OrderStore`] used when `DATABASE_URL` is configured.
//! The schema is created on connect. Money is stored in the smallest currency
//! unit alongside its currency code; dates are RFC 3339 text.

use crate::error::{CheckoutError, CheckoutResult};
use crate::order::{CustomerDetails, Order, OrderLineItem};
use crate::product::{Currency, Price};
use crate::store::OrderStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS orders (
        order_number    TEXT PRIMARY KEY NOT NULL,
        full_name       TEXT NOT NULL,
        email           TEXT NOT NULL,
        phone_number    TEXT NOT NULL,
        country         TEXT NOT NULL,
        postcode        TEXT,
        town_or_city    TEXT NOT NULL,
        street_address1 TEXT NOT NULL,
        street_address2 TEXT,
        county          TEXT,
        date            TEXT NOT NULL,
        currency        TEXT NOT NULL,
        delivery_cost   INTEGER NOT NULL DEFAULT 0,
        order_total     INTEGER NOT NULL DEFAULT 0,
        grand_total     INTEGER NOT NULL DEFAULT 0,
        original_bag    TEXT NOT NULL DEFAULT '',
        stripe_pid      TEXT NOT NULL DEFAULT ''
    )"#,
    r#"CREATE TABLE IF NOT EXISTS order_line_items (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        order_number   TEXT NOT NULL REFERENCES orders(order_number) ON DELETE CASCADE,
        product_id     TEXT NOT NULL,
        product_size   TEXT,
        quantity       INTEGER NOT NULL,
        lineitem_total INTEGER NOT NULL,
        currency       TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_line_items_order ON order_line_items(order_number)",
    "CREATE INDEX IF NOT EXISTS idx_orders_stripe_pid ON orders(stripe_pid)",
];

const ORDER_COLUMNS: &str = "order_number, full_name, email, phone_number, country, postcode, \
     town_or_city, street_address1, street_address2, county, date, currency, \
     delivery_cost, order_total, grand_total, original_bag, stripe_pid";

/// SQLite-backed order store
#[derive(Clone)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Connect to a database URL (e.g. `sqlite://checkout.db`), creating the file if needed
    pub async fn connect(database_url: &str) -> CheckoutResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to order database: {}", database_url);
        Ok(store)
    }

    /// Private in-memory database. A single long-lived connection keeps it alive.
    pub async fn in_memory() -> CheckoutResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> CheckoutResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_number: String,
    full_name: String,
    email: String,
    phone_number: String,
    country: String,
    postcode: Option<String>,
    town_or_city: String,
    street_address1: String,
    street_address2: Option<String>,
    county: Option<String>,
    date: String,
    currency: String,
    delivery_cost: i64,
    order_total: i64,
    grand_total: i64,
    original_bag: String,
    stripe_pid: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = CheckoutError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let currency = Currency::from_str(&row.currency)?;
        let date = DateTime::parse_from_rfc3339(&row.date)
            .map_err(|e| CheckoutError::Storage(format!("bad order date {}: {}", row.date, e)))?
            .with_timezone(&Utc);

        Ok(Order {
            order_number: row.order_number,
            customer: CustomerDetails {
                full_name: row.full_name,
                email: row.email,
                phone_number: row.phone_number,
                country: row.country,
                postcode: row.postcode,
                town_or_city: row.town_or_city,
                street_address1: row.street_address1,
                street_address2: row.street_address2,
                county: row.county,
            },
            date,
            delivery_cost: Price::from_cents(row.delivery_cost, currency),
            order_total: Price::from_cents(row.order_total, currency),
            grand_total: Price::from_cents(row.grand_total, currency),
            original_bag: row.original_bag,
            stripe_pid: row.stripe_pid,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineItemRow {
    order_number: String,
    product_id: String,
    product_size: Option<String>,
    quantity: i64,
    lineitem_total: i64,
    currency: String,
}

impl TryFrom<LineItemRow> for OrderLineItem {
    type Error = CheckoutError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let currency = Currency::from_str(&row.currency)?;
        let quantity = u32::try_from(row.quantity)
            .map_err(|_| CheckoutError::Storage(format!("bad quantity {}", row.quantity)))?;

        Ok(OrderLineItem {
            order_number: row.order_number,
            product_id: row.product_id,
            product_size: row.product_size,
            quantity,
            lineitem_total: Price::from_cents(row.lineitem_total, currency),
        })
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn insert_order(&self, order: &Order) -> CheckoutResult<()> {
        let sql = format!(
            "INSERT INTO orders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ORDER_COLUMNS
        );
        let c = &order.customer;
        sqlx::query(&sql)
            .bind(&order.order_number)
            .bind(&c.full_name)
            .bind(&c.email)
            .bind(&c.phone_number)
            .bind(&c.country)
            .bind(c.postcode.as_deref())
            .bind(&c.town_or_city)
            .bind(&c.street_address1)
            .bind(c.street_address2.as_deref())
            .bind(c.county.as_deref())
            .bind(order.date.to_rfc3339())
            .bind(order.currency().as_str())
            .bind(order.delivery_cost.amount)
            .bind(order.order_total.amount)
            .bind(order.grand_total.amount)
            .bind(&order.original_bag)
            .bind(&order.stripe_pid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> CheckoutResult<()> {
        let c = &order.customer;
        let result = sqlx::query(
            "UPDATE orders SET full_name = ?, email = ?, phone_number = ?, country = ?, \
             postcode = ?, town_or_city = ?, street_address1 = ?, street_address2 = ?, \
             county = ?, currency = ?, delivery_cost = ?, order_total = ?, grand_total = ?, \
             original_bag = ?, stripe_pid = ? WHERE order_number = ?",
        )
        .bind(&c.full_name)
        .bind(&c.email)
        .bind(&c.phone_number)
        .bind(&c.country)
        .bind(c.postcode.as_deref())
        .bind(&c.town_or_city)
        .bind(&c.street_address1)
        .bind(c.street_address2.as_deref())
        .bind(c.county.as_deref())
        .bind(order.currency().as_str())
        .bind(order.delivery_cost.amount)
        .bind(order.order_total.amount)
        .bind(order.grand_total.amount)
        .bind(&order.original_bag)
        .bind(&order.stripe_pid)
        .bind(&order.order_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CheckoutError::OrderNotFound {
                order_number: order.order_number.clone(),
            });
        }
        Ok(())
    }

    async fn delete_order(&self, order_number: &str) -> CheckoutResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM order_line_items WHERE order_number = ?")
            .bind(order_number)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM orders WHERE order_number = ?")
            .bind(order_number)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_order(&self, order_number: &str) -> CheckoutResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = ?", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn insert_line_item(&self, item: &OrderLineItem) -> CheckoutResult<()> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT order_number FROM orders WHERE order_number = ?")
                .bind(&item.order_number)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Err(CheckoutError::OrderNotFound {
                order_number: item.order_number.clone(),
            });
        }

        sqlx::query(
            "INSERT INTO order_line_items \
             (order_number, product_id, product_size, quantity, lineitem_total, currency) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.order_number)
        .bind(&item.product_id)
        .bind(item.product_size.as_deref())
        .bind(i64::from(item.quantity))
        .bind(item.lineitem_total.amount)
        .bind(item.lineitem_total.currency.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn line_items(&self, order_number: &str) -> CheckoutResult<Vec<OrderLineItem>> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            "SELECT order_number, product_id, product_size, quantity, lineitem_total, currency \
             FROM order_line_items WHERE order_number = ? ORDER BY id",
        )
        .bind(order_number)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderLineItem::try_from).collect()
    }

    async fn find_by_payment_intent(&self, pid: &str) -> CheckoutResult<Option<Order>> {
        if pid.is_empty() {
            return Ok(None);
        }
        let sql = format!("SELECT {} FROM orders WHERE stripe_pid = ? LIMIT 1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(pid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::DeliveryPolicy;
    use crate::order::tests::customer;
    use crate::product::Product;

    #[tokio::test]
    async fn test_round_trip_order_with_items() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let mut order = Order::new(customer(), Currency::GBP)
            .with_original_bag(r#"{"2":2}"#)
            .with_stripe_pid("pi_abc");
        store.insert_order(&order).await.unwrap();

        let tote = Product::new("2", "Canvas Tote", Price::from_cents(1250, Currency::GBP));
        let jeans = Product::new("1", "Bootcut Jeans", Price::from_cents(2000, Currency::GBP));
        let items = vec![
            OrderLineItem::new(&order, &tote, 2, None),
            OrderLineItem::new(&order, &jeans, 1, Some("m")),
        ];
        for item in &items {
            store.insert_line_item(item).await.unwrap();
        }

        order.update_total(&items, &DeliveryPolicy::default()).unwrap();
        store.update_order(&order).await.unwrap();

        let fetched = store.get_order(&order.order_number).await.unwrap().unwrap();
        assert_eq!(fetched.customer, order.customer);
        assert_eq!(fetched.grand_total, order.grand_total);
        assert_eq!(fetched.original_bag, r#"{"2":2}"#);
        assert_eq!(fetched.date.timestamp(), order.date.timestamp());

        let stored_items = store.line_items(&order.order_number).await.unwrap();
        assert_eq!(stored_items, items);

        let by_pid = store.find_by_payment_intent("pi_abc").await.unwrap().unwrap();
        assert_eq!(by_pid.order_number, order.order_number);
    }

    #[tokio::test]
    async fn test_delete_removes_line_items() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let order = Order::new(customer(), Currency::GBP);
        store.insert_order(&order).await.unwrap();

        let tote = Product::new("2", "Canvas Tote", Price::from_cents(1250, Currency::GBP));
        store
            .insert_line_item(&OrderLineItem::new(&order, &tote, 1, None))
            .await
            .unwrap();

        assert!(store.delete_order(&order.order_number).await.unwrap());
        assert!(store.get_order(&order.order_number).await.unwrap().is_none());
        assert!(store.line_items(&order.order_number).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let order = Order::new(customer(), Currency::GBP);

        let err = store.update_order(&order).await.unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound { .. }));
    }
}
