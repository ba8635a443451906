//! # Shopping Bag
//!
//! The bag lives in session state, not in the database. It maps a product id
//! to either a plain quantity or, for sized products, a map of size to quantity:
//!
//! ```json
//! { "1": 2, "7": { "items_by_size": { "m": 1, "l": 2 } } }
//! ```
//!
//! [`bag_contents`] resolves every entry against the catalog and computes the
//! totals the bag page and checkout need.

use crate::error::{CheckoutError, CheckoutResult};
use crate::product::{Currency, Price, Product, ProductCatalog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bag entry: a quantity, or quantities keyed by size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BagEntry {
    Quantity(u32),
    Sized { items_by_size: BTreeMap<String, u32> },
}

impl BagEntry {
    /// Total units held by this entry
    pub fn quantity(&self) -> u32 {
        match self {
            BagEntry::Quantity(q) => *q,
            BagEntry::Sized { items_by_size } => items_by_size.values().sum(),
        }
    }
}

/// Session bag keyed by product id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bag {
    items: BTreeMap<String, BagEntry>,
}

impl Bag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct product entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Sum of every quantity in the bag
    pub fn product_count(&self) -> u32 {
        self.items.values().map(BagEntry::quantity).sum()
    }

    pub fn get(&self, item_id: &str) -> Option<&BagEntry> {
        self.items.get(item_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BagEntry)> {
        self.items.iter()
    }

    /// Units of one product, or of one size of it
    pub fn quantity_of(&self, item_id: &str, size: Option<&str>) -> u32 {
        match (self.items.get(item_id), size) {
            (Some(BagEntry::Quantity(q)), None) => *q,
            (Some(BagEntry::Sized { items_by_size }), Some(size)) => {
                items_by_size.get(size).copied().unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Drop entries whose product id fails `keep`; returns the dropped ids
    pub fn retain_products(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.items.retain(|id, _| {
            let kept = keep(id);
            if !kept {
                dropped.push(id.clone());
            }
            kept
        });
        dropped
    }

    /// Add units of a product, merging with what is already there.
    ///
    /// An entry of the other shape (sized vs. plain) is replaced.
    pub fn add(&mut self, item_id: &str, quantity: u32, size: Option<&str>) {
        match size {
            Some(size) => {
                let entry = self
                    .items
                    .entry(item_id.to_string())
                    .or_insert_with(|| BagEntry::Sized {
                        items_by_size: BTreeMap::new(),
                    });
                if let BagEntry::Quantity(_) = entry {
                    *entry = BagEntry::Sized {
                        items_by_size: BTreeMap::new(),
                    };
                }
                if let BagEntry::Sized { items_by_size } = entry {
                    *items_by_size.entry(size.to_string()).or_insert(0) += quantity;
                }
            }
            None => {
                let entry = self
                    .items
                    .entry(item_id.to_string())
                    .or_insert(BagEntry::Quantity(0));
                match entry {
                    BagEntry::Quantity(q) => *q += quantity,
                    BagEntry::Sized { .. } => *entry = BagEntry::Quantity(quantity),
                }
            }
        }
    }

    /// Set the quantity of a product (or one of its sizes). Zero removes it.
    pub fn adjust(&mut self, item_id: &str, quantity: u32, size: Option<&str>) {
        if quantity == 0 {
            self.remove(item_id, size);
            return;
        }
        match size {
            Some(size) => {
                let entry = self
                    .items
                    .entry(item_id.to_string())
                    .or_insert_with(|| BagEntry::Sized {
                        items_by_size: BTreeMap::new(),
                    });
                match entry {
                    BagEntry::Sized { items_by_size } => {
                        items_by_size.insert(size.to_string(), quantity);
                    }
                    BagEntry::Quantity(_) => {
                        *entry = BagEntry::Sized {
                            items_by_size: BTreeMap::from([(size.to_string(), quantity)]),
                        };
                    }
                }
            }
            None => {
                self.items
                    .insert(item_id.to_string(), BagEntry::Quantity(quantity));
            }
        }
    }

    /// Remove a product, or only one size of it. Returns whether anything was removed.
    pub fn remove(&mut self, item_id: &str, size: Option<&str>) -> bool {
        let Some(size) = size else {
            return self.items.remove(item_id).is_some();
        };

        let Some(BagEntry::Sized { items_by_size }) = self.items.get_mut(item_id) else {
            return false;
        };
        let removed = items_by_size.remove(size).is_some();
        if items_by_size.is_empty() {
            self.items.remove(item_id);
        }
        removed
    }
}

/// Delivery pricing rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryPolicy {
    /// Orders at or above this decimal amount ship free
    pub free_delivery_threshold: f64,
    /// Percentage of the subtotal charged for delivery below the threshold
    pub standard_delivery_percentage: u32,
}

impl DeliveryPolicy {
    pub fn new(free_delivery_threshold: f64, standard_delivery_percentage: u32) -> Self {
        Self {
            free_delivery_threshold,
            standard_delivery_percentage,
        }
    }

    /// Threshold expressed in the given currency
    pub fn threshold(&self, currency: Currency) -> Price {
        Price::new(self.free_delivery_threshold, currency)
    }

    /// Delivery charge for a subtotal, rounded half-up to the smallest unit
    pub fn delivery_for(&self, total: &Price) -> Price {
        let threshold = self.threshold(total.currency);
        if total.amount >= threshold.amount {
            return Price::zero(total.currency);
        }
        let pct = i64::from(self.standard_delivery_percentage);
        Price::from_cents((total.amount * pct + 50) / 100, total.currency)
    }

    /// How much more must be spent to reach free delivery
    pub fn free_delivery_delta(&self, total: &Price) -> Price {
        let threshold = self.threshold(total.currency);
        Price::from_cents((threshold.amount - total.amount).max(0), total.currency)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::new(50.0, 10)
    }
}

/// A resolved bag line, one per plain entry or per size
#[derive(Debug, Clone, Serialize)]
pub struct BagItem {
    pub item_id: String,
    pub quantity: u32,
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl BagItem {
    pub fn subtotal(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Everything the bag and checkout pages show about the bag
#[derive(Debug, Clone, Serialize)]
pub struct BagContents {
    pub bag_items: Vec<BagItem>,
    pub total: Price,
    pub product_count: u32,
    pub delivery: Price,
    pub free_delivery_delta: Price,
    pub free_delivery_threshold: Price,
    pub grand_total: Price,
}

impl BagContents {
    pub fn is_empty(&self) -> bool {
        self.bag_items.is_empty()
    }
}

/// Resolve the bag against the catalog and total it up.
///
/// Fails with [`CheckoutError::ProductNotFound`] when an entry names a product
/// the catalog does not have, and with [`CheckoutError::InvalidPrice`] when a
/// product is priced in a currency other than `currency`.
pub fn bag_contents(
    bag: &Bag,
    catalog: &ProductCatalog,
    delivery: &DeliveryPolicy,
    currency: Currency,
) -> CheckoutResult<BagContents> {
    let mut bag_items = Vec::new();
    let mut total = Price::zero(currency);
    let mut product_count = 0;

    for (item_id, entry) in bag.iter() {
        let product = catalog
            .get(item_id)
            .ok_or_else(|| CheckoutError::ProductNotFound {
                product_id: item_id.clone(),
            })?;

        match entry {
            BagEntry::Quantity(quantity) => {
                total = total.checked_add(&product.price.times(*quantity))?;
                product_count += quantity;
                bag_items.push(BagItem {
                    item_id: item_id.clone(),
                    quantity: *quantity,
                    product: product.clone(),
                    size: None,
                });
            }
            BagEntry::Sized { items_by_size } => {
                for (size, quantity) in items_by_size {
                    total = total.checked_add(&product.price.times(*quantity))?;
                    product_count += quantity;
                    bag_items.push(BagItem {
                        item_id: item_id.clone(),
                        quantity: *quantity,
                        product: product.clone(),
                        size: Some(size.clone()),
                    });
                }
            }
        }
    }

    let delivery_cost = delivery.delivery_for(&total);
    let grand_total = total.checked_add(&delivery_cost)?;

    Ok(BagContents {
        bag_items,
        total,
        product_count,
        delivery: delivery_cost,
        free_delivery_delta: delivery.free_delivery_delta(&total),
        free_delivery_threshold: delivery.threshold(currency),
        grand_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ProductCatalog {
        ProductCatalog::new()
            .with_product(Product::new("1", "Bootcut Jeans", Price::from_cents(2000, Currency::GBP)).sized())
            .with_product(Product::new("2", "Canvas Tote", Price::from_cents(1250, Currency::GBP)))
            .with_product(Product::new("3", "Wool Coat", Price::from_cents(8999, Currency::GBP)))
    }

    #[test]
    fn test_bag_json_shape() {
        let bag: Bag =
            serde_json::from_str(r#"{"2": 3, "1": {"items_by_size": {"m": 1, "l": 2}}}"#).unwrap();

        assert_eq!(bag.get("2"), Some(&BagEntry::Quantity(3)));
        assert_eq!(bag.get("1").map(BagEntry::quantity), Some(3));
        assert_eq!(bag.product_count(), 6);

        let json = serde_json::to_value(&bag).unwrap();
        assert_eq!(json["1"]["items_by_size"]["l"], 2);
        assert_eq!(json["2"], 3);
    }

    #[test]
    fn test_quantity_of_and_retain() {
        let mut bag: Bag =
            serde_json::from_str(r#"{"2": 3, "1": {"items_by_size": {"m": 1}}, "404": 1}"#).unwrap();

        assert_eq!(bag.quantity_of("2", None), 3);
        assert_eq!(bag.quantity_of("1", Some("m")), 1);
        assert_eq!(bag.quantity_of("1", Some("xl")), 0);
        assert_eq!(bag.quantity_of("1", None), 0);

        let catalog = catalog();
        let dropped = bag.retain_products(|id| catalog.get(id).is_some());
        assert_eq!(dropped, vec!["404".to_string()]);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_add_merges_quantities() {
        let mut bag = Bag::new();
        bag.add("2", 1, None);
        bag.add("2", 2, None);
        bag.add("1", 1, Some("m"));
        bag.add("1", 1, Some("m"));
        bag.add("1", 4, Some("s"));

        assert_eq!(bag.get("2"), Some(&BagEntry::Quantity(3)));
        match bag.get("1") {
            Some(BagEntry::Sized { items_by_size }) => {
                assert_eq!(items_by_size.get("m"), Some(&2));
                assert_eq!(items_by_size.get("s"), Some(&4));
            }
            other => panic!("expected sized entry, got {:?}", other),
        }
    }

    #[test]
    fn test_adjust_and_remove() {
        let mut bag = Bag::new();
        bag.add("1", 1, Some("m"));
        bag.add("1", 1, Some("l"));
        bag.add("2", 5, None);

        bag.adjust("2", 2, None);
        assert_eq!(bag.get("2"), Some(&BagEntry::Quantity(2)));

        bag.adjust("1", 0, Some("m"));
        assert_eq!(bag.get("1").map(BagEntry::quantity), Some(1));

        assert!(bag.remove("1", Some("l")));
        assert!(bag.get("1").is_none(), "entry with no sizes left is dropped");

        assert!(!bag.remove("1", None));
        assert!(bag.remove("2", None));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_bag_contents_below_threshold() {
        let mut bag = Bag::new();
        bag.add("2", 2, None);

        let contents =
            bag_contents(&bag, &catalog(), &DeliveryPolicy::default(), Currency::GBP).unwrap();

        assert_eq!(contents.total.amount, 2500);
        assert_eq!(contents.delivery.amount, 250);
        assert_eq!(contents.free_delivery_delta.amount, 2500);
        assert_eq!(contents.grand_total.amount, 2750);
        assert_eq!(contents.product_count, 2);
    }

    #[test]
    fn test_bag_contents_sized_and_free_delivery() {
        let mut bag = Bag::new();
        bag.add("1", 1, Some("m"));
        bag.add("1", 2, Some("l"));
        bag.add("3", 1, None);

        let contents =
            bag_contents(&bag, &catalog(), &DeliveryPolicy::default(), Currency::GBP).unwrap();

        assert_eq!(contents.bag_items.len(), 3);
        assert_eq!(contents.total.amount, 3 * 2000 + 8999);
        assert_eq!(contents.delivery.amount, 0);
        assert_eq!(contents.free_delivery_delta.amount, 0);
        assert_eq!(contents.grand_total.amount, contents.total.amount);
    }

    #[test]
    fn test_bag_contents_unknown_product() {
        let mut bag = Bag::new();
        bag.add("999", 1, None);

        let err = bag_contents(&bag, &catalog(), &DeliveryPolicy::default(), Currency::GBP)
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound { product_id } if product_id == "999"));
    }

    #[test]
    fn test_delivery_rounds_half_up() {
        let policy = DeliveryPolicy::new(50.0, 10);
        assert_eq!(policy.delivery_for(&Price::from_cents(1005, Currency::USD)).amount, 101);
        assert_eq!(policy.delivery_for(&Price::from_cents(1004, Currency::USD)).amount, 100);
        assert_eq!(policy.delivery_for(&Price::from_cents(5000, Currency::USD)).amount, 0);
    }
}
