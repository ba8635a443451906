//! # Product Types
//!
//! Storefront catalog types.
//! Products are loaded from `config/products.toml`.

use crate::error::{CheckoutError, CheckoutResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
    CHF,
    MXN,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
            Currency::CHF => "chf",
            Currency::MXN => "mxn",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, most others have 2)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the smallest currency unit (cents, etc.)
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }

    fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
            Currency::CHF => "CHF ",
            Currency::MXN => "MX$",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for Currency {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "usd" => Ok(Currency::USD),
            "eur" => Ok(Currency::EUR),
            "gbp" => Ok(Currency::GBP),
            "jpy" => Ok(Currency::JPY),
            "cad" => Ok(Currency::CAD),
            "aud" => Ok(Currency::AUD),
            "chf" => Ok(Currency::CHF),
            "mxn" => Ok(Currency::MXN),
            other => Err(CheckoutError::UnsupportedCurrency {
                currency: other.to_string(),
            }),
        }
    }
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (cents for USD)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Create a new price from decimal amount
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_smallest_unit(amount),
            currency,
        }
    }

    /// Create a price from smallest unit (cents)
    pub fn from_cents(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::from_cents(0, currency)
    }

    /// Get the decimal amount
    pub fn as_decimal(&self) -> f64 {
        self.currency.from_smallest_unit(self.amount)
    }

    /// Unit price multiplied by a quantity
    pub fn times(&self, quantity: u32) -> Price {
        Price {
            amount: self.amount * i64::from(quantity),
            currency: self.currency,
        }
    }

    /// Sum two prices, refusing to mix currencies
    pub fn checked_add(&self, other: &Price) -> CheckoutResult<Price> {
        if self.currency != other.currency {
            return Err(CheckoutError::InvalidPrice {
                message: format!(
                    "cannot add {} to {}",
                    other.currency, self.currency
                ),
            });
        }
        Ok(Price {
            amount: self.amount + other.amount,
            currency: self.currency,
        })
    }

    /// Format for display (e.g., "$10.00")
    pub fn display(&self) -> String {
        let symbol = self.currency.symbol();
        if self.currency.decimal_places() == 0 {
            format!("{}{}", symbol, self.amount)
        } else {
            format!("{}{:.2}", symbol, self.as_decimal())
        }
    }
}

/// A product in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier; bag keys refer to this
    pub id: String,

    /// Stock keeping unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Unit price
    pub price: Price,

    /// Whether the product is sold in sizes (xs, s, m, l, xl)
    #[serde(default)]
    pub has_sizes: bool,

    /// Whether this product is active and available for purchase
    #[serde(default = "default_true")]
    pub active: bool,

    /// Optional category slug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Optional image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Create a new product sold without sizes
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Price) -> Self {
        Self {
            id: id.into(),
            sku: None,
            name: name.into(),
            description: String::new(),
            price,
            has_sizes: false,
            active: true,
            category: None,
            image_url: None,
        }
    }

    /// Builder: mark as sized
    pub fn sized(mut self) -> Self {
        self.has_sizes = true;
        self
    }
}

/// Product catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl ProductCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            products: Vec::new(),
        }
    }

    /// Add a product to the catalog
    pub fn add(&mut self, product: Product) {
        self.products.push(product);
    }

    /// Builder: add a product
    pub fn with_product(mut self, product: Product) -> Self {
        self.add(product);
        self
    }

    /// Find a product by ID
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Get all active products
    pub fn active_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.active)
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Every product must be priced in the currency payments are taken in
    pub fn ensure_currency(&self, currency: Currency) -> CheckoutResult<()> {
        let mismatched: Vec<&str> = self
            .products
            .iter()
            .filter(|p| p.price.currency != currency)
            .map(|p| p.id.as_str())
            .collect();

        if mismatched.is_empty() {
            return Ok(());
        }
        Err(CheckoutError::InvalidPrice {
            message: format!(
                "products {} are not priced in {}",
                mismatched.join(", "),
                currency
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_conversion() {
        let usd = Currency::USD;
        assert_eq!(usd.to_smallest_unit(10.99), 1099);
        assert_eq!(usd.from_smallest_unit(1099), 10.99);

        let jpy = Currency::JPY;
        assert_eq!(jpy.to_smallest_unit(1000.0), 1000);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("GBP".parse::<Currency>().unwrap(), Currency::GBP);
        assert_eq!(" usd ".parse::<Currency>().unwrap(), Currency::USD);
        assert!(matches!(
            "xyz".parse::<Currency>(),
            Err(CheckoutError::UnsupportedCurrency { .. })
        ));
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::new(29.99, Currency::USD).display(), "$29.99");
        assert_eq!(Price::new(19.99, Currency::EUR).display(), "€19.99");
        assert_eq!(Price::from_cents(500, Currency::JPY).display(), "¥500");
    }

    #[test]
    fn test_price_arithmetic() {
        let unit = Price::from_cents(1250, Currency::GBP);
        assert_eq!(unit.times(3).amount, 3750);

        let sum = unit.checked_add(&Price::from_cents(50, Currency::GBP)).unwrap();
        assert_eq!(sum.amount, 1300);

        assert!(unit
            .checked_add(&Price::from_cents(50, Currency::USD))
            .is_err());
    }

    #[test]
    fn test_catalog_from_toml() {
        let catalog = ProductCatalog::from_toml(
            r#"
            [[products]]
            id = "1"
            name = "Arizona Original Bootcut Jeans"
            has_sizes = true
            price = { amount = 4599, currency = "gbp" }

            [[products]]
            id = "2"
            name = "Canvas Tote"
            active = false
            price = { amount = 1200, currency = "gbp" }
            "#,
        )
        .unwrap();

        assert_eq!(catalog.products.len(), 2);
        let jeans = catalog.get("1").unwrap();
        assert!(jeans.has_sizes);
        assert_eq!(jeans.price.amount, 4599);
        assert_eq!(catalog.active_products().count(), 1);
        assert!(catalog.get("3").is_none());
    }

    #[test]
    fn test_catalog_currency_check() {
        let catalog = ProductCatalog::new()
            .with_product(Product::new("1", "Jeans", Price::from_cents(2000, Currency::GBP)))
            .with_product(Product::new("2", "Tote", Price::from_cents(1250, Currency::USD)))
            .with_product(Product::new("3", "Cap", Price::from_cents(900, Currency::USD)));

        assert!(catalog.ensure_currency(Currency::GBP).is_err());
        match catalog.ensure_currency(Currency::GBP) {
            Err(CheckoutError::InvalidPrice { message }) => {
                assert_eq!(message, "products 2, 3 are not priced in GBP");
            }
            other => panic!("expected InvalidPrice, got {:?}", other),
        }

        let gbp_only = ProductCatalog::new()
            .with_product(Product::new("1", "Jeans", Price::from_cents(2000, Currency::GBP)));
        assert!(gbp_only.ensure_currency(Currency::GBP).is_ok());
        assert!(ProductCatalog::new().ensure_currency(Currency::EUR).is_ok());
    }
}
