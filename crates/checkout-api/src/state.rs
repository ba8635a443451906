//! # Application State
//!
//! Shared state for the Axum application.
//! Contains the payment strategy, checkout service, sessions and configuration.

use crate::session::SessionStore;
use anyhow::Context;
use checkout_core::{
    BoxedPaymentStrategy, CheckoutService, Currency, DeliveryPolicy, InMemoryOrderStore, ProductCatalog,
    SharedOrderStore, SqliteOrderStore,
};
use checkout_stripe::{StripeConfig, StripePaymentIntentStrategy};
use std::sync::Arc;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// SQLite URL for orders; in-memory storage when unset
    pub database_url: Option<String>,
    /// Product catalog TOML; searched for under `config/` when unset
    pub catalog_path: Option<String>,
    /// Orders at or above this amount ship free
    pub free_delivery_threshold: f64,
    /// Delivery charge below the threshold, as a percentage of the subtotal
    pub standard_delivery_percentage: u32,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DeliveryPolicy::default();

        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            base_url: lookup("BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            catalog_path: lookup("CATALOG_PATH").filter(|v| !v.is_empty()),
            free_delivery_threshold: lookup("FREE_DELIVERY_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.free_delivery_threshold),
            standard_delivery_percentage: lookup("STANDARD_DELIVERY_PERCENTAGE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.standard_delivery_percentage),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::new(self.free_delivery_threshold, self.standard_delivery_percentage)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment gateway
    pub payments: BoxedPaymentStrategy,
    /// Catalog, order store and delivery rules
    pub checkout: CheckoutService,
    /// Browser sessions
    pub sessions: SessionStore,
    /// Publishable key rendered into the checkout page
    pub stripe_public_key: Option<String>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create the state from the environment with the Stripe strategy
    pub async fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let stripe_config = StripeConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load Stripe config: {}", e))?;
        let currency = stripe_config.currency;
        let stripe_public_key = stripe_config.public_key.clone();
        if stripe_public_key.is_none() {
            warn!("STRIPE_PUBLIC_KEY is not set; the checkout page cannot take card payments");
        }

        let stripe = StripePaymentIntentStrategy::new(stripe_config)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;

        let catalog = load_product_catalog(config.catalog_path.as_deref(), currency)?;
        let orders = open_order_store(config.database_url.as_deref()).await?;

        let checkout = CheckoutService::new(
            Arc::new(catalog),
            orders,
            config.delivery_policy(),
            currency,
        );

        Ok(Self::from_parts(
            config,
            Arc::new(stripe),
            checkout,
            stripe_public_key,
        ))
    }

    /// Assemble state from already-built parts
    pub fn from_parts(
        config: AppConfig,
        payments: BoxedPaymentStrategy,
        checkout: CheckoutService,
        stripe_public_key: Option<String>,
    ) -> Self {
        let sessions = SessionStore::new().with_secure_cookies(config.is_production());
        Self {
            payments,
            checkout,
            sessions,
            stripe_public_key,
            config,
        }
    }
}

async fn open_order_store(database_url: Option<&str>) -> anyhow::Result<SharedOrderStore> {
    match database_url {
        Some(url) => {
            let store = SqliteOrderStore::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open order database: {}", e))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, orders are kept in memory");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

/// Load the product catalog and check it is priced in the payment currency
fn load_product_catalog(path: Option<&str>, currency: Currency) -> anyhow::Result<ProductCatalog> {
    let catalog = read_product_catalog(path)?;
    catalog
        .ensure_currency(currency)
        .map_err(|e| anyhow::anyhow!("Catalog does not match STRIPE_CURRENCY: {}", e))?;
    Ok(catalog)
}

fn read_product_catalog(path: Option<&str>) -> anyhow::Result<ProductCatalog> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path))?;
        let catalog = ProductCatalog::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
        info!("Loaded {} products from {}", catalog.products.len(), path);
        return Ok(catalog);
    }

    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ProductCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            info!("Loaded {} products from {}", catalog.products.len(), path);
            return Ok(catalog);
        }
    }

    // Return empty catalog if no config found
    warn!("No product catalog found, using empty catalog");
    Ok(ProductCatalog::new())
}
