//! # Stripe Configuration
//!
//! Configuration management for the Stripe integration.
//! All secrets are loaded from environment variables.

use checkout_core::{CheckoutError, Currency};
use std::env;
use std::str::FromStr;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_API_VERSION: &str = "2024-12-18.acacia";

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub secret_key: String,

    /// Publishable key handed to the browser (pk_test_... or pk_live_...)
    pub public_key: Option<String>,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: Option<String>,

    /// Currency every payment intent is created in
    pub currency: Currency,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `STRIPE_SECRET_KEY`
    ///
    /// Optional env vars:
    /// - `STRIPE_PUBLIC_KEY` (the checkout page warns when missing)
    /// - `STRIPE_WEBHOOK_SECRET` (webhooks are rejected when missing)
    /// - `STRIPE_CURRENCY` (defaults to `usd`)
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CheckoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret_key = non_empty("STRIPE_SECRET_KEY").ok_or_else(|| {
            CheckoutError::Configuration("STRIPE_SECRET_KEY not set".to_string())
        })?;

        // Validate key formats
        if !secret_key.starts_with("sk_test_") && !secret_key.starts_with("sk_live_") {
            return Err(CheckoutError::Configuration(
                "STRIPE_SECRET_KEY must start with sk_test_ or sk_live_".to_string(),
            ));
        }

        let public_key = non_empty("STRIPE_PUBLIC_KEY");
        if let Some(ref key) = public_key {
            if !key.starts_with("pk_test_") && !key.starts_with("pk_live_") {
                return Err(CheckoutError::Configuration(
                    "STRIPE_PUBLIC_KEY must start with pk_test_ or pk_live_".to_string(),
                ));
            }
        }

        let webhook_secret = non_empty("STRIPE_WEBHOOK_SECRET");
        if let Some(ref secret) = webhook_secret {
            if !secret.starts_with("whsec_") {
                return Err(CheckoutError::Configuration(
                    "STRIPE_WEBHOOK_SECRET must start with whsec_".to_string(),
                ));
            }
        }

        let currency = match non_empty("STRIPE_CURRENCY") {
            Some(code) => Currency::from_str(&code)?,
            None => Currency::USD,
        };

        Ok(Self {
            secret_key,
            public_key,
            webhook_secret,
            currency,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(secret_key: impl Into<String>, currency: Currency) -> Self {
        Self {
            secret_key: secret_key.into(),
            public_key: None,
            webhook_secret: None,
            currency,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Builder: set publishable key
    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Builder: set webhook signing secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    /// Check if using live keys
    pub fn is_live_mode(&self) -> bool {
        self.secret_key.starts_with("sk_live_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }
}
