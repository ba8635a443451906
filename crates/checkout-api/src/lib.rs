//! # checkout-api
//!
//! HTTP layer for the storefront checkout.
//!
//! This crate provides:
//! - Axum-based HTTP server with server-side sessions
//! - Bag and checkout pages rendered as HTML
//! - JSON catalog endpoints
//! - Webhook handler for Stripe payment events
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/products` | Product list page |
//! | GET | `/bag` | Shopping bag |
//! | POST | `/bag/add/{item_id}` | Add to bag |
//! | POST | `/bag/adjust/{item_id}` | Change a bag quantity |
//! | POST | `/bag/remove/{item_id}` | Remove from bag |
//! | GET | `/checkout` | Checkout form |
//! | POST | `/checkout` | Place order |
//! | GET | `/checkout/success/{order_number}` | Order confirmation |
//! | GET | `/api/v1/products` | List products |
//! | GET | `/api/v1/products/{id}` | Get product |
//! | POST | `/webhook/stripe` | Stripe webhook |

pub mod handlers;
pub mod pages;
pub mod routes;
pub mod session;
pub mod state;
pub mod webhooks;

pub use routes::create_router;
pub use session::{SessionData, SessionStore, SESSION_COOKIE};
pub use state::{AppConfig, AppState};
