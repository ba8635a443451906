//! # Routes
//!
//! Axum router configuration for the storefront.

use crate::handlers;
use crate::session::session_layer;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Pages (session cookie):
///   - GET  /products - Product list
///   - GET  /bag - Shopping bag
///   - POST /bag/add/{item_id}, /bag/adjust/{item_id}, /bag/remove/{item_id}
///   - GET  /checkout - Checkout form with a fresh payment intent
///   - POST /checkout - Place the order
///   - GET  /checkout/success/{order_number} - Confirmation
///
/// - API:
///   - GET /api/v1/products - List active products
///   - GET /api/v1/products/{id} - Get product by ID
///
/// - Webhooks:
///   - POST /webhook/stripe - Stripe webhook handler
pub fn create_router(state: AppState) -> Router {
    // The JSON catalog is readable cross-origin; pages are not
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let page_routes = Router::new()
        .route("/products", get(handlers::products_page))
        .route("/bag", get(handlers::view_bag))
        .route("/bag/add/{item_id}", post(handlers::add_to_bag))
        .route("/bag/adjust/{item_id}", post(handlers::adjust_bag))
        .route("/bag/remove/{item_id}", post(handlers::remove_from_bag))
        .route("/checkout", get(handlers::checkout).post(handlers::checkout_submit))
        .route(
            "/checkout/success/{order_number}",
            get(handlers::checkout_success),
        )
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session_layer,
        ));

    let api_routes = Router::new()
        .route("/products", get(handlers::list_products))
        .route("/products/{product_id}", get(handlers::get_product))
        .layer(cors);

    // Webhook routes (no CORS, must accept raw body)
    let webhook_routes = Router::new().route("/stripe", post(handlers::stripe_webhook));

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .merge(page_routes)
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
