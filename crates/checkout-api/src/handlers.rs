//! # Request Handlers
//!
//! Axum request handlers for the storefront: catalog, bag, checkout and the
//! Stripe webhook.

use crate::pages::{self, CheckoutPage};
use crate::session::{MessageLevel, Session};
use crate::state::AppState;
use crate::webhooks::OrderWebhookHandler;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use checkout_core::{
    payment_intent_id_from_client_secret, Bag, BagContents, CheckoutError, FieldErrors,
    OrderForm, PaymentIntentRequest, Product,
};
use checkout_stripe::dispatch_webhook_event;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

pub const EMPTY_BAG_MESSAGE: &str = "There's nothing in your bag at the moment";
pub const MISSING_PRODUCT_MESSAGE: &str =
    "One of the products in your bag wasn't found in our database. Please call us for assistance!";
pub const INVALID_FORM_MESSAGE: &str =
    "There was an error with your form. Please double check your information.";
pub const MISSING_PUBLIC_KEY_MESSAGE: &str =
    "Stripe public key is missing. Did you forget to set it in your environment?";

const MAX_QUANTITY: u32 = 99;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Bag add/adjust/remove form
#[derive(Debug, Deserialize)]
pub struct BagForm {
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub product_size: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl BagForm {
    fn size(&self) -> Option<&str> {
        self.product_size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Posted checkout form
#[derive(Debug, Deserialize)]
pub struct CheckoutSubmission {
    #[serde(flatten)]
    pub form: OrderForm,
    #[serde(default)]
    pub client_secret: String,
    /// Present only when the checkbox is ticked
    #[serde(default, rename = "save-info")]
    pub save_info: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn checkout_error_to_response(err: CheckoutError) -> ApiError {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if err.is_retryable() {
        response = response.with_details("retryable");
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    checkout_error_to_response(CheckoutError::InvalidRequest(message.into()))
}

/// Only same-site paths are followed after adding to the bag
fn safe_redirect(target: Option<&str>) -> &str {
    match target {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => url,
        _ => "/bag",
    }
}

fn describe(product: &Product, size: Option<&str>) -> String {
    match size {
        Some(size) => format!("size {} {}", size.to_uppercase(), product.name),
        None => product.name.clone(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storefront-checkout",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Get products list
pub async fn list_products(State(state): State<AppState>) -> impl IntoResponse {
    let products: Vec<_> = state.checkout.catalog().active_products().collect();
    Json(serde_json::json!({
        "products": products,
        "count": products.len()
    }))
}

/// Get single product
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .checkout
        .catalog()
        .get(&product_id)
        .ok_or_else(|| checkout_error_to_response(CheckoutError::ProductNotFound { product_id }))?;

    Ok(Json(product.clone()))
}

/// Product list page
pub async fn products_page(State(state): State<AppState>, session: Session) -> Html<String> {
    let products: Vec<_> = state.checkout.catalog().active_products().collect();
    let messages = session.take_messages().await;
    Html(pages::products_page(&products, &messages))
}

/// Bag page. Entries for products no longer in the catalog are dropped.
#[instrument(skip(state, session), fields(session = ?session.id()))]
pub async fn view_bag(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let catalog = state.checkout.catalog();
    let (bag, dropped) = session
        .update_existing(|data| {
            let dropped = data.bag.retain_products(|id| catalog.get(id).is_some());
            (data.bag.clone(), dropped)
        })
        .await;
    if !dropped.is_empty() {
        warn!("Dropped unknown products from bag: {:?}", dropped);
        session
            .flash(
                MessageLevel::Warning,
                "Some items in your bag are no longer available and were removed.",
            )
            .await;
    }

    let contents = state
        .checkout
        .bag_contents(&bag)
        .map_err(checkout_error_to_response)?;
    let messages = session.take_messages().await;
    Ok(Html(pages::bag_page(&contents, &messages)))
}

fn product_for_bag<'a>(
    state: &'a AppState,
    item_id: &str,
    size: Option<&str>,
) -> Result<&'a Product, ApiError> {
    let product = state
        .checkout
        .catalog()
        .get(item_id)
        .filter(|p| p.active)
        .ok_or_else(|| {
            checkout_error_to_response(CheckoutError::ProductNotFound {
                product_id: item_id.to_string(),
            })
        })?;

    match (product.has_sizes, size) {
        (true, None) => Err(bad_request(format!("{} requires a size", product.name))),
        (false, Some(_)) => Err(bad_request(format!("{} does not come in sizes", product.name))),
        _ => Ok(product),
    }
}

/// Add a quantity of a product to the bag
#[instrument(skip(state, session, form), fields(session = ?session.id()))]
pub async fn add_to_bag(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<String>,
    Form(form): Form<BagForm>,
) -> Result<Redirect, ApiError> {
    let size = form.size();
    if !(1..=MAX_QUANTITY).contains(&form.quantity) {
        return Err(bad_request(format!(
            "Quantity must be between 1 and {}",
            MAX_QUANTITY
        )));
    }
    let product = product_for_bag(&state, &item_id, size)?;

    let (existing, updated) = session
        .update(|data| {
            let existing = data.bag.quantity_of(&item_id, size);
            data.bag.add(&item_id, form.quantity, size);
            (existing, data.bag.quantity_of(&item_id, size))
        })
        .await;

    let text = if existing > 0 {
        format!("Updated {} quantity to {}", describe(product, size), updated)
    } else {
        format!("Added {} to your bag", describe(product, size))
    };
    info!("{}", text);
    session.flash(MessageLevel::Success, text).await;

    Ok(Redirect::to(safe_redirect(form.redirect_url.as_deref())))
}

/// Set the quantity of a bag entry; zero removes it
#[instrument(skip(state, session, form), fields(session = ?session.id()))]
pub async fn adjust_bag(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<String>,
    Form(form): Form<BagForm>,
) -> Result<Redirect, ApiError> {
    let size = form.size();
    if form.quantity > MAX_QUANTITY {
        return Err(bad_request(format!(
            "Quantity must be between 0 and {}",
            MAX_QUANTITY
        )));
    }
    let product = product_for_bag(&state, &item_id, size)?;

    session
        .update(|data| data.bag.adjust(&item_id, form.quantity, size))
        .await;

    let text = if form.quantity == 0 {
        format!("Removed {} from your bag", describe(product, size))
    } else {
        format!("Updated {} quantity to {}", describe(product, size), form.quantity)
    };
    session.flash(MessageLevel::Success, text).await;

    Ok(Redirect::to("/bag"))
}

/// Remove a bag entry, or one size of it
#[instrument(skip(state, session, form), fields(session = ?session.id()))]
pub async fn remove_from_bag(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<String>,
    Form(form): Form<BagForm>,
) -> Redirect {
    let size = form.size();
    let removed = session
        .update_existing(|data| data.bag.remove(&item_id, size))
        .await;

    if removed {
        let name = state
            .checkout
            .catalog()
            .get(&item_id)
            .map(|p| describe(p, size))
            .unwrap_or_else(|| "item".to_string());
        session
            .flash(MessageLevel::Success, format!("Removed {} from your bag", name))
            .await;
    } else {
        session
            .flash(MessageLevel::Error, "That item is not in your bag")
            .await;
    }

    Redirect::to("/bag")
}

/// Bag totals for checkout, or the redirect to send the customer to instead
async fn checkout_contents(
    state: &AppState,
    session: &Session,
    bag: &Bag,
) -> Result<Result<BagContents, Response>, ApiError> {
    match state.checkout.bag_contents(bag) {
        Ok(contents) => Ok(Ok(contents)),
        Err(CheckoutError::ProductNotFound { product_id }) => {
            warn!("Bag references unknown product {}", product_id);
            session.flash(MessageLevel::Error, MISSING_PRODUCT_MESSAGE).await;
            Ok(Err(Redirect::to("/bag").into_response()))
        }
        Err(e) => Err(checkout_error_to_response(e)),
    }
}

async fn create_client_secret(
    state: &AppState,
    contents: &BagContents,
) -> Result<String, ApiError> {
    let request = PaymentIntentRequest::new(contents.grand_total)
        .with_metadata("product_count", contents.product_count.to_string());

    let intent = state
        .payments
        .create_payment_intent(&request)
        .await
        .map_err(|e| {
            error!("Failed to create payment intent: {}", e);
            checkout_error_to_response(e)
        })?;

    info!(
        "Created payment intent {} for {}",
        intent.id,
        contents.grand_total.display()
    );
    Ok(intent.client_secret)
}

async fn render_checkout(session: &Session, page: CheckoutPage<'_>) -> Html<String> {
    if page.stripe_public_key.is_none() {
        session
            .flash(MessageLevel::Warning, MISSING_PUBLIC_KEY_MESSAGE)
            .await;
    }
    let messages = session.take_messages().await;
    Html(pages::checkout_page(&page, &messages))
}

/// Checkout page: creates a payment intent for the bag's grand total
#[instrument(skip(state, session), fields(session = ?session.id()))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, ApiError> {
    let bag = session.bag().await;
    if bag.is_empty() {
        session.flash(MessageLevel::Error, EMPTY_BAG_MESSAGE).await;
        return Ok(Redirect::to("/products").into_response());
    }

    let contents = match checkout_contents(&state, &session, &bag).await? {
        Ok(contents) => contents,
        Err(redirect) => return Ok(redirect),
    };
    let client_secret = create_client_secret(&state, &contents).await?;

    let form = OrderForm::default();
    let errors = FieldErrors::default();
    let save_info = session.save_info().await.unwrap_or(true);

    let page = CheckoutPage {
        form: &form,
        errors: &errors,
        contents: &contents,
        stripe_public_key: state.stripe_public_key.as_deref(),
        client_secret: &client_secret,
        save_info,
    };
    Ok(render_checkout(&session, page).await.into_response())
}

/// Place the order from the session bag and the posted form
#[instrument(skip(state, session, submission), fields(session = ?session.id()))]
pub async fn checkout_submit(
    State(state): State<AppState>,
    session: Session,
    Form(submission): Form<CheckoutSubmission>,
) -> Result<Response, ApiError> {
    let bag = session.bag().await;
    if bag.is_empty() {
        session.flash(MessageLevel::Error, EMPTY_BAG_MESSAGE).await;
        return Ok(Redirect::to("/products").into_response());
    }

    let save_info = submission.save_info.is_some();

    match submission.form.clean() {
        Ok(details) => {
            let pid = payment_intent_id_from_client_secret(&submission.client_secret);
            if pid.is_none() {
                warn!("Checkout posted without a usable client secret");
            }

            match state.checkout.place_order(&bag, details, pid).await {
                Ok(order) => {
                    session.set_save_info(save_info).await;
                    Ok(Redirect::to(&format!("/checkout/success/{}", order.order_number))
                        .into_response())
                }
                Err(CheckoutError::ProductNotFound { product_id }) => {
                    warn!("Order abandoned, unknown product {}", product_id);
                    session.flash(MessageLevel::Error, MISSING_PRODUCT_MESSAGE).await;
                    Ok(Redirect::to("/bag").into_response())
                }
                Err(e) => {
                    error!("Failed to place order: {}", e);
                    Err(checkout_error_to_response(e))
                }
            }
        }
        Err(errors) => {
            info!("Checkout form rejected: {}", errors);
            session.flash(MessageLevel::Error, INVALID_FORM_MESSAGE).await;

            let contents = match checkout_contents(&state, &session, &bag).await? {
                Ok(contents) => contents,
                Err(redirect) => return Ok(redirect),
            };
            let client_secret = if submission.client_secret.trim().is_empty() {
                create_client_secret(&state, &contents).await?
            } else {
                submission.client_secret.clone()
            };

            let page = CheckoutPage {
                form: &submission.form,
                errors: &errors,
                contents: &contents,
                stripe_public_key: state.stripe_public_key.as_deref(),
                client_secret: &client_secret,
                save_info,
            };
            Ok(render_checkout(&session, page).await.into_response())
        }
    }
}

/// Order confirmation; clears the bag
#[instrument(skip(state, session), fields(session = ?session.id()))]
pub async fn checkout_success(
    State(state): State<AppState>,
    session: Session,
    Path(order_number): Path<String>,
) -> Result<Html<String>, ApiError> {
    let (order, items) = state
        .checkout
        .order_with_items(&order_number)
        .await
        .map_err(checkout_error_to_response)?;

    info!(
        "Order {} confirmed, save_info={:?}",
        order.order_number,
        session.save_info().await
    );

    session
        .flash(
            MessageLevel::Success,
            format!(
                "Order successfully processed! Your order number is {}. A confirmation email will be sent to {}.",
                order.order_number,
                order.email()
            ),
        )
        .await;
    session.clear_bag().await;

    let catalog = state.checkout.catalog();
    let messages = session.take_messages().await;
    Ok(Html(pages::success_page(
        &order,
        &items,
        |id| catalog.get(id).map(|p| p.name.as_str()),
        &messages,
    )))
}

/// Handle Stripe webhook
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    // Get signature header
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing Stripe-Signature header", 400)),
            )
        })?;

    // Verify and parse webhook
    let event = state
        .payments
        .verify_webhook(&body, signature)
        .await
        .map_err(|e| {
            error!("Webhook verification failed: {}", e);
            checkout_error_to_response(e)
        })?;

    info!(
        "Received webhook: type={:?}, id={}",
        event.event_type, event.event_id
    );

    let handler = OrderWebhookHandler::new(state.checkout.orders().clone());
    dispatch_webhook_event(&handler, event).await.map_err(|e| {
        error!("Webhook handler error: {}", e);
        checkout_error_to_response(e)
    })?;

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400).with_details("more");
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
        assert_eq!(err.details.as_deref(), Some("more"));
    }

    #[test]
    fn test_checkout_error_conversion() {
        let (status, _json) = checkout_error_to_response(CheckoutError::InvalidRequest(
            "Bad data".to_string(),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = checkout_error_to_response(CheckoutError::OrderNotFound {
            order_number: "ABC".to_string(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json.code, 404);

        let (status, json) = checkout_error_to_response(CheckoutError::NetworkError(
            "timeout".to_string(),
        ));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json.details.as_deref(), Some("retryable"));
    }

    #[test]
    fn test_safe_redirect() {
        assert_eq!(safe_redirect(Some("/products")), "/products");
        assert_eq!(safe_redirect(Some("//evil.example")), "/bag");
        assert_eq!(safe_redirect(Some("https://evil.example")), "/bag");
        assert_eq!(safe_redirect(None), "/bag");
    }

    #[test]
    fn test_bag_form_blank_size() {
        let form = BagForm {
            quantity: 1,
            product_size: Some("  ".to_string()),
            redirect_url: None,
        };
        assert_eq!(form.size(), None);
    }
}
