//! # Pages
//!
//! Server-rendered HTML for the storefront pages.

use crate::session::FlashMessage;
use checkout_core::{BagContents, FieldErrors, Order, OrderForm, OrderLineItem, Product, ORDER_FORM_FIELDS};
use std::fmt::Write;

/// Escape text for HTML bodies and attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, messages: &[FlashMessage], head_extra: &str, body: &str) -> String {
    let mut notices = String::new();
    for message in messages {
        let _ = write!(
            notices,
            r#"<div class="message message-{}">{}</div>"#,
            message.level.as_str(),
            escape_html(&message.text)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: system-ui; margin: 0; background: #f7f7f7; }}
nav {{ background: #1a1a2e; padding: 16px 40px; }}
nav a {{ color: white; margin-right: 24px; text-decoration: none; }}
main {{ max-width: 960px; margin: 40px auto; background: white; padding: 40px; border-radius: 16px; }}
.message {{ padding: 12px 16px; border-radius: 8px; margin-bottom: 12px; }}
.message-error {{ background: #fde2e2; }}
.message-warning {{ background: #fff4d6; }}
.message-success {{ background: #dff5e3; }}
.message-info {{ background: #e2ecfd; }}
.field-error {{ color: #b00020; font-size: 0.9em; }}
table {{ width: 100%; border-collapse: collapse; }}
td, th {{ padding: 8px; border-bottom: 1px solid #eee; text-align: left; }}
</style>
{head_extra}
</head>
<body>
<nav><a href="/products">Products</a><a href="/bag">Bag</a><a href="/checkout">Checkout</a></nav>
<main>
<div id="messages">{notices}</div>
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
    )
}

pub fn products_page(products: &[&Product], messages: &[FlashMessage]) -> String {
    let mut body = String::from("<h1>Products</h1>");

    if products.is_empty() {
        body.push_str("<p>No products available.</p>");
    }

    for product in products {
        let size_input = if product.has_sizes {
            r#"<select name="product_size"><option value="xs">XS</option><option value="s">S</option><option value="m" selected>M</option><option value="l">L</option><option value="xl">XL</option></select>"#
        } else {
            ""
        };
        let id = escape_html(&product.id);
        let _ = write!(
            body,
            r#"<div class="product">
<h2>{name}</h2>
<p>{description}</p>
<p><strong>{price}</strong></p>
<form method="post" action="/bag/add/{id}">
{size_input}
<input type="number" name="quantity" value="1" min="1" max="99">
<input type="hidden" name="redirect_url" value="/products">
<button type="submit">Add to bag</button>
</form>
</div>"#,
            name = escape_html(&product.name),
            description = escape_html(&product.description),
            price = escape_html(&product.price.display()),
        );
    }

    layout("Products", messages, "", &body)
}

fn size_label(size: Option<&str>) -> String {
    size.map(|s| escape_html(&s.to_uppercase()))
        .unwrap_or_else(|| "N/A".to_string())
}

fn totals_block(contents: &BagContents) -> String {
    let mut out = format!(
        r#"<p>Bag total: {}</p><p>Delivery: {}</p><p><strong>Grand total: {}</strong></p>"#,
        escape_html(&contents.total.display()),
        escape_html(&contents.delivery.display()),
        escape_html(&contents.grand_total.display()),
    );
    if contents.free_delivery_delta.amount > 0 {
        let _ = write!(
            out,
            r#"<p class="free-delivery">You could get free delivery by spending just {} more!</p>"#,
            escape_html(&contents.free_delivery_delta.display())
        );
    }
    out
}

pub fn bag_page(contents: &BagContents, messages: &[FlashMessage]) -> String {
    let mut body = String::from("<h1>Shopping Bag</h1>");

    if contents.is_empty() {
        body.push_str(r#"<p>Your bag is empty.</p><a href="/products">Keep shopping</a>"#);
        return layout("Shopping Bag", messages, "", &body);
    }

    body.push_str("<table><tr><th>Product</th><th>Size</th><th>Price</th><th>Qty</th><th>Subtotal</th><th></th></tr>");
    for item in &contents.bag_items {
        let id = escape_html(&item.item_id);
        let size_field = item
            .size
            .as_deref()
            .map(|s| {
                format!(
                    r#"<input type="hidden" name="product_size" value="{}">"#,
                    escape_html(s)
                )
            })
            .unwrap_or_default();
        let _ = write!(
            body,
            r#"<tr><td>{name}</td><td>{size}</td><td>{price}</td>
<td><form method="post" action="/bag/adjust/{id}">{size_field}<input type="number" name="quantity" value="{qty}" min="0" max="99"><button type="submit">Update</button></form></td>
<td>{subtotal}</td>
<td><form method="post" action="/bag/remove/{id}">{size_field}<button type="submit">Remove</button></form></td></tr>"#,
            name = escape_html(&item.product.name),
            size = size_label(item.size.as_deref()),
            price = escape_html(&item.product.price.display()),
            qty = item.quantity,
            subtotal = escape_html(&item.subtotal().display()),
        );
    }
    body.push_str("</table>");
    body.push_str(&totals_block(contents));
    body.push_str(r#"<a href="/checkout">Secure checkout</a>"#);

    layout("Shopping Bag", messages, "", &body)
}

/// Everything the checkout page renders
pub struct CheckoutPage<'a> {
    pub form: &'a OrderForm,
    pub errors: &'a FieldErrors,
    pub contents: &'a BagContents,
    pub stripe_public_key: Option<&'a str>,
    pub client_secret: &'a str,
    pub save_info: bool,
}

pub fn checkout_page(page: &CheckoutPage<'_>, messages: &[FlashMessage]) -> String {
    let mut fields = String::new();
    for &(name, label, max_len, required) in ORDER_FORM_FIELDS {
        let mut errors = String::new();
        for message in page.errors.get(name) {
            let _ = write!(
                errors,
                r#"<span class="field-error">{}</span>"#,
                escape_html(message)
            );
        }
        let input_type = if name == "email" { "email" } else { "text" };
        let _ = write!(
            fields,
            r#"<p><label for="id_{name}">{label}{star}</label>
<input type="{input_type}" id="id_{name}" name="{name}" value="{value}" maxlength="{max_len}"{req}>{errors}</p>"#,
            label = escape_html(label),
            star = if required { " *" } else { "" },
            value = escape_html(page.form.value(name)),
            req = if required { " required" } else { "" },
        );
    }

    let mut summary = String::from("<table><tr><th>Item</th><th>Size</th><th>Qty</th><th>Subtotal</th></tr>");
    for item in &page.contents.bag_items {
        let _ = write!(
            summary,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&item.product.name),
            size_label(item.size.as_deref()),
            item.quantity,
            escape_html(&item.subtotal().display()),
        );
    }
    summary.push_str("</table>");
    summary.push_str(&totals_block(page.contents));

    let stripe_key = page.stripe_public_key.unwrap_or_default();

    let head = r#"<script src="https://js.stripe.com/v3/"></script>"#;

    let body = format!(
        r#"<h1>Checkout</h1>
<div id="order-summary">{summary}</div>
<form id="payment-form" method="post" action="/checkout">
{fields}
<p><label><input type="checkbox" id="id-save-info" name="save-info"{checked}> Save this delivery information</label></p>
<div id="card-element"></div>
<div id="card-errors" role="alert"></div>
<input type="hidden" name="client_secret" value="{client_secret}">
<button id="submit-button" type="submit">Complete Order</button>
</form>
<script id="id_stripe_public_key" type="application/json">"{stripe_key}"</script>
<script id="id_client_secret" type="application/json">"{client_secret}"</script>
<script>
(function () {{
  var key = JSON.parse(document.getElementById('id_stripe_public_key').textContent);
  var clientSecret = JSON.parse(document.getElementById('id_client_secret').textContent);
  if (!key || typeof Stripe === 'undefined') {{ return; }}
  var stripe = Stripe(key);
  var card = stripe.elements().create('card');
  card.mount('#card-element');
  var form = document.getElementById('payment-form');
  form.addEventListener('submit', function (ev) {{
    ev.preventDefault();
    document.getElementById('submit-button').disabled = true;
    stripe.confirmCardPayment(clientSecret, {{
      payment_method: {{
        card: card,
        billing_details: {{
          name: form.full_name.value.trim(),
          email: form.email.value.trim(),
          phone: form.phone_number.value.trim()
        }}
      }}
    }}).then(function (result) {{
      if (result.error) {{
        document.getElementById('card-errors').textContent = result.error.message;
        document.getElementById('submit-button').disabled = false;
      }} else if (result.paymentIntent.status === 'succeeded') {{
        form.submit();
      }}
    }});
  }});
}})();
</script>"#,
        checked = if page.save_info { " checked" } else { "" },
        client_secret = escape_html(page.client_secret),
        stripe_key = escape_html(stripe_key),
    );

    layout("Checkout", messages, head, &body)
}

/// Confirmation page; `product_name` resolves line item product ids
pub fn success_page<'a>(
    order: &Order,
    items: &[OrderLineItem],
    product_name: impl Fn(&str) -> Option<&'a str>,
    messages: &[FlashMessage],
) -> String {
    let customer = &order.customer;
    let mut rows = String::new();
    for item in items {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(product_name(&item.product_id).unwrap_or(&item.product_id)),
            size_label(item.product_size.as_deref()),
            item.quantity,
            escape_html(&item.lineitem_total.display()),
        );
    }

    let optional = |value: &Option<String>| {
        value
            .as_deref()
            .map(|v| format!("{}<br>", escape_html(v)))
            .unwrap_or_default()
    };

    let body = format!(
        r#"<h1>Thank You</h1>
<p>Your order information is below. A confirmation email will be sent to <strong>{email}</strong>.</p>
<h2>Order Info</h2>
<p>Order number: <code id="order-number">{order_number}</code></p>
<p>Order date: {date}</p>
<h2>Order Details</h2>
<table><tr><th>Item</th><th>Size</th><th>Qty</th><th>Total</th></tr>{rows}</table>
<h2>Delivering To</h2>
<p>{full_name}<br>{street1}<br>{street2}{town}<br>{county}{postcode}{country}</p>
<p>Phone: {phone}</p>
<h2>Billing Info</h2>
<p>Order total: {order_total}</p>
<p>Delivery: {delivery}</p>
<p><strong>Grand total: {grand_total}</strong></p>
<a href="/products">Now check out the latest deals!</a>"#,
        email = escape_html(&customer.email),
        order_number = escape_html(&order.order_number),
        date = order.date.format("%Y-%m-%d %H:%M"),
        full_name = escape_html(&customer.full_name),
        street1 = escape_html(&customer.street_address1),
        street2 = optional(&customer.street_address2),
        town = escape_html(&customer.town_or_city),
        county = optional(&customer.county),
        postcode = optional(&customer.postcode),
        country = escape_html(&customer.country),
        phone = escape_html(&customer.phone_number),
        order_total = escape_html(&order.order_total.display()),
        delivery = escape_html(&order.delivery_cost.display()),
        grand_total = escape_html(&order.grand_total.display()),
    );

    layout("Order Confirmation", messages, "", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageLevel;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_layout_renders_escaped_messages() {
        let messages = vec![FlashMessage {
            level: MessageLevel::Error,
            text: "<b>nope</b>".to_string(),
        }];
        let html = layout("Bag", &messages, "", "<p>body</p>");

        assert!(html.contains(r#"class="message message-error""#));
        assert!(html.contains("&lt;b&gt;nope&lt;/b&gt;"));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn test_checkout_page_shows_field_errors() {
        let form = OrderForm {
            full_name: "A \"quoted\" name".to_string(),
            ..OrderForm::default()
        };
        let errors = form.clean().unwrap_err();
        let contents = BagContents {
            bag_items: Vec::new(),
            total: checkout_core::Price::zero(checkout_core::Currency::GBP),
            product_count: 0,
            delivery: checkout_core::Price::zero(checkout_core::Currency::GBP),
            free_delivery_delta: checkout_core::Price::zero(checkout_core::Currency::GBP),
            free_delivery_threshold: checkout_core::Price::zero(checkout_core::Currency::GBP),
            grand_total: checkout_core::Price::zero(checkout_core::Currency::GBP),
        };

        let html = checkout_page(
            &CheckoutPage {
                form: &form,
                errors: &errors,
                contents: &contents,
                stripe_public_key: None,
                client_secret: "pi_1_secret_2",
                save_info: true,
            },
            &[],
        );

        assert!(html.contains("Email Address is required."));
        assert!(html.contains("A &quot;quoted&quot; name"));
        assert!(html.contains(r#"name="client_secret" value="pi_1_secret_2""#));
        assert!(html.contains(r#"name="save-info" checked"#));
    }
}
