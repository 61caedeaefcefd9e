//! Checkout: form validation and the order commit.
//!
//! A checkout attempt moves through collecting (form input, with optional
//! CEP-driven address prefill via [`crate::api::lookup_address`]),
//! validating, and committing. Validation failures surface as `Validation`
//! errors with a user-facing message and leave everything untouched. The
//! commit resolves the customer and payment-type rows and inserts the order
//! in a single transaction; only after that succeeds is the cart cleared,
//! so a storage failure never loses cart contents.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cart::CartState;
use crate::customers::{self, normalize_cpf};
use crate::db::{lock_conn, DbState};
use crate::error::{Error, Result};
use crate::models::{CartLine, CustomerDetails, OrderItem, OrderPayload, PaymentMethod};
use crate::orders;
use crate::price;

/// Completed checkout form.
#[derive(Debug, Clone)]
pub struct CheckoutForm {
    pub customer: CustomerDetails,
    pub payment_method: PaymentMethod,
    /// Required when the payment method is installment-capable.
    pub installments: Option<i64>,
}

/// Result of a committed checkout: the local order id plus the payload for
/// remote submission (see [`crate::sync`]).
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order_id: i64,
    pub payload: OrderPayload,
}

/// Render a normalized CPF for display: `123.456.789-09`.
pub fn format_cpf(raw: &str) -> String {
    let digits = normalize_cpf(raw);
    if digits.len() != 11 {
        return raw.to_string();
    }
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

/// Render a normalized CEP for display: `12345-678`.
pub fn format_cep(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 8 {
        return raw.to_string();
    }
    format!("{}-{}", &digits[0..5], &digits[5..8])
}

/// Validate the checkout form. Any failure returns a `Validation` error
/// with a user-facing message; no partial commit ever happens.
pub fn validate_form(form: &CheckoutForm) -> Result<()> {
    let c = &form.customer;
    let required = [
        ("name", c.name.as_str()),
        ("cpf", c.cpf.as_str()),
        ("cep", c.cep.as_str()),
        ("address", c.address.as_str()),
        ("number", c.number.as_str()),
        ("city", c.city.as_str()),
        ("state", c.state.as_str()),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();
    if !missing.is_empty() {
        return Err(Error::Validation(format!(
            "all required customer fields must be filled in (missing: {})",
            missing.join(", ")
        )));
    }

    if normalize_cpf(&c.cpf).len() != 11 {
        return Err(Error::validation("CPF must contain exactly 11 digits"));
    }

    if form.payment_method.requires_installments()
        && !form.installments.is_some_and(|n| n > 0)
    {
        return Err(Error::validation(
            "installments are required for credit payments",
        ));
    }

    Ok(())
}

/// Compute the order total from a cart snapshot: plan-aware resolved unit
/// price times quantity, summed across lines.
pub fn compute_total(snapshot: &[CartLine]) -> f64 {
    snapshot
        .iter()
        .map(|line| price::resolve_unit_price(line) * f64::from(line.quantity))
        .sum()
}

/// Build the remote submission payload for a committed order.
fn build_payload(snapshot: &[CartLine], total: f64, customer: &CustomerDetails) -> OrderPayload {
    let items = snapshot
        .iter()
        .map(|line| OrderItem {
            id: line.product.id,
            name: line.product.name.clone(),
            price: price::resolve_unit_price(line),
            quantity: line.quantity,
            selected_plan: line.selected_plan.clone(),
            category: line.product.category.clone(),
            description: line.product.description.clone(),
            images: line.product.images.clone(),
        })
        .collect();
    OrderPayload {
        id: Uuid::new_v4().to_string(),
        items,
        total,
        date: Utc::now().to_rfc3339(),
        customer_name: customer.name.clone(),
        customer_cpf: normalize_cpf(&customer.cpf),
    }
}

/// Commit a checkout attempt.
///
/// Validates the form, snapshots the cart, resolves or creates the customer
/// and payment-type rows, and inserts the order inside one transaction.
/// On success the cart is cleared; on failure the cart and
/// every entered field are preserved and the error is surfaced to the
/// caller.
pub fn commit(db: &DbState, cart: &CartState, form: &CheckoutForm) -> Result<CheckoutReceipt> {
    validate_form(form)?;

    let snapshot = cart.snapshot();
    if snapshot.is_empty() {
        return Err(Error::validation("cart is empty"));
    }

    let total = compute_total(&snapshot);
    let items_json = orders::serialize_snapshot(&snapshot)?;

    let mut customer = form.customer.clone();
    if customer.neighborhood.trim().is_empty() {
        customer.neighborhood = "Não informado".to_string();
    }

    // Installments are only meaningful for installment-capable methods.
    let installments = if form.payment_method.requires_installments() {
        form.installments
    } else {
        None
    };

    let order_id = {
        let conn = lock_conn(db)?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| Error::persistence("begin transaction", e))?;

        let result = (|| -> Result<i64> {
            let user_id = customers::get_or_create_user_tx(&conn, &customer)?;
            let payment_type_id =
                customers::get_or_create_payment_type_tx(&conn, user_id, form.payment_method)?;
            orders::insert_order_tx(
                &conn,
                user_id,
                payment_type_id,
                installments,
                &items_json,
                total,
            )
        })();

        match result {
            Ok(order_id) => {
                conn.execute_batch("COMMIT")
                    .map_err(|e| Error::persistence("commit transaction", e))?;
                order_id
            }
            Err(e) => {
                error!("checkout commit failed: {e}");
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
    };

    // The order is durable; clearing the cart transfers ownership of the
    // line items to the persisted snapshot. A failed clear must not turn a
    // committed order into an error, or the caller would retry and place
    // it twice.
    if let Err(e) = cart.clear() {
        warn!(order_id, error = %e, "cart clear failed after commit; order is durable");
    }

    info!(order_id, total, "checkout committed");
    Ok(CheckoutReceipt {
        order_id,
        payload: build_payload(&snapshot, total, &form.customer),
    })
}

// ===========================================================================
// Tests
// ===========================================================================
