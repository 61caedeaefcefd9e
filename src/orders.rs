//! Order persistence.
//!
//! An order embeds the cart snapshot as serialized JSON and freezes the
//! total computed at checkout time, so later catalog price changes never
//! retroactively affect a placed order.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{error, info, warn};

use crate::customers;
use crate::db::{lock_conn, DbState};
use crate::error::{Error, Result};
use crate::models::{CartLine, OrderRecord, PaymentMethod};

/// Serialize the cart snapshot for embedding into the order row.
pub(crate) fn serialize_snapshot(lines: &[CartLine]) -> Result<String> {
    serde_json::to_string(lines).map_err(|e| Error::persistence("serialize cart snapshot", e))
}

/// Connection-level insert, used inside the checkout transaction.
pub(crate) fn insert_order_tx(
    conn: &Connection,
    user_id: i64,
    payment_type_id: i64,
    installments: Option<i64>,
    cart_items_json: &str,
    total: f64,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO orders (userId, paymentTypeId, installments, cartItems, total, createdAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user_id, payment_type_id, installments, cart_items_json, total, now],
    )
    .map_err(|e| {
        error!("insert order failed: {e}");
        Error::persistence("insert order", e)
    })?;
    Ok(conn.last_insert_rowid())
}

/// Persist one order for an existing user.
///
/// Resolves the payment-type id via get-or-create, then inserts the order
/// row with the serialized cart snapshot. Fails fast with a `Persistence`
/// error when the underlying write fails.
pub fn save_order(
    db: &DbState,
    user_id: i64,
    method: PaymentMethod,
    installments: Option<i64>,
    cart_snapshot: &[CartLine],
    total: f64,
) -> Result<i64> {
    let items = serialize_snapshot(cart_snapshot)?;
    let conn = lock_conn(db)?;

    let payment_type_id = customers::get_or_create_payment_type_tx(&conn, user_id, method)?;
    let order_id = insert_order_tx(&conn, user_id, payment_type_id, installments, &items, total)?;

    info!(order_id, user_id, total, "order saved");
    Ok(order_id)
}

/// All orders, newest first, joined to their customer and payment-type rows.
pub fn get_all_orders(db: &DbState) -> Result<Vec<OrderRecord>> {
    let conn = lock_conn(db)?;

    let mut stmt = conn
        .prepare(
            "SELECT o.id, o.userId, o.paymentTypeId, u.customerName, p.name,
                    o.installments, o.cartItems, o.total, o.createdAt
             FROM orders o
             JOIN users u ON u.id = o.userId
             JOIN payment_types p ON p.id = o.paymentTypeId
             ORDER BY o.createdAt DESC, o.id DESC",
        )
        .map_err(|e| Error::persistence("prepare orders query", e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, String>(8)?,
            ))
        })
        .map_err(|e| Error::persistence("query orders", e))?;

    let mut orders = Vec::new();
    for row in rows.filter_map(|r| r.ok()) {
        let (id, user_id, payment_type_id, customer_name, payment_method, installments, items_raw, total, created_at) =
            row;
        let items = match serde_json::from_str(&items_raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(order_id = id, error = %e, "order snapshot is malformed; returning empty items");
                Vec::new()
            }
        };
        orders.push(OrderRecord {
            id,
            user_id,
            payment_type_id,
            customer_name,
            payment_method,
            installments,
            items,
            total,
            created_at,
        });
    }

    Ok(orders)
}

// ===========================================================================
// Tests
// ===========================================================================
