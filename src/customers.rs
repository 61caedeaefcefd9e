//! Customer and payment-type records.
//!
//! Customers are deduplicated by normalized CPF (the natural key); payment
//! types are unique per (user, method name). Both use get-or-create
//! semantics backed by UNIQUE constraints: `INSERT OR IGNORE` followed by a
//! re-select, so two racing checkouts converge on the same row instead of
//! inserting duplicates.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{error, info};

use crate::db::{lock_conn, DbState};
use crate::error::{Error, Result};
use crate::models::{Customer, CustomerDetails, PaymentMethod};

/// Strip everything but digits from a CPF (or any formatted numeric id).
pub fn normalize_cpf(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Look up a customer by natural key, inserting one when absent.
pub fn get_or_create_user(db: &DbState, details: &CustomerDetails) -> Result<i64> {
    let conn = lock_conn(db)?;
    get_or_create_user_tx(&conn, details)
}

/// Connection-level variant, used inside the checkout transaction.
pub(crate) fn get_or_create_user_tx(conn: &Connection, details: &CustomerDetails) -> Result<i64> {
    let cpf = normalize_cpf(&details.cpf);

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO users
                (customerName, cpf, cep, address, number, neighborhood, city, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                details.name,
                cpf,
                details.cep,
                details.address,
                details.number,
                details.neighborhood,
                details.city,
                details.state,
            ],
        )
        .map_err(|e| {
            error!("insert user failed: {e}");
            Error::persistence("insert user", e)
        })?;

    let user_id: i64 = conn
        .query_row("SELECT id FROM users WHERE cpf = ?1", params![cpf], |row| {
            row.get(0)
        })
        .map_err(|e| Error::persistence("select user by cpf", e))?;

    if inserted > 0 {
        info!(user_id, "customer created");
    }
    Ok(user_id)
}

/// Look up a customer by natural key without creating one.
pub fn get_user_by_cpf(db: &DbState, cpf: &str) -> Result<Option<Customer>> {
    let conn = lock_conn(db)?;
    let cpf = normalize_cpf(cpf);
    conn.query_row(
        "SELECT id, customerName, cpf, cep, address, number, neighborhood, city, state
         FROM users WHERE cpf = ?1",
        params![cpf],
        |row| {
            Ok(Customer {
                id: row.get(0)?,
                name: row.get(1)?,
                cpf: row.get(2)?,
                cep: row.get(3)?,
                address: row.get(4)?,
                number: row.get(5)?,
                neighborhood: row.get(6)?,
                city: row.get(7)?,
                state: row.get(8)?,
            })
        },
    )
    .optional()
    .map_err(|e| Error::persistence("get user by cpf", e))
}

/// Resolve the payment-type row for (user, method), inserting on first use.
pub fn get_or_create_payment_type(
    db: &DbState,
    user_id: i64,
    method: PaymentMethod,
) -> Result<i64> {
    let conn = lock_conn(db)?;
    get_or_create_payment_type_tx(&conn, user_id, method)
}

/// Connection-level variant, used inside the checkout transaction.
pub(crate) fn get_or_create_payment_type_tx(
    conn: &Connection,
    user_id: i64,
    method: PaymentMethod,
) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO payment_types (userId, name) VALUES (?1, ?2)",
        params![user_id, method.as_str()],
    )
    .map_err(|e| {
        error!("insert payment type failed: {e}");
        Error::persistence("insert payment type", e)
    })?;

    conn.query_row(
        "SELECT id FROM payment_types WHERE userId = ?1 AND name = ?2",
        params![user_id, method.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| Error::persistence("select payment type", e))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: std::sync::Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        }
    }

    fn details() -> CustomerDetails {
        CustomerDetails {
            name: "Maria Souza".into(),
            cpf: "123.456.789-09".into(),
            cep: "01001-000".into(),
            address: "Praça da Sé".into(),
            number: "100".into(),
            neighborhood: "Sé".into(),
            city: "São Paulo".into(),
            state: "SP".into(),
        }
    }

    #[test]
    fn test_normalize_cpf_strips_formatting() {
        assert_eq!(normalize_cpf("123.456.789-09"), "12345678909");
        assert_eq!(normalize_cpf("abc123"), "123");
        assert_eq!(normalize_cpf(""), "");
    }

    #[test]
    fn test_get_or_create_user_is_idempotent() {
        let db = test_db();
        let first = get_or_create_user(&db, &details()).expect("first call");
        let second = get_or_create_user(&db, &details()).expect("second call");
        assert_eq!(first, second);

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_formatted_and_plain_cpf_resolve_to_same_user() {
        let db = test_db();
        let first = get_or_create_user(&db, &details()).expect("formatted");

        let mut plain = details();
        plain.cpf = "12345678909".into();
        let second = get_or_create_user(&db, &plain).expect("plain");
        assert_eq!(first, second);
    }

    #[test]
    fn test_get_user_by_cpf() {
        let db = test_db();
        assert!(get_user_by_cpf(&db, "12345678909").unwrap().is_none());

        let id = get_or_create_user(&db, &details()).unwrap();
        let customer = get_user_by_cpf(&db, "123.456.789-09")
            .unwrap()
            .expect("present");
        assert_eq!(customer.id, id);
        assert_eq!(customer.cpf, "12345678909");
        assert_eq!(customer.city, "São Paulo");
    }

    #[test]
    fn test_payment_type_unique_per_user_and_name() {
        let db = test_db();
        let user = get_or_create_user(&db, &details()).unwrap();

        let credit = get_or_create_payment_type(&db, user, PaymentMethod::Credito).unwrap();
        let again = get_or_create_payment_type(&db, user, PaymentMethod::Credito).unwrap();
        let boleto = get_or_create_payment_type(&db, user, PaymentMethod::Boleto).unwrap();
        assert_eq!(credit, again);
        assert_ne!(credit, boleto);

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM payment_types WHERE userId = ?1",
                params![user],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
