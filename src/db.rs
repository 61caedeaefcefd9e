//! Local SQLite database layer for the storefront.
//!
//! Uses rusqlite with WAL mode. The connection handle is constructed once
//! by the application root and injected into every consumer; there is no
//! process-global connection. Schema changes ship as numbered migrations
//! recorded in `schema_version`; there is one canonical schema, and the
//! database file never changes name between generations.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Shared database state, owned by the application root.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Database file name under the app data directory (configuration, not
/// contract).
pub const DB_FILE_NAME: &str = "storefront.db";

/// Initialize the database at `{app_data_dir}/storefront.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. Idempotent: a second call against the
/// same directory is a no-op apart from the version check.
pub fn init(app_data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(app_data_dir).map_err(|e| Error::persistence("create data dir", e))?;

    let db_path = app_data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| Error::persistence("sqlite open", e))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| Error::persistence("pragma setup", e))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| Error::persistence("create schema_version", e))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Migration v1: catalog, customer, payment-type, and order tables.
///
/// Plan-bearing catalogs get their own tables with one price column per
/// plan tier; generic products keep a single price column. `image`,
/// `planPrices`, and `cartItems` hold serialized JSON text.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Generic catalog (Funeraria and any single-priced screen)
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            price TEXT,
            description TEXT NOT NULL,
            image TEXT NOT NULL,
            targetScreen TEXT NOT NULL,
            planPrices TEXT,
            category TEXT NOT NULL
        );

        -- Parque catalog: one price column per plan tier
        CREATE TABLE IF NOT EXISTS itensParque (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL,
            image TEXT NOT NULL,
            targetScreen TEXT NOT NULL,
            category TEXT NOT NULL,
            valorBronze TEXT,
            valorOuro TEXT,
            valorDiamante TEXT,
            valorDiamantePlus TEXT
        );

        -- Planos catalog
        CREATE TABLE IF NOT EXISTS itensPlanos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL,
            image TEXT NOT NULL,
            targetScreen TEXT NOT NULL,
            category TEXT NOT NULL,
            valorStandard TEXT,
            valorMaster TEXT,
            valorPrime TEXT
        );

        -- Customers, deduplicated by normalized CPF
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customerName TEXT NOT NULL,
            cpf TEXT NOT NULL UNIQUE,
            cep TEXT NOT NULL,
            address TEXT NOT NULL,
            number TEXT NOT NULL,
            neighborhood TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL
        );

        -- Payment types, one row per (user, method name)
        CREATE TABLE IF NOT EXISTS payment_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            userId INTEGER NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(userId, name),
            FOREIGN KEY(userId) REFERENCES users(id)
        );

        -- Orders embed the cart snapshot; no foreign key to products
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            userId INTEGER NOT NULL,
            paymentTypeId INTEGER NOT NULL,
            installments INTEGER,
            cartItems TEXT NOT NULL,
            total REAL NOT NULL,
            createdAt TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY(userId) REFERENCES users(id),
            FOREIGN KEY(paymentTypeId) REFERENCES payment_types(id)
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_products_target_screen ON products(targetScreen);
        CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(createdAt);
        CREATE INDEX IF NOT EXISTS idx_payment_types_user ON payment_types(userId);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        Error::persistence("migration v1", e)
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Lock the shared connection, surfacing poisoning as a persistence error.
pub(crate) fn lock_conn(db: &DbState) -> Result<std::sync::MutexGuard<'_, Connection>> {
    db.conn.lock().map_err(|e| {
        warn!("database mutex poisoned");
        Error::Persistence(e.to_string())
    })
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================
