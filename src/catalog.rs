//! Product catalog CRUD.
//!
//! Products live in one of three tables keyed by target screen: the generic
//! `products` table (single price column) and the plan-priced `itensParque`
//! and `itensPlanos` tables (one price column per plan tier). Image lists
//! are serialized JSON text; the generated row id is not returned on insert.

use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::db::{lock_conn, DbState};
use crate::error::{Error, Result};
use crate::models::{NewProduct, Pricing, Product, TargetScreen};
use crate::storage::{LocalStorage, KEY_HOME_PRODUCTS};

/// (plan name, price column) pairs for the Parque table.
const PARQUE_COLUMNS: &[(&str, &str)] = &[
    ("Bronze", "valorBronze"),
    ("Ouro", "valorOuro"),
    ("Diamante", "valorDiamante"),
    ("Diamante Plus", "valorDiamantePlus"),
];

/// (plan name, price column) pairs for the Planos table.
const PLANOS_COLUMNS: &[(&str, &str)] = &[
    ("Standard", "valorStandard"),
    ("Master", "valorMaster"),
    ("Prime", "valorPrime"),
];

fn serialize_images(product: &NewProduct) -> Result<String> {
    serde_json::to_string(&product.images)
        .map_err(|e| Error::persistence("serialize images", e))
}

fn deserialize_images(raw: &str) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(images) => images,
        Err(e) => {
            warn!(error = %e, "stored image list is malformed; treating as empty");
            Vec::new()
        }
    }
}

/// Validate required fields and the pricing shape against the target screen.
fn validate(product: &NewProduct) -> Result<()> {
    let mut missing = Vec::new();
    if product.name.trim().is_empty() {
        missing.push("name");
    }
    if product.description.trim().is_empty() {
        missing.push("description");
    }
    if product.category.trim().is_empty() {
        missing.push("category");
    }
    if product.images.is_empty() {
        missing.push("images");
    }
    if !missing.is_empty() {
        return Err(Error::Validation(format!(
            "missing required product fields {missing:?}: {product:?}"
        )));
    }
    if product.quantity < 0 {
        return Err(Error::Validation(format!(
            "quantity must not be negative: {product:?}"
        )));
    }

    match (product.target_screen.plan_names(), &product.pricing) {
        (Some(plans), Pricing::Plans(map)) => {
            for plan in map.keys() {
                if !plans.contains(&plan.as_str()) {
                    return Err(Error::Validation(format!(
                        "unknown plan \"{plan}\" for screen {}",
                        product.target_screen
                    )));
                }
            }
            Ok(())
        }
        (Some(_), Pricing::Single(_)) => Err(Error::Validation(format!(
            "screen {} requires plan pricing: {product:?}",
            product.target_screen
        ))),
        (None, Pricing::Plans(_)) => Err(Error::Validation(format!(
            "screen {} requires a single price: {product:?}",
            product.target_screen
        ))),
        (None, Pricing::Single(_)) => Ok(()),
    }
}

fn plan_price<'a>(pricing: &'a Pricing, plan: &str) -> Option<&'a String> {
    match pricing {
        Pricing::Plans(map) => map.get(plan),
        Pricing::Single(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Insert
// ---------------------------------------------------------------------------

/// Insert a new product into the table matching its target screen.
///
/// Fails with a `Validation` error listing the offending payload when a
/// required field is missing or the pricing shape does not match the screen.
pub fn insert_product(db: &DbState, product: &NewProduct) -> Result<()> {
    validate(product)?;

    let images = serialize_images(product)?;
    let conn = lock_conn(db)?;

    match product.target_screen {
        TargetScreen::Funeraria => {
            let price = match &product.pricing {
                Pricing::Single(price) => price.clone(),
                Pricing::Plans(_) => unreachable!("shape checked in validate"),
            };
            conn.execute(
                "INSERT INTO products (name, quantity, price, description, image, targetScreen, planPrices, category)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
                params![
                    product.name,
                    product.quantity,
                    price,
                    product.description,
                    images,
                    product.target_screen.as_str(),
                    product.category,
                ],
            )
            .map_err(|e| {
                error!("insert product failed: {e}");
                Error::persistence("insert product", e)
            })?;
        }
        TargetScreen::Parque => {
            conn.execute(
                "INSERT INTO itensParque (name, quantity, description, image, targetScreen, category,
                                          valorBronze, valorOuro, valorDiamante, valorDiamantePlus)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    product.name,
                    product.quantity,
                    product.description,
                    images,
                    product.target_screen.as_str(),
                    product.category,
                    plan_price(&product.pricing, "Bronze"),
                    plan_price(&product.pricing, "Ouro"),
                    plan_price(&product.pricing, "Diamante"),
                    plan_price(&product.pricing, "Diamante Plus"),
                ],
            )
            .map_err(|e| {
                error!("insert parque item failed: {e}");
                Error::persistence("insert parque item", e)
            })?;
        }
        TargetScreen::Planos => {
            conn.execute(
                "INSERT INTO itensPlanos (name, quantity, description, image, targetScreen, category,
                                          valorStandard, valorMaster, valorPrime)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    product.name,
                    product.quantity,
                    product.description,
                    images,
                    product.target_screen.as_str(),
                    product.category,
                    plan_price(&product.pricing, "Standard"),
                    plan_price(&product.pricing, "Master"),
                    plan_price(&product.pricing, "Prime"),
                ],
            )
            .map_err(|e| {
                error!("insert planos item failed: {e}");
                Error::persistence("insert planos item", e)
            })?;
        }
    }

    info!(name = %product.name, screen = %product.target_screen, "product inserted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Update / delete
// ---------------------------------------------------------------------------

/// Full-row replace of a product by id.
///
/// A missing id is not an error: the update affects zero rows, which is
/// logged so operators can see it.
pub fn update_product(db: &DbState, id: i64, product: &NewProduct) -> Result<()> {
    validate(product)?;

    let images = serialize_images(product)?;
    let conn = lock_conn(db)?;

    let affected = match product.target_screen {
        TargetScreen::Funeraria => {
            let price = match &product.pricing {
                Pricing::Single(price) => price.clone(),
                Pricing::Plans(_) => unreachable!("shape checked in validate"),
            };
            conn.execute(
                "UPDATE products SET
                    name = ?1, quantity = ?2, price = ?3, description = ?4,
                    image = ?5, targetScreen = ?6, planPrices = NULL, category = ?7
                 WHERE id = ?8",
                params![
                    product.name,
                    product.quantity,
                    price,
                    product.description,
                    images,
                    product.target_screen.as_str(),
                    product.category,
                    id,
                ],
            )
        }
        TargetScreen::Parque => conn.execute(
            "UPDATE itensParque SET
                name = ?1, quantity = ?2, description = ?3, image = ?4,
                targetScreen = ?5, category = ?6,
                valorBronze = ?7, valorOuro = ?8, valorDiamante = ?9, valorDiamantePlus = ?10
             WHERE id = ?11",
            params![
                product.name,
                product.quantity,
                product.description,
                images,
                product.target_screen.as_str(),
                product.category,
                plan_price(&product.pricing, "Bronze"),
                plan_price(&product.pricing, "Ouro"),
                plan_price(&product.pricing, "Diamante"),
                plan_price(&product.pricing, "Diamante Plus"),
                id,
            ],
        ),
        TargetScreen::Planos => conn.execute(
            "UPDATE itensPlanos SET
                name = ?1, quantity = ?2, description = ?3, image = ?4,
                targetScreen = ?5, category = ?6,
                valorStandard = ?7, valorMaster = ?8, valorPrime = ?9
             WHERE id = ?10",
            params![
                product.name,
                product.quantity,
                product.description,
                images,
                product.target_screen.as_str(),
                product.category,
                plan_price(&product.pricing, "Standard"),
                plan_price(&product.pricing, "Master"),
                plan_price(&product.pricing, "Prime"),
                id,
            ],
        ),
    }
    .map_err(|e| {
        error!("update product failed: {e}");
        Error::persistence("update product", e)
    })?;

    if affected == 0 {
        warn!(id, screen = %product.target_screen, "update matched no product row");
    }
    Ok(())
}

/// Delete a product by id. Orders are unaffected: they embed a snapshot,
/// not a foreign key to the product.
pub fn delete_product(db: &DbState, screen: TargetScreen, id: i64) -> Result<()> {
    let conn = lock_conn(db)?;
    let sql = match screen {
        TargetScreen::Funeraria => "DELETE FROM products WHERE id = ?1",
        TargetScreen::Parque => "DELETE FROM itensParque WHERE id = ?1",
        TargetScreen::Planos => "DELETE FROM itensPlanos WHERE id = ?1",
    };
    conn.execute(sql, params![id]).map_err(|e| {
        error!("delete product failed: {e}");
        Error::persistence("delete product", e)
    })?;
    info!(id, screen = %screen, "product deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

type GenericRow = (i64, String, i64, Option<String>, String, String, Option<String>, String);

fn generic_row_to_product(row: GenericRow) -> Product {
    let (id, name, quantity, price, description, image, plan_prices, category) = row;
    // Legacy rows may still carry a serialized plan map in planPrices.
    let pricing = match plan_prices
        .as_deref()
        .and_then(|raw| serde_json::from_str::<BTreeMap<String, String>>(raw).ok())
    {
        Some(map) => Pricing::Plans(map),
        None => Pricing::Single(price.unwrap_or_default()),
    };
    Product {
        id,
        name,
        quantity,
        description,
        images: deserialize_images(&image),
        category,
        target_screen: TargetScreen::Funeraria,
        pricing,
    }
}

fn plan_row_to_product(
    screen: TargetScreen,
    columns: &[(&str, &str)],
    id: i64,
    name: String,
    quantity: i64,
    description: String,
    image: String,
    category: String,
    prices: Vec<Option<String>>,
) -> Product {
    let mut plans = BTreeMap::new();
    for ((plan, _), price) in columns.iter().zip(prices) {
        if let Some(price) = price {
            plans.insert((*plan).to_string(), price);
        }
    }
    Product {
        id,
        name,
        quantity,
        description,
        images: deserialize_images(&image),
        category,
        target_screen: screen,
        pricing: Pricing::Plans(plans),
    }
}

/// List every product belonging to the given target screen.
pub fn get_by_target_screen(db: &DbState, screen: TargetScreen) -> Result<Vec<Product>> {
    let conn = lock_conn(db)?;

    let products = match screen {
        TargetScreen::Funeraria => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, quantity, price, description, image, planPrices, category
                     FROM products WHERE targetScreen = ?1 ORDER BY id",
                )
                .map_err(|e| Error::persistence("prepare products query", e))?;
            let rows = stmt
                .query_map(params![screen.as_str()], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                })
                .map_err(|e| Error::persistence("query products", e))?;
            rows.filter_map(|r| r.ok())
                .map(generic_row_to_product)
                .collect()
        }
        TargetScreen::Parque => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, quantity, description, image, category,
                            valorBronze, valorOuro, valorDiamante, valorDiamantePlus
                     FROM itensParque WHERE targetScreen = ?1 ORDER BY id",
                )
                .map_err(|e| Error::persistence("prepare parque query", e))?;
            let rows = stmt
                .query_map(params![screen.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        vec![row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
                    ))
                })
                .map_err(|e| Error::persistence("query parque items", e))?;
            rows.filter_map(|r| r.ok())
                .map(|(id, name, quantity, description, image, category, prices)| {
                    plan_row_to_product(
                        screen,
                        PARQUE_COLUMNS,
                        id,
                        name,
                        quantity,
                        description,
                        image,
                        category,
                        prices,
                    )
                })
                .collect()
        }
        TargetScreen::Planos => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, quantity, description, image, category,
                            valorStandard, valorMaster, valorPrime
                     FROM itensPlanos WHERE targetScreen = ?1 ORDER BY id",
                )
                .map_err(|e| Error::persistence("prepare planos query", e))?;
            let rows = stmt
                .query_map(params![screen.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        vec![row.get(6)?, row.get(7)?, row.get(8)?],
                    ))
                })
                .map_err(|e| Error::persistence("query planos items", e))?;
            rows.filter_map(|r| r.ok())
                .map(|(id, name, quantity, description, image, category, prices)| {
                    plan_row_to_product(
                        screen,
                        PLANOS_COLUMNS,
                        id,
                        name,
                        quantity,
                        description,
                        image,
                        category,
                        prices,
                    )
                })
                .collect()
        }
    };

    Ok(products)
}

/// Look up a product by id. Absence is a valid, non-error outcome.
pub fn get_product_by_id(db: &DbState, screen: TargetScreen, id: i64) -> Result<Option<Product>> {
    let conn = lock_conn(db)?;

    let product = match screen {
        TargetScreen::Funeraria => conn
            .query_row(
                "SELECT id, name, quantity, price, description, image, planPrices, category
                 FROM products WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::persistence("get product by id", e))?
            .map(generic_row_to_product),
        TargetScreen::Parque => conn
            .query_row(
                "SELECT id, name, quantity, description, image, category,
                        valorBronze, valorOuro, valorDiamante, valorDiamantePlus
                 FROM itensParque WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        vec![row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::persistence("get parque item by id", e))?
            .map(|(id, name, quantity, description, image, category, prices)| {
                plan_row_to_product(
                    screen,
                    PARQUE_COLUMNS,
                    id,
                    name,
                    quantity,
                    description,
                    image,
                    category,
                    prices,
                )
            }),
        TargetScreen::Planos => conn
            .query_row(
                "SELECT id, name, quantity, description, image, category,
                        valorStandard, valorMaster, valorPrime
                 FROM itensPlanos WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        vec![row.get(6)?, row.get(7)?, row.get(8)?],
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::persistence("get planos item by id", e))?
            .map(|(id, name, quantity, description, image, category, prices)| {
                plan_row_to_product(
                    screen,
                    PLANOS_COLUMNS,
                    id,
                    name,
                    quantity,
                    description,
                    image,
                    category,
                    prices,
                )
            }),
    };

    Ok(product)
}

// ---------------------------------------------------------------------------
// Home screen product list
// ---------------------------------------------------------------------------

/// Rebuild the Home screen's merged product list from all three catalogs
/// and cache it to local storage.
pub fn refresh_home_products(db: &DbState, storage: &LocalStorage) -> Result<Vec<Product>> {
    let mut all = get_by_target_screen(db, TargetScreen::Funeraria)?;
    all.extend(get_by_target_screen(db, TargetScreen::Parque)?);
    all.extend(get_by_target_screen(db, TargetScreen::Planos)?);
    storage.set_json(KEY_HOME_PRODUCTS, &all)?;
    Ok(all)
}

/// The last cached Home screen list. Absent or malformed cache reads as
/// empty; the screen falls back to a refresh.
pub fn cached_home_products(storage: &LocalStorage) -> Vec<Product> {
    storage.get_json(KEY_HOME_PRODUCTS).unwrap_or_default()
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

    fn generic_product() -> NewProduct {
        NewProduct {
            name: "Caixão Simples".into(),
            quantity: 5,
            description: "Caixão de madeira".into(),
            images: vec!["u1".into()],
            category: "Caixões".into(),
            target_screen: TargetScreen::Funeraria,
            pricing: Pricing::Single("R$ 100,00".into()),
        }
    }

    fn parque_product() -> NewProduct {
        NewProduct {
            name: "Jazigo Família".into(),
            quantity: 2,
            description: "Jazigo com manutenção".into(),
            images: vec!["u1".into(), "u2".into()],
            category: "Jazigos".into(),
            target_screen: TargetScreen::Parque,
            pricing: Pricing::plans(&[
                ("Bronze", "R$ 50,00"),
                ("Ouro", "R$ 80,00"),
                ("Diamante", "R$ 120,00"),
                ("Diamante Plus", "R$ 150,00"),
            ]),
        }
    }

    #[test]
    fn test_insert_and_read_generic_product() {
        let db = test_db();
        insert_product(&db, &generic_product()).expect("insert");

        let products = get_by_target_screen(&db, TargetScreen::Funeraria).expect("list");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Caixão Simples");
        assert_eq!(products[0].images, vec!["u1".to_string()]);
        assert_eq!(products[0].pricing, Pricing::Single("R$ 100,00".into()));
    }

    #[test]
    fn test_insert_and_read_parque_product() {
        let db = test_db();
        insert_product(&db, &parque_product()).expect("insert");

        let products = get_by_target_screen(&db, TargetScreen::Parque).expect("list");
        assert_eq!(products.len(), 1);
        match &products[0].pricing {
            Pricing::Plans(map) => {
                assert_eq!(map.get("Ouro").map(String::as_str), Some("R$ 80,00"));
                assert_eq!(
                    map.get("Diamante Plus").map(String::as_str),
                    Some("R$ 150,00")
                );
            }
            Pricing::Single(_) => panic!("expected plan pricing"),
        }
    }

    #[test]
    fn test_insert_validates_required_fields() {
        let db = test_db();
        let mut product = generic_product();
        product.name = "".into();
        product.images.clear();

        let err = insert_product(&db, &product).expect_err("must fail validation");
        match err {
            Error::Validation(msg) => {
                assert!(msg.contains("name"), "unexpected message: {msg}");
                assert!(msg.contains("images"), "unexpected message: {msg}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_rejects_mismatched_pricing_shape() {
        let db = test_db();
        let mut product = generic_product();
        product.pricing = Pricing::plans(&[("Bronze", "R$ 10,00")]);
        assert!(matches!(
            insert_product(&db, &product),
            Err(Error::Validation(_))
        ));

        let mut product = parque_product();
        product.pricing = Pricing::Single("R$ 10,00".into());
        assert!(matches!(
            insert_product(&db, &product),
            Err(Error::Validation(_))
        ));

        let mut product = parque_product();
        product.pricing = Pricing::plans(&[("Platina", "R$ 10,00")]);
        assert!(matches!(
            insert_product(&db, &product),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_update_replaces_row() {
        let db = test_db();
        insert_product(&db, &generic_product()).expect("insert");
        let id = get_by_target_screen(&db, TargetScreen::Funeraria).unwrap()[0].id;

        let mut updated = generic_product();
        updated.name = "Caixão Luxo".into();
        updated.pricing = Pricing::Single("R$ 350,00".into());
        update_product(&db, id, &updated).expect("update");

        let product = get_product_by_id(&db, TargetScreen::Funeraria, id)
            .expect("get")
            .expect("present");
        assert_eq!(product.name, "Caixão Luxo");
        assert_eq!(product.pricing, Pricing::Single("R$ 350,00".into()));
    }

    #[test]
    fn test_update_missing_id_is_silent_noop() {
        let db = test_db();
        update_product(&db, 999, &generic_product()).expect("no-op update");
        assert!(get_by_target_screen(&db, TargetScreen::Funeraria)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_home_products_merge_and_cache() {
        let db = test_db();
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path()).expect("storage");

        assert!(cached_home_products(&storage).is_empty());

        insert_product(&db, &generic_product()).expect("insert generic");
        insert_product(&db, &parque_product()).expect("insert parque");

        let all = refresh_home_products(&db, &storage).expect("refresh");
        assert_eq!(all.len(), 2);

        // The cache serves the same list without touching the database.
        let cached = cached_home_products(&storage);
        assert_eq!(cached, all);
    }

    #[test]
    fn test_delete_and_absent_lookup() {
        let db = test_db();
        insert_product(&db, &parque_product()).expect("insert");
        let id = get_by_target_screen(&db, TargetScreen::Parque).unwrap()[0].id;

        delete_product(&db, TargetScreen::Parque, id).expect("delete");
        assert_eq!(
            get_product_by_id(&db, TargetScreen::Parque, id).expect("get"),
            None
        );
    }
}
