//! Cart state container.
//!
//! A process-wide list of cart lines, owned by the application root and
//! shared across screens. Every mutation is persisted to on-device storage
//! so the cart survives restarts; `load` is forgiving and resets to empty
//! on absent or malformed stored state.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{CartLine, Product};
use crate::price;
use crate::storage::{LocalStorage, KEY_CART};

pub struct CartState {
    lines: Mutex<Vec<CartLine>>,
    storage: LocalStorage,
}

impl CartState {
    /// Create an empty cart backed by the given storage. Call [`load`]
    /// to hydrate persisted state.
    ///
    /// [`load`]: CartState::load
    pub fn new(storage: LocalStorage) -> Self {
        CartState {
            lines: Mutex::new(Vec::new()),
            storage,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CartLine>> {
        // The guarded data is a plain Vec; recover from poisoning instead
        // of failing every cart operation after one panicked mutation.
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, lines: &[CartLine]) -> Result<()> {
        self.storage.set_json(KEY_CART, &lines)
    }

    /// Reload the cart from persisted storage. Absence or a parse failure
    /// resets to an empty list; neither is an error.
    pub fn load(&self) {
        let restored: Vec<CartLine> = self.storage.get_json(KEY_CART).unwrap_or_default();
        debug!(lines = restored.len(), "cart loaded from storage");
        *self.lock() = restored;
    }

    /// Add a product selection to the cart.
    ///
    /// If a line with the same (product id, selected plan) already exists
    /// its quantity goes up by one; otherwise a new line is appended with
    /// quantity 1.
    pub fn add_or_increment(&self, product: Product, selected_plan: Option<String>) -> Result<()> {
        let mut lines = self.lock();
        match lines
            .iter_mut()
            .find(|l| l.matches(product.id, selected_plan.as_deref()))
        {
            Some(line) => line.quantity += 1,
            None => lines.push(CartLine {
                product,
                selected_plan,
                quantity: 1,
            }),
        }
        self.persist(&lines)
    }

    /// Increase a line's quantity by one. Unknown identities are ignored.
    pub fn increment(&self, product_id: i64, selected_plan: Option<&str>) -> Result<()> {
        let mut lines = self.lock();
        if let Some(line) = lines.iter_mut().find(|l| l.matches(product_id, selected_plan)) {
            line.quantity += 1;
        }
        self.persist(&lines)
    }

    /// Decrease a line's quantity by one. A present line always has
    /// quantity >= 1: decrementing past that removes the line entirely.
    pub fn decrement(&self, product_id: i64, selected_plan: Option<&str>) -> Result<()> {
        let mut lines = self.lock();
        if let Some(pos) = lines.iter().position(|l| l.matches(product_id, selected_plan)) {
            if lines[pos].quantity > 1 {
                lines[pos].quantity -= 1;
            } else {
                lines.remove(pos);
            }
        }
        self.persist(&lines)
    }

    /// Remove a line unconditionally.
    pub fn remove(&self, product_id: i64, selected_plan: Option<&str>) -> Result<()> {
        let mut lines = self.lock();
        lines.retain(|l| !l.matches(product_id, selected_plan));
        self.persist(&lines)
    }

    /// Empty the cart and persist the empty state. Called after a
    /// successful checkout commit.
    pub fn clear(&self) -> Result<()> {
        let mut lines = self.lock();
        lines.clear();
        info!("cart cleared");
        self.persist(&lines)
    }

    /// Sum of resolved unit price times quantity across all lines.
    /// Recomputed on every call, never cached.
    pub fn total(&self) -> f64 {
        self.lock()
            .iter()
            .map(|line| price::resolve_unit_price(line) * f64::from(line.quantity))
            .sum()
    }

    /// Copy of the current lines, e.g. for the checkout snapshot.
    pub fn snapshot(&self) -> Vec<CartLine> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Pricing, TargetScreen};

    fn test_cart() -> (tempfile::TempDir, CartState) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path()).expect("storage");
        (dir, CartState::new(storage))
    }

    fn coffin() -> Product {
        Product {
            id: 1,
            name: "Caixão Simples".into(),
            quantity: 5,
            description: "Caixão de madeira".into(),
            images: vec!["u1".into()],
            category: "Caixões".into(),
            target_screen: TargetScreen::Funeraria,
            pricing: Pricing::Single("R$ 100,00".into()),
        }
    }

    fn parque_item() -> Product {
        Product {
            id: 2,
            name: "Jazigo Família".into(),
            quantity: 2,
            description: "Jazigo com manutenção".into(),
            images: vec!["u1".into()],
            category: "Jazigos".into(),
            target_screen: TargetScreen::Parque,
            pricing: Pricing::plans(&[("Bronze", "R$ 50,00"), ("Ouro", "R$ 80,00")]),
        }
    }

    #[test]
    fn test_add_or_increment_deduplicates_by_id_and_plan() {
        let (_dir, cart) = test_cart();
        for _ in 0..3 {
            cart.add_or_increment(coffin(), None).expect("add");
        }

        let lines = cart.snapshot();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
    }

    #[test]
    fn test_same_product_different_plans_are_separate_lines() {
        let (_dir, cart) = test_cart();
        cart.add_or_increment(parque_item(), Some("Bronze".into())).unwrap();
        cart.add_or_increment(parque_item(), Some("Ouro".into())).unwrap();
        cart.add_or_increment(parque_item(), Some("Ouro".into())).unwrap();

        let lines = cart.snapshot();
        assert_eq!(lines.len(), 2);
        let ouro = lines
            .iter()
            .find(|l| l.selected_plan.as_deref() == Some("Ouro"))
            .expect("ouro line");
        assert_eq!(ouro.quantity, 2);
    }

    #[test]
    fn test_decrement_removes_line_at_quantity_one() {
        let (_dir, cart) = test_cart();
        cart.add_or_increment(coffin(), None).unwrap();
        cart.add_or_increment(coffin(), None).unwrap();

        cart.decrement(1, None).unwrap();
        assert_eq!(cart.snapshot()[0].quantity, 1);

        cart.decrement(1, None).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_deletes_line_unconditionally() {
        let (_dir, cart) = test_cart();
        cart.add_or_increment(coffin(), None).unwrap();
        cart.add_or_increment(coffin(), None).unwrap();
        cart.remove(1, None).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_total_is_plan_aware_and_recomputed() {
        let (_dir, cart) = test_cart();
        cart.add_or_increment(coffin(), None).unwrap();
        cart.add_or_increment(coffin(), None).unwrap();
        cart.add_or_increment(parque_item(), Some("Ouro".into())).unwrap();

        // 2 x 100.00 + 1 x 80.00
        assert_eq!(cart.total(), 280.0);
        assert_eq!(cart.total(), 280.0);

        cart.increment(2, Some("Ouro")).unwrap();
        assert_eq!(cart.total(), 360.0);
    }

    #[test]
    fn test_cart_survives_reload_from_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path()).expect("storage");

        let cart = CartState::new(storage.clone());
        cart.add_or_increment(coffin(), None).unwrap();
        cart.add_or_increment(coffin(), None).unwrap();
        drop(cart);

        let restored = CartState::new(storage);
        restored.load();
        let lines = restored.snapshot();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }

    #[test]
    fn test_load_with_malformed_state_resets_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path()).expect("storage");
        storage.set(KEY_CART, "{broken").expect("seed bad state");

        let cart = CartState::new(storage);
        cart.load();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_clear_persists_empty_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path()).expect("storage");

        let cart = CartState::new(storage.clone());
        cart.add_or_increment(coffin(), None).unwrap();
        cart.clear().unwrap();

        assert_eq!(storage.get(KEY_CART).as_deref(), Some("[]"));
    }
}
