//! Cart persisted to local storage.

use tracing::{debug, instrument, warn};

use soko_core::ProductId;

use super::{Cart, CartChange, CartError};
use crate::api::types::Product;
use crate::api::{ApiClient, ApiError};
use crate::error::add_breadcrumb;
use crate::storage::{LocalStore, keys};

/// A [`Cart`] that writes itself to [`LocalStore`] after every change.
///
/// Changes are made on a copy and kept only once the copy is saved, so a
/// failed save leaves the cart as it was.
#[derive(Debug)]
pub struct CartStore {
    cart: Cart,
    store: LocalStore,
}

impl CartStore {
    /// Load the cart saved in `store`.
    ///
    /// An unreadable saved cart is discarded rather than blocking the
    /// storefront.
    #[must_use]
    pub fn load(store: LocalStore) -> Self {
        let cart = match store.get::<Cart>(keys::CART) {
            Ok(cart) => cart.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable saved cart");
                Cart::new()
            }
        };
        debug!(lines = cart.lines().len(), "Loaded cart");
        Self { cart, store }
    }

    /// The current cart.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Add `quantity` units of `product`.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity is rejected or the cart cannot be saved.
    pub fn add(&mut self, product: &Product, quantity: u32) -> Result<CartChange, CartError> {
        let change = self.commit(|cart| cart.add(product, quantity))?;
        let id = product.id.to_string();
        add_breadcrumb("cart", "Added to cart", Some(&[("product_id", id.as_str())]));
        Ok(change)
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or the cart cannot be saved.
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartChange, CartError> {
        self.commit(|cart| cart.set_quantity(product_id, quantity))
    }

    /// Add one unit to a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or the cart cannot be saved.
    pub fn increment(&mut self, product_id: ProductId) -> Result<CartChange, CartError> {
        self.commit(|cart| cart.increment(product_id))
    }

    /// Remove one unit from a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or the cart cannot be saved.
    pub fn decrement(&mut self, product_id: ProductId) -> Result<CartChange, CartError> {
        self.commit(|cart| cart.decrement(product_id))
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or the cart cannot be saved.
    pub fn remove(&mut self, product_id: ProductId) -> Result<CartChange, CartError> {
        self.commit(|cart| cart.remove(product_id))
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be saved.
    pub fn clear(&mut self) -> Result<(), CartError> {
        self.commit(|cart| {
            cart.clear();
            Ok(())
        })
    }

    /// Re-check every line against current product data.
    ///
    /// Lines whose product was removed or sold out are dropped; lines above
    /// the new stock level are clamped. Returns the lines that changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a product cannot be fetched or the cart cannot be saved.
    #[instrument(skip_all, fields(lines = self.cart.lines().len()))]
    pub async fn refresh_stock(
        &mut self,
        api: &ApiClient,
    ) -> Result<Vec<(ProductId, CartChange)>, CartError> {
        let mut next = self.cart.clone();
        let ids: Vec<ProductId> = next.lines().iter().map(|l| l.product_id).collect();
        let mut changes = Vec::new();

        for id in ids {
            let before = next.get(id).map(|l| (l.quantity, l.price));
            match api.fetch_product(id).await {
                Ok(product) => {
                    if let Some(change) = next.apply_stock(&product) {
                        let after = next.get(id).map(|l| (l.quantity, l.price));
                        if after != before {
                            changes.push((id, change));
                        }
                    }
                }
                Err(ApiError::NotFound(_)) => {
                    warn!(product_id = %id, "Product no longer listed, removing from cart");
                    next.remove(id)?;
                    changes.push((id, CartChange::Removed));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !changes.is_empty() {
            self.store.set(keys::CART, &next)?;
            self.cart = next;
        }
        Ok(changes)
    }

    fn commit<R>(
        &mut self,
        change: impl FnOnce(&mut Cart) -> Result<R, CartError>,
    ) -> Result<R, CartError> {
        let mut next = self.cart.clone();
        let result = change(&mut next)?;
        self.store.set(keys::CART, &next)?;
        self.cart = next;
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use soko_core::Money;

    fn product(id: i64, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: "Infinix Hot 40".to_string(),
            description: None,
            price: Money::from_shillings(18_999),
            original_price: None,
            stock_quantity: stock,
            category_id: None,
            category_name: None,
            brand: Some("Infinix".to_string()),
            image_url: None,
        }
    }

    #[test]
    fn test_mutations_are_persisted() {
        let store = LocalStore::in_memory();
        let mut carts = CartStore::load(store.clone());
        carts.add(&product(1, 5), 2).unwrap();

        let reloaded = CartStore::load(store.clone());
        assert_eq!(reloaded.cart().item_count(), 2);

        carts.decrement(ProductId::new(1)).unwrap();
        carts.decrement(ProductId::new(1)).unwrap();
        let reloaded = CartStore::load(store);
        assert!(reloaded.cart().is_empty());
    }

    #[test]
    fn test_failed_save_leaves_cart_unchanged() {
        let dir = std::env::temp_dir().join(format!("soko-cart-unsaved-{}", std::process::id()));
        let _ = std::fs::remove_file(&dir);
        let _ = std::fs::remove_dir_all(&dir);
        let mut carts = CartStore::load(LocalStore::open(&dir).unwrap());
        carts.add(&product(1, 5), 1).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"").unwrap();

        assert!(matches!(
            carts.add(&product(1, 5), 2),
            Err(CartError::Storage(_))
        ));
        assert!(carts.clear().is_err());
        assert_eq!(carts.cart().item_count(), 1);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn test_unreadable_cart_is_discarded() {
        let store = LocalStore::in_memory();
        store.set(keys::CART, "not a cart").unwrap();
        let carts = CartStore::load(store);
        assert!(carts.cart().is_empty());
    }

    #[test]
    fn test_clear_persists_empty_cart() {
        let store = LocalStore::in_memory();
        let mut carts = CartStore::load(store.clone());
        carts.add(&product(1, 5), 1).unwrap();
        carts.clear().unwrap();
        let saved: Vec<serde_json::Value> = store.get(keys::CART).unwrap().unwrap();
        assert!(saved.is_empty());
    }
}
