//! Shopping cart.
//!
//! The cart is the only state the client owns: it lives on the device and
//! is never sent to the server until an order is placed. [`Cart`] is a plain
//! value type holding the quantity rules; [`CartStore`] persists it after
//! every change.
//!
//! Every line satisfies `1 <= quantity <= stock_quantity`.

mod store;

pub use store::CartStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use soko_core::{Money, ProductId};

use crate::api::ApiError;
use crate::api::types::Product;
use crate::storage::StorageError;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product has no stock left.
    #[error("{0} is out of stock")]
    OutOfStock(String),

    /// A quantity of zero was requested for a new line.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The product is not in the cart.
    #[error("Item is not in your cart")]
    NotInCart(ProductId),

    /// Fetching product data failed.
    #[error("Failed to load product: {0}")]
    Api(#[from] ApiError),

    /// Persisting the cart failed.
    #[error("Failed to save cart: {0}")]
    Storage(#[from] StorageError),
}

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub stock_quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CartItem {
    fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            quantity,
            stock_quantity: product.stock_quantity,
            image_url: product.image_url.clone(),
        }
    }

    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

/// What a mutation did to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartChange {
    /// A new line was created.
    Added { quantity: u32 },
    /// An existing line now has `quantity` units.
    Updated { quantity: u32 },
    /// The request exceeded the stock ceiling; the line holds `quantity`.
    Clamped { requested: u32, quantity: u32 },
    /// The line was removed.
    Removed,
}

/// The customer's cart.
///
/// Serialized as a plain list of lines; loading re-applies the quantity
/// rules so a hand-edited or stale file cannot break them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartItem>", into = "Vec<CartItem>")]
pub struct Cart {
    items: Vec<CartItem>,
}

impl From<Vec<CartItem>> for Cart {
    fn from(items: Vec<CartItem>) -> Self {
        let mut cart = Self::default();
        for item in items {
            let quantity = item.quantity.min(item.stock_quantity);
            if quantity == 0 {
                continue;
            }
            match cart.position(item.product_id) {
                Some(i) => {
                    let line = &mut cart.items[i];
                    line.quantity = line
                        .quantity
                        .saturating_add(quantity)
                        .min(line.stock_quantity);
                }
                None => cart.items.push(CartItem { quantity, ..item }),
            }
        }
        cart
    }
}

impl From<Cart> for Vec<CartItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` units of `product`, merging with an existing line.
    ///
    /// The line's stock ceiling is updated from `product`. Requests above the
    /// ceiling are clamped and reported as [`CartChange::Clamped`].
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for a zero quantity and
    /// `CartError::OutOfStock` if the product has no stock.
    pub fn add(&mut self, product: &Product, quantity: u32) -> Result<CartChange, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        if product.stock_quantity == 0 {
            return Err(CartError::OutOfStock(product.name.clone()));
        }

        let ceiling = product.stock_quantity;
        if let Some(i) = self.position(product.id) {
            let line = &mut self.items[i];
            line.stock_quantity = ceiling;
            line.price = product.price;
            let requested = line.quantity.saturating_add(quantity);
            line.quantity = requested.min(ceiling);
            return Ok(clamp_change(requested, line.quantity, false));
        }

        let line = CartItem::from_product(product, quantity.min(ceiling));
        let change = clamp_change(quantity, line.quantity, true);
        self.items.push(line);
        Ok(change)
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product is not in the cart.
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartChange, CartError> {
        let i = self
            .position(product_id)
            .ok_or(CartError::NotInCart(product_id))?;

        if quantity == 0 {
            self.items.remove(i);
            return Ok(CartChange::Removed);
        }

        let line = &mut self.items[i];
        line.quantity = quantity.min(line.stock_quantity);
        Ok(clamp_change(quantity, line.quantity, false))
    }

    /// Add one unit to a line, up to its stock ceiling.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product is not in the cart.
    pub fn increment(&mut self, product_id: ProductId) -> Result<CartChange, CartError> {
        let current = self
            .get(product_id)
            .ok_or(CartError::NotInCart(product_id))?
            .quantity;
        self.set_quantity(product_id, current.saturating_add(1))
    }

    /// Remove one unit from a line; the last unit removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product is not in the cart.
    pub fn decrement(&mut self, product_id: ProductId) -> Result<CartChange, CartError> {
        let current = self
            .get(product_id)
            .ok_or(CartError::NotInCart(product_id))?
            .quantity;
        self.set_quantity(product_id, current.saturating_sub(1))
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product is not in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> Result<CartChange, CartError> {
        self.set_quantity(product_id, 0)
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Re-apply fresh stock and price data to the matching line.
    ///
    /// Returns `None` when the product is not in the cart.
    pub fn apply_stock(&mut self, product: &Product) -> Option<CartChange> {
        let i = self.position(product.id)?;
        let line = &mut self.items[i];
        line.stock_quantity = product.stock_quantity;
        line.price = product.price;
        line.name.clone_from(&product.name);

        if product.stock_quantity == 0 {
            self.items.remove(i);
            return Some(CartChange::Removed);
        }
        if line.quantity > product.stock_quantity {
            let requested = line.quantity;
            line.quantity = product.stock_quantity;
            return Some(CartChange::Clamped {
                requested,
                quantity: line.quantity,
            });
        }
        Some(CartChange::Updated {
            quantity: line.quantity,
        })
    }

    /// Total number of units.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Sum of line totals. Delivery is priced by the server.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Lines in the order they were added.
    #[must_use]
    pub fn lines(&self) -> &[CartItem] {
        &self.items
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The line for `product_id`.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Whether `product_id` is in the cart.
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.get(product_id).is_some()
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.items.iter().position(|i| i.product_id == product_id)
    }
}

const fn clamp_change(requested: u32, quantity: u32, new_line: bool) -> CartChange {
    if quantity < requested {
        CartChange::Clamped {
            requested,
            quantity,
        }
    } else if new_line {
        CartChange::Added { quantity }
    } else {
        CartChange::Updated { quantity }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: i64, price: i64, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: None,
            price: Money::from_shillings(price),
            original_price: None,
            stock_quantity: stock,
            category_id: None,
            category_name: None,
            brand: None,
            image_url: None,
        }
    }

    #[test]
    fn test_add_merges_lines() {
        let mut cart = Cart::new();
        let phone = product(1, 15_000, 10);

        assert_eq!(cart.add(&phone, 2).unwrap(), CartChange::Added { quantity: 2 });
        assert_eq!(
            cart.add(&phone, 3).unwrap(),
            CartChange::Updated { quantity: 5 }
        );
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn test_add_clamps_to_stock() {
        let mut cart = Cart::new();
        let tv = product(2, 45_000, 3);

        assert_eq!(
            cart.add(&tv, 5).unwrap(),
            CartChange::Clamped {
                requested: 5,
                quantity: 3
            }
        );
        assert_eq!(
            cart.add(&tv, 1).unwrap(),
            CartChange::Clamped {
                requested: 4,
                quantity: 3
            }
        );
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_add_rejects_out_of_stock_and_zero() {
        let mut cart = Cart::new();
        assert!(matches!(
            cart.add(&product(3, 100, 0), 1),
            Err(CartError::OutOfStock(_))
        ));
        assert!(matches!(
            cart.add(&product(4, 100, 5), 0),
            Err(CartError::InvalidQuantity)
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_increment_stops_at_ceiling() {
        let mut cart = Cart::new();
        let id = ProductId::new(5);
        cart.add(&product(5, 500, 2), 1).unwrap();

        assert_eq!(cart.increment(id).unwrap(), CartChange::Updated { quantity: 2 });
        assert_eq!(
            cart.increment(id).unwrap(),
            CartChange::Clamped {
                requested: 3,
                quantity: 2
            }
        );
        assert_eq!(cart.get(id).unwrap().quantity, 2);
    }

    #[test]
    fn test_decrement_last_unit_removes_line() {
        let mut cart = Cart::new();
        let id = ProductId::new(6);
        cart.add(&product(6, 500, 5), 2).unwrap();

        assert_eq!(cart.decrement(id).unwrap(), CartChange::Updated { quantity: 1 });
        assert_eq!(cart.decrement(id).unwrap(), CartChange::Removed);
        assert!(!cart.contains(id));
        assert!(matches!(cart.decrement(id), Err(CartError::NotInCart(_))));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::new();
        let id = ProductId::new(7);
        cart.add(&product(7, 500, 5), 2).unwrap();
        assert_eq!(cart.set_quantity(id, 0).unwrap(), CartChange::Removed);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_subtotal() {
        let mut cart = Cart::new();
        cart.add(&product(1, 1_500, 10), 2).unwrap();
        cart.add(&product(2, 250, 10), 4).unwrap();
        assert_eq!(cart.subtotal(), Money::from_shillings(4_000));
    }

    #[test]
    fn test_apply_stock() {
        let mut cart = Cart::new();
        cart.add(&product(1, 100, 10), 6).unwrap();
        cart.add(&product(2, 100, 10), 1).unwrap();

        assert_eq!(
            cart.apply_stock(&product(1, 120, 4)),
            Some(CartChange::Clamped {
                requested: 6,
                quantity: 4
            })
        );
        assert_eq!(cart.get(ProductId::new(1)).unwrap().price, Money::from_shillings(120));
        assert_eq!(cart.apply_stock(&product(2, 100, 0)), Some(CartChange::Removed));
        assert_eq!(cart.apply_stock(&product(9, 100, 3)), None);
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_load_normalizes_stored_lines() {
        let json = serde_json::json!([
            { "product_id": 1, "name": "Earbuds", "price": "2500", "quantity": 9, "stock_quantity": 4 },
            { "product_id": 2, "name": "Cable", "price": "300", "quantity": 0, "stock_quantity": 4 },
            { "product_id": 1, "name": "Earbuds", "price": "2500", "quantity": 1, "stock_quantity": 4 }
        ]);
        let cart: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 4);
    }
}
