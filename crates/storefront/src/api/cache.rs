//! Cache types for catalog responses.

use soko_core::ProductId;

use super::types::{Category, Product, ProductPage, ProductQuery};

/// Cache key for catalog lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products(ProductQuery),
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(ProductPage),
    Categories(Vec<Category>),
}
