//! Product and category endpoints.

use tracing::{debug, instrument};

use soko_core::ProductId;

use super::cache::{CacheKey, CacheValue};
use super::client::Call;
use super::types::{Category, Product, ProductPage, ProductQuery};
use super::{ApiClient, ApiError};

impl ApiClient {
    /// Get a page of products.
    ///
    /// Listings are cached; free-text searches always go to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: &ProductQuery) -> Result<ProductPage, ApiError> {
        let cache_key = CacheKey::Products(query.clone());

        if !query.is_search()
            && let Some(CacheValue::Products(page)) = self.cache().get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let page: ProductPage = self
            .execute(Call::get("products").query(query.to_pairs()))
            .await?;

        if !query.is_search() {
            self.cache()
                .insert(cache_key, CacheValue::Products(page.clone()))
                .await;
        }

        Ok(page)
    }

    /// Get a product by id, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        if let Some(CacheValue::Product(product)) = self.cache().get(&CacheKey::Product(id)).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }
        self.fetch_product(id).await
    }

    /// Get a product by id, bypassing the cache.
    ///
    /// Used wherever stock levels matter (adding to cart, checkout).
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn fetch_product(&self, id: ProductId) -> Result<Product, ApiError> {
        let product: Product = self.execute(Call::get(format!("products/{id}"))).await?;
        self.cache()
            .insert(CacheKey::Product(id), CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// List product categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache().get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self.execute(Call::get("categories")).await?;
        self.cache()
            .insert(CacheKey::Categories, CacheValue::Categories(categories.clone()))
            .await;
        Ok(categories)
    }

    /// Drop every cached catalog response (e.g. after an order changed stock).
    pub fn invalidate_catalog(&self) {
        self.cache().invalidate_all();
    }
}
