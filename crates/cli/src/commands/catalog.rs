//! Product, category and delivery zone commands.

use clap::{Subcommand, ValueEnum};

use soko_core::{CategoryId, Money, ProductId};
use soko_storefront::Result;
use soko_storefront::api::types::{ProductQuery, ProductSort};
use soko_storefront::state::AppState;

use crate::views;

#[derive(Subcommand)]
pub enum ProductsAction {
    /// List products
    List {
        /// Page number
        #[arg(long)]
        page: Option<u32>,

        /// Products per page
        #[arg(long)]
        limit: Option<u32>,

        /// Free-text search
        #[arg(short, long)]
        search: Option<String>,

        /// Category id
        #[arg(short, long)]
        category: Option<CategoryId>,

        /// Minimum price in KES
        #[arg(long)]
        min_price: Option<i64>,

        /// Maximum price in KES
        #[arg(long)]
        max_price: Option<i64>,

        /// Sort order
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },
    /// Show one product
    Show {
        /// Product id
        id: ProductId,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl From<SortArg> for ProductSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Newest => Self::Newest,
            SortArg::PriceAsc => Self::PriceAsc,
            SortArg::PriceDesc => Self::PriceDesc,
            SortArg::Name => Self::Name,
        }
    }
}

pub async fn products(state: &AppState, action: ProductsAction) -> Result<()> {
    match action {
        ProductsAction::List {
            page,
            limit,
            search,
            category,
            min_price,
            max_price,
            sort,
        } => {
            let query = ProductQuery {
                page,
                limit,
                search,
                category,
                min_price: min_price.map(Money::from_shillings),
                max_price: max_price.map(Money::from_shillings),
                sort: sort.map(ProductSort::from),
            };
            let page = state.api().list_products(&query).await?;
            views::product_page(&page);
        }
        ProductsAction::Show { id } => {
            let product = state.api().get_product(id).await?;
            views::product(&product);
        }
    }
    Ok(())
}

pub async fn categories(state: &AppState) -> Result<()> {
    let categories = state.api().list_categories().await?;
    views::categories(&categories);
    Ok(())
}

pub async fn zones(state: &AppState) -> Result<()> {
    let zones = state.api().list_delivery_zones().await?;
    views::zones(&zones);
    Ok(())
}
