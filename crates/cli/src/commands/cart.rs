//! Cart commands.

use clap::Subcommand;

use soko_core::ProductId;
use soko_storefront::Result;
use soko_storefront::cart::{CartChange, CartError, CartStore};
use soko_storefront::state::AppState;

use crate::views;

#[derive(Subcommand)]
pub enum CartAction {
    /// Show the cart
    Show {
        /// Re-check stock and prices first
        #[arg(long)]
        refresh: bool,
    },
    /// Add a product
    Add {
        /// Product id
        product_id: ProductId,

        /// How many to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (0 removes it)
    Set { product_id: ProductId, quantity: u32 },
    /// Add one unit
    Inc { product_id: ProductId },
    /// Remove one unit
    Dec { product_id: ProductId },
    /// Remove a line
    Remove { product_id: ProductId },
    /// Empty the cart
    Clear,
}

pub async fn run(state: &AppState, action: CartAction) -> Result<()> {
    let mut cart = state.cart().await;
    match action {
        CartAction::Show { refresh } => {
            if refresh {
                let changes = cart.refresh_stock(state.api()).await?;
                for (id, change) in changes {
                    views::cart_change(&id.to_string(), change);
                }
            }
            views::cart(cart.cart());
        }
        CartAction::Add {
            product_id,
            quantity,
        } => {
            let product = state.api().fetch_product(product_id).await?;
            let change = cart.add(&product, quantity)?;
            views::cart_change(&product.name, change);
        }
        CartAction::Set {
            product_id,
            quantity,
        } => change_line(&mut cart, product_id, |c| c.set_quantity(product_id, quantity))?,
        CartAction::Inc { product_id } => {
            change_line(&mut cart, product_id, |c| c.increment(product_id))?;
        }
        CartAction::Dec { product_id } => {
            change_line(&mut cart, product_id, |c| c.decrement(product_id))?;
        }
        CartAction::Remove { product_id } => {
            change_line(&mut cart, product_id, |c| c.remove(product_id))?;
        }
        CartAction::Clear => {
            cart.clear()?;
            views::notice("Your cart is empty.");
        }
    }
    Ok(())
}

fn change_line(
    cart: &mut CartStore,
    product_id: ProductId,
    change: impl FnOnce(&mut CartStore) -> std::result::Result<CartChange, CartError>,
) -> Result<()> {
    let name = cart
        .cart()
        .get(product_id)
        .map_or_else(|| product_id.to_string(), |line| line.name.clone());
    let change = change(cart)?;
    views::cart_change(&name, change);
    Ok(())
}
