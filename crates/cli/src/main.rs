//! Soko CLI - the storefront in a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse
//! soko products list --search "samsung" --sort price-asc
//! soko products show 42
//!
//! # Cart
//! soko cart add 42 --quantity 2
//! soko cart show
//!
//! # Account and checkout
//! soko login --email wanjiru@example.co.ke
//! soko checkout --method mpesa --phone 0712345678
//!
//! # Orders
//! soko orders track 1001
//! soko orders pay 1001 --method card
//! ```
//!
//! # Environment Variables
//!
//! - `SOKO_API_BASE_URL` - Marketplace API base URL
//! - `SOKO_DATA_DIR` - Where the session and cart are kept
//! - `SOKO_PASSWORD` - Password for `login` when not passed as a flag
//! - `RUST_LOG` - Log filter (logs go to stderr)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use soko_storefront::config::StorefrontConfig;
use soko_storefront::state::AppState;
use soko_storefront::{Result, StorefrontError};

mod commands;
mod telemetry;
mod views;

#[derive(Parser)]
#[command(name = "soko")]
#[command(author, version, about = "Soko marketplace storefront")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to your account
    Login(commands::account::LoginArgs),
    /// Create an account
    Register(commands::account::RegisterArgs),
    /// Log out (your cart is kept)
    Logout,
    /// Show the logged-in account
    Whoami {
        /// Fetch the latest profile from the server
        #[arg(long)]
        refresh: bool,
    },
    /// Update your name or phone number
    Profile(commands::account::ProfileArgs),
    /// Browse products
    Products {
        #[command(subcommand)]
        action: commands::catalog::ProductsAction,
    },
    /// List product categories
    Categories,
    /// List delivery zones and fees
    Zones,
    /// View and change your cart
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartAction,
    },
    /// Manage delivery addresses
    Addresses {
        #[command(subcommand)]
        action: commands::addresses::AddressesAction,
    },
    /// Check out the cart
    Checkout(commands::checkout::CheckoutArgs),
    /// View, track, cancel and pay orders
    Orders {
        #[command(subcommand)]
        action: commands::orders::OrdersAction,
    },
    /// Payment status and card verification
    Payments {
        #[command(subcommand)]
        action: commands::payments::PaymentsAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => fail(&StorefrontError::from(e)),
    };

    // Sentry must be initialised before the tracing subscriber
    let _sentry_guard = telemetry::init_sentry(&config);
    telemetry::init_tracing(&config);

    let result = match AppState::new(config) {
        Ok(state) => run(cli, &state).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        fail(&e);
    }
}

async fn run(cli: Cli, state: &AppState) -> Result<()> {
    match cli.command {
        Commands::Login(args) => commands::account::login(state, args).await,
        Commands::Register(args) => commands::account::register(state, args).await,
        Commands::Logout => commands::account::logout(state),
        Commands::Whoami { refresh } => commands::account::whoami(state, refresh).await,
        Commands::Profile(args) => commands::account::profile(state, args).await,
        Commands::Products { action } => commands::catalog::products(state, action).await,
        Commands::Categories => commands::catalog::categories(state).await,
        Commands::Zones => commands::catalog::zones(state).await,
        Commands::Cart { action } => commands::cart::run(state, action).await,
        Commands::Addresses { action } => commands::addresses::run(state, action).await,
        Commands::Checkout(args) => commands::checkout::run(state, args).await,
        Commands::Orders { action } => commands::orders::run(state, action).await,
        Commands::Payments { action } => commands::payments::run(state, action).await,
    }
}

/// Report the error, show the customer-facing message and exit.
fn fail(err: &StorefrontError) -> ! {
    err.report();
    views::error(err);
    std::process::exit(1);
}
