//! Login, registration and profile commands.

use clap::Args;

use soko_storefront::Result;
use soko_storefront::services::auth::RegisterForm;
use soko_storefront::state::AppState;

use crate::views;

#[derive(Args)]
pub struct LoginArgs {
    /// Account email address
    #[arg(short, long)]
    email: String,

    /// Account password
    #[arg(long, env = "SOKO_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
pub struct RegisterArgs {
    /// Full name
    #[arg(short, long)]
    name: String,

    /// Email address
    #[arg(short, long)]
    email: String,

    /// Mobile number, e.g. 0712 345 678
    #[arg(short, long)]
    phone: String,

    /// Password (at least 8 characters)
    #[arg(long, env = "SOKO_PASSWORD", hide_env_values = true)]
    password: String,

    /// Password again
    #[arg(long)]
    confirm_password: String,
}

#[derive(Args)]
pub struct ProfileArgs {
    /// New display name
    #[arg(short, long)]
    name: Option<String>,

    /// New mobile number
    #[arg(short, long)]
    phone: Option<String>,
}

pub async fn login(state: &AppState, args: LoginArgs) -> Result<()> {
    let user = state.auth().login(&args.email, &args.password).await?;
    views::notice(&format!("Welcome back, {}!", user.name));
    Ok(())
}

pub async fn register(state: &AppState, args: RegisterArgs) -> Result<()> {
    let form = RegisterForm {
        name: args.name,
        email: args.email,
        phone: args.phone,
        password: args.password,
        password_confirmation: args.confirm_password,
    };
    let user = state.auth().register(&form).await?;
    views::notice(&format!("Karibu, {}! Your account is ready.", user.name));
    Ok(())
}

pub fn logout(state: &AppState) -> Result<()> {
    state.auth().logout()?;
    views::notice("Logged out. Your cart is still here.");
    Ok(())
}

pub async fn whoami(state: &AppState, refresh: bool) -> Result<()> {
    let auth = state.auth();
    let user = if refresh {
        Some(auth.refresh_profile().await?)
    } else {
        auth.current_user()
    };
    match user {
        Some(user) => views::user(&user),
        None => views::notice("Not logged in."),
    }
    Ok(())
}

pub async fn profile(state: &AppState, args: ProfileArgs) -> Result<()> {
    let user = state
        .auth()
        .update_profile(args.name.as_deref(), args.phone.as_deref())
        .await?;
    views::notice("Profile updated.");
    views::user(&user);
    Ok(())
}
