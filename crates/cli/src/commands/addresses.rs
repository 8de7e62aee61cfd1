//! Address book commands.

use clap::{Args, Subcommand};

use soko_core::{AddressId, DeliveryZoneId, PhoneNumber};
use soko_storefront::Result;
use soko_storefront::api::types::AddressInput;
use soko_storefront::services::auth::AuthError;
use soko_storefront::state::AppState;

use crate::views;

#[derive(Subcommand)]
pub enum AddressesAction {
    /// List saved addresses (* marks the default)
    List,
    /// Save a new address
    Add(AddAddressArgs),
    /// Make an address the default
    Default { id: AddressId },
    /// Delete an address
    Delete { id: AddressId },
}

#[derive(Args)]
pub struct AddAddressArgs {
    /// Who receives the parcel
    #[arg(long)]
    recipient: String,

    /// Recipient's mobile number
    #[arg(long)]
    phone: String,

    #[arg(long)]
    county: String,

    #[arg(long)]
    town: String,

    #[arg(long)]
    street: String,

    /// Building, floor or house number
    #[arg(long)]
    building: Option<String>,

    /// Short label such as Home or Office
    #[arg(long)]
    label: Option<String>,

    /// Delivery zone id (see `soko zones`)
    #[arg(long)]
    zone: Option<DeliveryZoneId>,

    /// Make this the default address
    #[arg(long)]
    default: bool,
}

pub async fn run(state: &AppState, action: AddressesAction) -> Result<()> {
    let api = state.api();
    match action {
        AddressesAction::List => views::addresses(&api.list_addresses().await?),
        AddressesAction::Add(args) => {
            let phone = PhoneNumber::parse(&args.phone).map_err(AuthError::from)?;
            let input = AddressInput {
                label: args.label,
                recipient_name: args.recipient,
                phone: phone.local_format(),
                county: args.county,
                town: args.town,
                street: args.street,
                building: args.building,
                delivery_zone_id: args.zone,
                is_default: args.default,
            };
            let address = api.create_address(&input).await?;
            views::notice(&format!("Saved address {}.", address.id));
        }
        AddressesAction::Default { id } => {
            let address = api.set_default_address(id).await?;
            views::notice(&format!("Default address: {}", address.summary()));
        }
        AddressesAction::Delete { id } => {
            api.delete_address(id).await?;
            views::notice(&format!("Deleted address {id}."));
        }
    }
    Ok(())
}
