use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Placeholder stored in `address` until the user configures a shipping address
pub const DEFAULT_ADDRESS: &str = "ADDRESS_NOT_SET";

/// Wallet balance credited to newly registered users
pub const DEFAULT_WALLET_MONEY: Decimal = dec!(500);

/// Capability query used by checkout to decide whether an order can be shipped
pub trait ShippingProfile {
    /// True when the user has configured an address other than the placeholder
    fn has_non_default_address(&self) -> bool;
}

/// A registered shopper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub name: String,
    #[serde(default = "default_wallet_money")]
    pub wallet_money: Decimal,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub version: u64,
}

impl User {
    /// Create a user with the default wallet balance and no address
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            wallet_money: DEFAULT_WALLET_MONEY,
            address: Some(DEFAULT_ADDRESS.to_string()),
            version: 0,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_wallet_money(mut self, wallet_money: Decimal) -> Self {
        self.wallet_money = wallet_money;
        self
    }
}

impl ShippingProfile for User {
    fn has_non_default_address(&self) -> bool {
        match self.address.as_deref().map(str::trim) {
            Some(address) => !address.is_empty() && address != DEFAULT_ADDRESS,
            None => false,
        }
    }
}

fn default_wallet_money() -> Decimal {
    DEFAULT_WALLET_MONEY
}
