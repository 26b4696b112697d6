use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Catalogue entry, read-only from the cart's point of view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub category: String,
    pub rating: u8,
    pub cost: Decimal,
    pub image: String,
}

impl Product {
    /// Price of `quantity` units of this product, `None` on overflow
    pub fn line_total(&self, quantity: u32) -> Option<Decimal> {
        self.cost.checked_mul(Decimal::from(quantity))
    }
}
