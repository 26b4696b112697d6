use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Product;

/// Payment method attached to a cart. Only the default option exists today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOption {
    #[default]
    #[serde(rename = "PAYMENT_OPTION_DEFAULT")]
    Default,
}

impl PaymentOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOption::Default => "PAYMENT_OPTION_DEFAULT",
        }
    }
}

impl std::str::FromStr for PaymentOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_OPTION_DEFAULT" => Ok(PaymentOption::Default),
            other => Err(format!("Unknown payment option: {}", other)),
        }
    }
}

/// Shopping cart owned by a single user, keyed by the user's email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    pub cart_items: Vec<CartItem>,
    #[serde(default)]
    pub payment_option: PaymentOption,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product together with the quantity the user wants to buy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
}

/// Request body for adding a product or changing its quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: String,
    pub quantity: Option<u32>,
}

/// Result of a successful checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub email: String,
    pub total: Decimal,
    pub wallet_money: Decimal,
}

impl Cart {
    /// Create a new empty cart for the given email
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            cart_items: Vec::new(),
            payment_option: PaymentOption::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Find the item holding `product_id`
    pub fn find_item(&self, product_id: &str) -> Option<&CartItem> {
        self.cart_items
            .iter()
            .find(|item| item.product.id == product_id)
    }

    pub fn contains_product(&self, product_id: &str) -> bool {
        self.find_item(product_id).is_some()
    }

    /// Append a new line item. Callers check for duplicates first.
    pub fn push_item(&mut self, product: Product, quantity: u32) {
        self.cart_items.push(CartItem { product, quantity });
        self.updated_at = Utc::now();
    }

    /// Overwrite the quantity of an existing item. Returns false when the product is absent.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> bool {
        match self
            .cart_items
            .iter_mut()
            .find(|item| item.product.id == product_id)
        {
            Some(item) => {
                item.quantity = quantity;
                self.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove the item holding `product_id`, keeping the order of the others
    pub fn remove_product(&mut self, product_id: &str) -> Option<CartItem> {
        let index = self
            .cart_items
            .iter()
            .position(|item| item.product.id == product_id)?;
        self.updated_at = Utc::now();
        Some(self.cart_items.remove(index))
    }

    pub fn clear(&mut self) {
        self.cart_items.clear();
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.cart_items.is_empty()
    }

    /// Sum of cost * quantity over all items, `None` if it does not fit in a `Decimal`
    pub fn total(&self) -> Option<Decimal> {
        self.cart_items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.total()?))
    }
}

impl CartItem {
    pub fn total(&self) -> Option<Decimal> {
        self.product.line_total(self.quantity)
    }
}
