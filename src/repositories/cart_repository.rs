use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

use super::dynamodb::{
    dynamodb_span, get_number, get_string, get_timestamp, get_version,
    is_conditional_put_failure, map_dynamodb_error, number, string, Item,
};
use super::product_repository::{item_to_product, product_to_item};
use crate::models::{Cart, CartItem, PaymentOption, RepositoryError, RepositoryResult};

/// Trait defining the interface for cart data access operations
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Find the cart belonging to `email`
    async fn find_cart(&self, email: &str) -> RepositoryResult<Option<Cart>>;

    /// Create an empty cart for `email`. Fails if one already exists.
    async fn create_cart(&self, email: &str) -> RepositoryResult<Cart>;

    /// Persist the cart if the stored version still matches `cart.version`.
    /// Returns the cart with its version incremented.
    async fn save_cart(&self, cart: Cart) -> RepositoryResult<Cart>;
}

/// DynamoDB implementation of the CartRepository trait
pub struct DynamoDbCartRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    region: String,
}

impl DynamoDbCartRepository {
    /// Create a new DynamoDB cart repository
    pub fn new(client: Arc<DynamoDbClient>, table_name: String, region: String) -> Self {
        Self {
            client,
            table_name,
            region,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Convert a Cart struct to DynamoDB attribute values
    pub fn cart_to_item(&self, cart: &Cart) -> Item {
        let mut item = Item::new();

        item.insert("email".to_string(), string(cart.email.clone()));
        item.insert("_id".to_string(), string(cart.id.to_string()));

        let cart_items: Vec<AttributeValue> = cart
            .cart_items
            .iter()
            .map(|cart_item| {
                let mut item_map = Item::new();
                item_map.insert(
                    "product".to_string(),
                    AttributeValue::M(product_to_item(&cart_item.product)),
                );
                item_map.insert("quantity".to_string(), number(cart_item.quantity));
                AttributeValue::M(item_map)
            })
            .collect();

        item.insert("cartItems".to_string(), AttributeValue::L(cart_items));
        item.insert(
            "paymentOption".to_string(),
            string(cart.payment_option.as_str()),
        );
        item.insert("version".to_string(), number(cart.version));
        item.insert(
            "created_at".to_string(),
            string(cart.created_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            string(cart.updated_at.to_rfc3339()),
        );

        item
    }

    /// Convert DynamoDB item to Cart struct
    pub fn item_to_cart(&self, item: &Item) -> RepositoryResult<Cart> {
        let email = get_string(item, "email")?;

        let id = get_string(item, "_id")?
            .parse::<Uuid>()
            .map_err(|e| RepositoryError::InvalidDocument {
                message: format!("Invalid _id: {}", e),
            })?;

        let cart_items = match item.get("cartItems").and_then(|v| v.as_l().ok()) {
            Some(list) => list
                .iter()
                .map(|attr| match attr.as_m() {
                    Ok(item_map) => self.map_to_cart_item(item_map),
                    Err(_) => Err(RepositoryError::InvalidDocument {
                        message: "Cart item is not a map".to_string(),
                    }),
                })
                .collect::<RepositoryResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let payment_option = get_string(item, "paymentOption")
            .ok()
            .and_then(|s| s.parse::<PaymentOption>().ok())
            .unwrap_or_default();

        let created_at = get_timestamp(item, "created_at")?;
        // Legacy documents may lack updated_at
        let updated_at = get_timestamp(item, "updated_at").unwrap_or(created_at);

        Ok(Cart {
            id,
            email,
            cart_items,
            payment_option,
            version: get_version(item),
            created_at,
            updated_at,
        })
    }

    /// Convert DynamoDB map to CartItem
    pub fn map_to_cart_item(&self, item_map: &Item) -> RepositoryResult<CartItem> {
        let product = item_map
            .get("product")
            .and_then(|v| v.as_m().ok())
            .ok_or_else(|| RepositoryError::InvalidDocument {
                message: "Missing product in cart item".to_string(),
            })
            .and_then(item_to_product)?;

        let quantity = get_number(item_map, "quantity")?;

        Ok(CartItem { product, quantity })
    }
}

#[async_trait]
impl CartRepository for DynamoDbCartRepository {
    #[instrument(skip(self), fields(table = %self.table_name, email = %email))]
    async fn find_cart(&self, email: &str) -> RepositoryResult<Option<Cart>> {
        info!("Finding cart for user");

        let get_span = dynamodb_span("GetItem", &self.table_name, &self.region);

        let response = async {
            self.client
                .get_item()
                .table_name(&self.table_name)
                .key("email", AttributeValue::S(email.to_string()))
                .consistent_read(true)
                .send()
                .await
                .map_err(|e| map_dynamodb_error(e.into()))
        }
        .instrument(get_span)
        .await?;

        match response.item {
            Some(item) => {
                let cart = self.item_to_cart(&item)?;
                info!("Cart found with {} items", cart.cart_items.len());
                Ok(Some(cart))
            }
            None => {
                info!("Cart not found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(table = %self.table_name, email = %email))]
    async fn create_cart(&self, email: &str) -> RepositoryResult<Cart> {
        info!("Creating cart");

        let cart = Cart::new(email);
        let item = self.cart_to_item(&cart);

        let put_span = dynamodb_span("PutItem", &self.table_name, &self.region);

        let result = async {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression("attribute_not_exists(email)")
                .send()
                .await
        }
        .instrument(put_span)
        .await;

        match result {
            Ok(_) => {
                info!("Cart created successfully");
                Ok(cart)
            }
            Err(e) if is_conditional_put_failure(&e) => {
                warn!("Cart already exists");
                Err(RepositoryError::AlreadyExists {
                    key: email.to_string(),
                })
            }
            Err(e) => Err(map_dynamodb_error(e.into())),
        }
    }

    #[instrument(skip(self, cart), fields(table = %self.table_name, email = %cart.email, item_count = cart.cart_items.len(), version = cart.version))]
    async fn save_cart(&self, cart: Cart) -> RepositoryResult<Cart> {
        info!("Saving cart");

        let expected = cart.version;
        let saved = Cart {
            version: expected + 1,
            ..cart
        };
        let item = self.cart_to_item(&saved);

        let put_span = dynamodb_span("PutItem", &self.table_name, &self.region);

        let result = async {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression("attribute_exists(email) AND #version = :expected")
                .expression_attribute_names("#version", "version")
                .expression_attribute_values(":expected", number(expected))
                .send()
                .await
        }
        .instrument(put_span)
        .await;

        match result {
            Ok(_) => {
                info!("Cart saved successfully");
                Ok(saved)
            }
            Err(e) if is_conditional_put_failure(&e) => {
                warn!("Cart was modified concurrently");
                Err(RepositoryError::VersionConflict {
                    key: saved.email,
                    expected,
                })
            }
            Err(e) => Err(map_dynamodb_error(e.into())),
        }
    }
}
