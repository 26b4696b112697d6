use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::sync::Arc;
use tracing::{info, instrument, Instrument};

use super::dynamodb::{
    dynamodb_span, get_decimal, get_number, get_string, map_dynamodb_error, number, string, Item,
};
use crate::models::{Product, RepositoryResult};

/// Read-only product lookup
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Find a product by its identifier
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Product>>;
}

/// DynamoDB implementation of the ProductRepository trait
pub struct DynamoDbProductRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    region: String,
}

impl DynamoDbProductRepository {
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
}

/// Encode a product as a DynamoDB map. Also used for the copy embedded in cart items.
pub(crate) fn product_to_item(product: &Product) -> Item {
    let mut item = Item::new();
    item.insert("_id".to_string(), string(product.id.clone()));
    item.insert("name".to_string(), string(product.name.clone()));
    item.insert("category".to_string(), string(product.category.clone()));
    item.insert("rating".to_string(), number(product.rating));
    item.insert("cost".to_string(), number(product.cost));
    item.insert("image".to_string(), string(product.image.clone()));
    item
}

pub(crate) fn item_to_product(item: &Item) -> RepositoryResult<Product> {
    Ok(Product {
        id: get_string(item, "_id")?,
        name: get_string(item, "name")?,
        category: get_string(item, "category").unwrap_or_default(),
        rating: get_number(item, "rating").unwrap_or_default(),
        cost: get_decimal(item, "cost")?,
        image: get_string(item, "image").unwrap_or_default(),
    })
}

#[async_trait]
impl ProductRepository for DynamoDbProductRepository {
    #[instrument(skip(self), fields(table = %self.table_name, product_id = %id))]
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Product>> {
        info!("Finding product by ID");

        let get_span = dynamodb_span("GetItem", &self.table_name, &self.region);

        let response = async {
            self.client
                .get_item()
                .table_name(&self.table_name)
                .key("_id", AttributeValue::S(id.to_string()))
                .send()
                .await
                .map_err(|e| map_dynamodb_error(e.into()))
        }
        .instrument(get_span)
        .await?;

        match response.item {
            Some(item) => {
                let product = item_to_product(&item)?;
                info!("Product found");
                Ok(Some(product))
            }
            None => {
                info!("Product not found");
                Ok(None)
            }
        }
    }
}
