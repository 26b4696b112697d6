use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::dynamodb::map_dynamodb_error;
use crate::models::{RepositoryError, RepositoryResult};

const MAX_WAIT_ATTEMPTS: u32 = 30;
const WAIT_INTERVAL: Duration = Duration::from_secs(10);

/// Creates the users, products and carts tables when they are missing
pub struct TableManager {
    client: Arc<DynamoDbClient>,
}

impl TableManager {
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self { client }
    }

    /// Create a table with a single string hash key. A no-op if it already exists.
    #[instrument(skip(self), fields(table_name = %table_name, hash_key = %hash_key))]
    pub async fn create_table(&self, table_name: &str, hash_key: &str) -> RepositoryResult<()> {
        if self.table_exists(table_name).await? {
            info!("Table {} already exists", table_name);
            return Ok(());
        }

        info!("Creating table");

        let attribute_definition = AttributeDefinition::builder()
            .attribute_name(hash_key)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| RepositoryError::AwsSdk {
                message: format!("Failed to build attribute definition: {}", e),
            })?;

        let key_schema = KeySchemaElement::builder()
            .attribute_name(hash_key)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| RepositoryError::AwsSdk {
                message: format!("Failed to build key schema: {}", e),
            })?;

        self.client
            .create_table()
            .table_name(table_name)
            .attribute_definitions(attribute_definition)
            .key_schema(key_schema)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| map_dynamodb_error(e.into()))?;

        info!("Table creation initiated, waiting for table to become active");
        self.wait_for_table_active(table_name).await?;
        info!("Table {} created successfully", table_name);

        Ok(())
    }

    #[instrument(skip(self), fields(table_name = %table_name))]
    pub async fn table_exists(&self, table_name: &str) -> RepositoryResult<bool> {
        match self.client.describe_table().table_name(table_name).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e
                    .as_service_error()
                    .map(|se| se.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                info!("Table {} does not exist", table_name);
                Ok(false)
            }
            Err(e) => {
                error!("Error checking table existence: {}", e);
                Err(RepositoryError::ConnectionFailed)
            }
        }
    }

    #[instrument(skip(self), fields(table_name = %table_name))]
    async fn wait_for_table_active(&self, table_name: &str) -> RepositoryResult<()> {
        for _ in 0..MAX_WAIT_ATTEMPTS {
            let response = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| map_dynamodb_error(e.into()))?;

            match response.table.and_then(|table| table.table_status) {
                Some(TableStatus::Active) => {
                    info!("Table {} is now active", table_name);
                    return Ok(());
                }
                Some(status) => info!("Table {} status: {:?}, waiting...", table_name, status),
                None => warn!("Table {} status unknown, waiting...", table_name),
            }

            tokio::time::sleep(WAIT_INTERVAL).await;
        }

        error!("Timeout waiting for table {} to become active", table_name);
        Err(RepositoryError::Timeout)
    }

    /// Create all three tables concurrently
    #[instrument(skip(self))]
    pub async fn create_all_tables(
        &self,
        users_table: &str,
        products_table: &str,
        carts_table: &str,
    ) -> RepositoryResult<()> {
        info!("Creating all tables");

        let (users, products, carts) = tokio::join!(
            self.create_table(users_table, "email"),
            self.create_table(products_table, "_id"),
            self.create_table(carts_table, "email"),
        );

        users?;
        products?;
        carts?;

        info!("All tables created successfully");
        Ok(())
    }
}
