use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::operation::get_item::builders::GetItemFluentBuilder;
use aws_sdk_dynamodb::operation::update_item::builders::UpdateItemFluentBuilder;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};

use super::dynamodb::{
    dynamodb_span, get_decimal, get_string, get_version, is_conditional_update_failure,
    map_dynamodb_error, number, Item,
};
use crate::models::{RepositoryError, RepositoryResult, User};

/// Users are owned by the account service. Only the wallet balance is written here.
const WALLET_UPDATE_EXPRESSION: &str = "SET walletMoney = :wallet, #version = :next";

/// User lookup and wallet persistence
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by email
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    /// Write `user.wallet_money` if the stored version still matches `user.version`.
    /// No other attribute of the stored user is touched. Returns the stored
    /// user with its version incremented.
    async fn save(&self, user: User) -> RepositoryResult<User>;
}

/// DynamoDB implementation of the UserRepository trait
pub struct DynamoDbUserRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    region: String,
}

impl DynamoDbUserRepository {
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

    /// Strongly consistent lookup, so a wallet written by the previous
    /// checkout is always visible with its new version
    pub fn get_user_request(&self, email: &str) -> GetItemFluentBuilder {
        self.client
            .get_item()
            .table_name(&self.table_name)
            .key("email", AttributeValue::S(email.to_string()))
            .consistent_read(true)
    }

    /// Conditional update of the wallet and version of an existing user
    pub fn wallet_update_request(&self, user: &User) -> UpdateItemFluentBuilder {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("email", AttributeValue::S(user.email.clone()))
            .update_expression(WALLET_UPDATE_EXPRESSION)
            .condition_expression(
                "attribute_exists(email) AND (attribute_not_exists(#version) OR #version = :expected)",
            )
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":wallet", number(user.wallet_money))
            .expression_attribute_values(":next", number(user.version + 1))
            .expression_attribute_values(":expected", number(user.version))
            .return_values(ReturnValue::AllNew)
    }

    pub fn item_to_user(&self, item: &Item) -> RepositoryResult<User> {
        Ok(User {
            email: get_string(item, "email")?,
            name: get_string(item, "name").unwrap_or_default(),
            wallet_money: get_decimal(item, "walletMoney")?,
            address: get_string(item, "address").ok(),
            version: get_version(item),
        })
    }
}

#[async_trait]
impl UserRepository for DynamoDbUserRepository {
    #[instrument(skip(self), fields(table = %self.table_name, email = %email))]
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        info!("Finding user by email");

        let get_span = dynamodb_span("GetItem", &self.table_name, &self.region);

        let response = async {
            self.get_user_request(email)
                .send()
                .await
                .map_err(|e| map_dynamodb_error(e.into()))
        }
        .instrument(get_span)
        .await?;

        response
            .item
            .map(|item| self.item_to_user(&item))
            .transpose()
    }

    #[instrument(skip(self, user), fields(table = %self.table_name, email = %user.email, version = user.version))]
    async fn save(&self, user: User) -> RepositoryResult<User> {
        info!("Saving user wallet");

        let expected = user.version;
        let update_span = dynamodb_span("UpdateItem", &self.table_name, &self.region);

        let result = async { self.wallet_update_request(&user).send().await }
            .instrument(update_span)
            .await;

        match result {
            Ok(output) => {
                info!("User wallet saved successfully");
                match output.attributes {
                    Some(item) => self.item_to_user(&item),
                    None => Ok(User {
                        version: expected + 1,
                        ..user
                    }),
                }
            }
            Err(e) if is_conditional_update_failure(&e) => {
                warn!("User was modified concurrently");
                Err(RepositoryError::VersionConflict {
                    key: user.email,
                    expected,
                })
            }
            Err(e) => Err(map_dynamodb_error(e.into())),
        }
    }
}
