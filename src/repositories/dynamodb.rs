//! Attribute encoding helpers and tracing spans shared by the DynamoDB repositories.

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Error as DynamoDbError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::error;

use crate::models::{RepositoryError, RepositoryResult};

pub(crate) type Item = HashMap<String, AttributeValue>;

/// Create a DynamoDB client span with X-Ray and OpenTelemetry attributes
pub(crate) fn dynamodb_span(operation: &str, table_name: &str, region: &str) -> tracing::Span {
    tracing::info_span!(
        "DynamoDB",
        "aws.service" = "DynamoDB",
        "aws.operation" = operation,
        "aws.region" = %region,
        "aws.dynamodb.table_name" = %table_name,
        "aws.remote.service" = "AWS::DynamoDB",
        "aws.remote.operation" = operation,
        "aws.remote.resource.type" = "AWS::DynamoDB::Table",
        "aws.remote.resource.identifier" = %table_name,
        "otel.kind" = "client",
        "otel.name" = format!("DynamoDB.{}", operation),
        "rpc.system" = "aws-api",
        "rpc.service" = "AmazonDynamoDBv2",
        "rpc.method" = operation,
        "db.system" = "dynamodb",
        "db.name" = %table_name,
        "db.operation" = operation,
    )
}

pub(crate) fn map_dynamodb_error(error: DynamoDbError) -> RepositoryError {
    error!("DynamoDB error: {:?}", error);
    RepositoryError::AwsSdk {
        message: error.to_string(),
    }
}

/// True when a conditional PutItem was rejected because its condition did not hold
pub(crate) fn is_conditional_put_failure<R>(error: &SdkError<PutItemError, R>) -> bool {
    error
        .as_service_error()
        .map(|e| e.is_conditional_check_failed_exception())
        .unwrap_or(false)
}

/// Same as [`is_conditional_put_failure`] for UpdateItem
pub(crate) fn is_conditional_update_failure<R>(error: &SdkError<UpdateItemError, R>) -> bool {
    error
        .as_service_error()
        .map(|e| e.is_conditional_check_failed_exception())
        .unwrap_or(false)
}

pub(crate) fn get_string(item: &Item, key: &str) -> RepositoryResult<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidDocument {
            message: format!("Missing {}", key),
        })
}

pub(crate) fn get_number<T: FromStr>(item: &Item, key: &str) -> RepositoryResult<T> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RepositoryError::InvalidDocument {
            message: format!("Invalid {}", key),
        })
}

pub(crate) fn get_decimal(item: &Item, key: &str) -> RepositoryResult<Decimal> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| RepositoryError::InvalidDocument {
            message: format!("Invalid {}", key),
        })
}

pub(crate) fn get_timestamp(item: &Item, key: &str) -> RepositoryResult<DateTime<Utc>> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| RepositoryError::InvalidDocument {
            message: format!("Invalid {}", key),
        })
}

/// Documents written before versioning was introduced start at version 0
pub(crate) fn get_version(item: &Item) -> u64 {
    item.get("version")
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

pub(crate) fn number(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub(crate) fn string(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}
