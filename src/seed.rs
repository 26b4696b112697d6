//! Seed data for the in-memory backend.
//!
//! The seed file is a JSON document of the form
//! `{"users": [User, ...], "products": [Product, ...]}`, using the same field
//! names as the HTTP API (`walletMoney`, `_id`, ...). Either list may be omitted.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

use crate::models::{Product, User};
use crate::repositories::{InMemoryProductRepository, InMemoryUserRepository};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid seed document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl SeedData {
    pub fn parse(json: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Insert every record, replacing existing ones with the same key
    pub async fn apply(
        self,
        users: &InMemoryUserRepository,
        products: &InMemoryProductRepository,
    ) -> (usize, usize) {
        let counts = (self.users.len(), self.products.len());
        for user in self.users {
            users.insert(user).await;
        }
        for product in self.products {
            products.insert(product).await;
        }
        counts
    }
}

/// Read `path` and load its contents into the repositories
#[instrument(skip(users, products), fields(path = %path.display()))]
pub async fn load_seed_file(
    path: &Path,
    users: &InMemoryUserRepository,
    products: &InMemoryProductRepository,
) -> Result<(), SeedError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let (user_count, product_count) = SeedData::parse(&json)?.apply(users, products).await;
    info!(users = user_count, products = product_count, "Seed data loaded");
    Ok(())
}
