//! In-memory repositories with the same versioning semantics as the DynamoDB ones.
//! Used by the `memory` storage backend and by the integration tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{CartRepository, ProductRepository, UserRepository};
use crate::models::{Cart, Product, RepositoryError, RepositoryResult, User};

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<String, Cart>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    #[instrument(skip(self))]
    async fn find_cart(&self, email: &str) -> RepositoryResult<Option<Cart>> {
        Ok(self.carts.read().await.get(email).cloned())
    }

    #[instrument(skip(self))]
    async fn create_cart(&self, email: &str) -> RepositoryResult<Cart> {
        let mut carts = self.carts.write().await;
        if carts.contains_key(email) {
            warn!("Cart already exists");
            return Err(RepositoryError::AlreadyExists {
                key: email.to_string(),
            });
        }

        let cart = Cart::new(email);
        carts.insert(email.to_string(), cart.clone());
        debug!("Cart created");
        Ok(cart)
    }

    #[instrument(skip(self, cart), fields(email = %cart.email, version = cart.version))]
    async fn save_cart(&self, cart: Cart) -> RepositoryResult<Cart> {
        let mut carts = self.carts.write().await;
        let expected = cart.version;

        match carts.get(&cart.email) {
            Some(stored) if stored.version == expected => {}
            _ => {
                warn!("Cart was modified concurrently");
                return Err(RepositoryError::VersionConflict {
                    key: cart.email,
                    expected,
                });
            }
        }

        let saved = Cart {
            version: expected + 1,
            ..cart
        };
        carts.insert(saved.email.clone(), saved.clone());
        Ok(saved)
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalogue entry
    pub async fn insert(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record, bypassing the version check
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.email.clone(), user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().await.get(email).cloned())
    }

    #[instrument(skip(self, user), fields(email = %user.email, version = user.version))]
    async fn save(&self, user: User) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        let expected = user.version;

        let stored = match users.get_mut(&user.email) {
            Some(stored) if stored.version == expected => stored,
            _ => {
                warn!("User was modified concurrently");
                return Err(RepositoryError::VersionConflict {
                    key: user.email,
                    expected,
                });
            }
        };

        // Only the wallet is owned by this service
        stored.wallet_money = user.wallet_money;
        stored.version = expected + 1;
        Ok(stored.clone())
    }
}
