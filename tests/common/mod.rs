#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use qkart_rs::{
    create_app,
    handlers::USER_EMAIL_HEADER,
    models::{Product, User},
    repositories::{InMemoryCartRepository, InMemoryProductRepository, InMemoryUserRepository},
    services::CartService,
    Metrics,
};
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;

/// Wallet 100, address set
pub const SHOPPER: &str = "crio-user@gmail.com";
/// Wallet 50, address set
pub const BROKE_SHOPPER: &str = "crio-user-2@gmail.com";
/// Wallet 500, placeholder address
pub const NO_ADDRESS_SHOPPER: &str = "crio-user-3@gmail.com";

pub struct TestEnvironment {
    pub client: Client,
    pub base_url: String,
    pub users: Arc<InMemoryUserRepository>,
    pub carts: Arc<InMemoryCartRepository>,
}

pub fn product(id: &str, name: &str, cost: rust_decimal::Decimal) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        category: "Sports".to_string(),
        rating: 5,
        cost,
        image: "google.com".to_string(),
    }
}

impl TestEnvironment {
    pub async fn new() -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        users
            .insert(
                User::new(SHOPPER, "crio-user")
                    .with_address("ITPL Main Road, Bangalore")
                    .with_wallet_money(dec!(100)),
            )
            .await;
        users
            .insert(
                User::new(BROKE_SHOPPER, "crio-user-2")
                    .with_address("ITPL Main Road, Bangalore")
                    .with_wallet_money(dec!(50)),
            )
            .await;
        users
            .insert(User::new(NO_ADDRESS_SHOPPER, "crio-user-3"))
            .await;

        let products = Arc::new(InMemoryProductRepository::new());
        products.insert(product("P1", "ball", dec!(20))).await;
        products.insert(product("P2", "bat", dec!(15))).await;
        products.insert(product("P3", "glove", dec!(5))).await;

        let carts = Arc::new(InMemoryCartRepository::new());

        let cart_service = Arc::new(CartService::new(
            carts.clone(),
            products,
            users.clone(),
        ));
        let metrics = Arc::new(Metrics::new().expect("Failed to create metrics"));
        let app = create_app(cart_service, users.clone(), metrics, Duration::from_secs(5));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to serve app");
        });

        Self {
            client: Client::new(),
            base_url,
            users,
            carts,
        }
    }

    /// Request authenticated as `email`
    pub fn request(&self, method: Method, path: &str, email: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_EMAIL_HEADER, email)
    }

    pub async fn add(&self, email: &str, product_id: &str, quantity: u32) -> reqwest::Response {
        self.request(Method::POST, "/v1/cart", email)
            .json(&serde_json::json!({"productId": product_id, "quantity": quantity}))
            .send()
            .await
            .expect("Failed to send request")
    }
}
