use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use qkart_rs::{
    create_app, init_observability,
    repositories::{
        CartRepository, DynamoDbCartRepository, DynamoDbProductRepository,
        DynamoDbUserRepository, InMemoryCartRepository, InMemoryProductRepository,
        InMemoryUserRepository, ProductRepository, TableManager, UserRepository,
    },
    seed::load_seed_file,
    services::CartService,
    shutdown_observability, Config, Metrics, StorageBackend,
};

struct Repositories {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    users: Arc<dyn UserRepository>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_environment().context("Failed to load configuration")?;

    init_observability(&config.observability).context("Failed to initialize observability")?;

    info!(
        "Starting {} v{}",
        config.observability.service_name, config.observability.service_version
    );

    let metrics = Arc::new(Metrics::new()?);

    let repositories = match config.database.backend {
        StorageBackend::DynamoDb => dynamodb_repositories(&config).await?,
        StorageBackend::Memory => memory_repositories(&config).await?,
    };

    let cart_service = Arc::new(CartService::new(
        repositories.carts,
        repositories.products,
        repositories.users.clone(),
    ));

    let app = create_app(
        cart_service,
        repositories.users,
        metrics,
        config.server.request_timeout(),
    );

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid host address {}", config.server.host))?,
        config.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_observability().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn dynamodb_repositories(config: &Config) -> anyhow::Result<Repositories> {
    let database = &config.database;
    info!(
        "DynamoDB tables: users={}, products={}, carts={}",
        database.users_table_name, database.products_table_name, database.carts_table_name
    );

    let client = Arc::new(database.dynamodb_client().await);

    if database.auto_create_tables {
        TableManager::new(client.clone())
            .create_all_tables(
                &database.users_table_name,
                &database.products_table_name,
                &database.carts_table_name,
            )
            .await
            .context("Failed to create tables")?;
    }

    Ok(Repositories {
        carts: Arc::new(DynamoDbCartRepository::new(
            client.clone(),
            database.carts_table_name.clone(),
            database.region.clone(),
        )),
        products: Arc::new(DynamoDbProductRepository::new(
            client.clone(),
            database.products_table_name.clone(),
            database.region.clone(),
        )),
        users: Arc::new(DynamoDbUserRepository::new(
            client,
            database.users_table_name.clone(),
            database.region.clone(),
        )),
    })
}

async fn memory_repositories(config: &Config) -> anyhow::Result<Repositories> {
    info!("Using in-memory storage");

    let users = Arc::new(InMemoryUserRepository::new());
    let products = Arc::new(InMemoryProductRepository::new());

    if let Some(path) = &config.database.seed_file {
        load_seed_file(path, &users, &products).await?;
    }

    Ok(Repositories {
        carts: Arc::new(InMemoryCartRepository::new()),
        products,
        users,
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
