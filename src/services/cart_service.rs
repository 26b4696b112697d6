use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::UserLocks;
use crate::models::{Cart, CheckoutSummary, ServiceError, ServiceResult, ShippingProfile, User};
use crate::repositories::{CartRepository, ProductRepository, UserRepository};

/// Cart operations for an already-authenticated user
pub struct CartService {
    cart_repository: Arc<dyn CartRepository>,
    product_repository: Arc<dyn ProductRepository>,
    user_repository: Arc<dyn UserRepository>,
    locks: UserLocks,
}

impl CartService {
    pub fn new(
        cart_repository: Arc<dyn CartRepository>,
        product_repository: Arc<dyn ProductRepository>,
        user_repository: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            cart_repository,
            product_repository,
            user_repository,
            locks: UserLocks::new(),
        }
    }

    /// Get the user's cart
    #[instrument(skip(self, user), fields(email = %user.email))]
    pub async fn get_cart_by_user(&self, user: &User) -> ServiceResult<Cart> {
        info!("Getting cart for user");

        let _lease = self.locks.acquire(&user.email).await;

        let cart = self
            .cart_repository
            .find_cart(&user.email)
            .await?
            .ok_or(ServiceError::CartNotFound)?;

        info!("Cart retrieved with {} items", cart.cart_items.len());
        Ok(cart)
    }

    /// Add a product to the cart, creating the cart on first use
    #[instrument(skip(self, user), fields(email = %user.email, product_id = %product_id, quantity = quantity))]
    pub async fn add_product_to_cart(
        &self,
        user: &User,
        product_id: &str,
        quantity: u32,
    ) -> ServiceResult<Cart> {
        info!("Adding product to cart");

        let _lease = self.locks.acquire(&user.email).await;

        let mut cart = match self.cart_repository.find_cart(&user.email).await? {
            Some(cart) => cart,
            None => {
                info!("Cart not found, creating empty cart");
                self.cart_repository
                    .create_cart(&user.email)
                    .await
                    .map_err(|source| {
                        error!("Failed to create cart: {}", source);
                        ServiceError::CartCreation { source }
                    })?
            }
        };

        if cart.contains_product(product_id) {
            warn!("Product already in cart");
            return Err(ServiceError::ProductAlreadyInCart);
        }

        let product = self
            .product_repository
            .find_by_id(product_id)
            .await?
            .ok_or(ServiceError::ProductNotFound)?;

        cart.push_item(product, quantity);
        let cart = self.cart_repository.save_cart(cart).await?;

        info!("Product added to cart successfully");
        Ok(cart)
    }

    /// Overwrite the quantity of a product already in the cart
    #[instrument(skip(self, user), fields(email = %user.email, product_id = %product_id, quantity = quantity))]
    pub async fn update_product_in_cart(
        &self,
        user: &User,
        product_id: &str,
        quantity: u32,
    ) -> ServiceResult<Cart> {
        info!("Updating product quantity in cart");

        let _lease = self.locks.acquire(&user.email).await;

        let mut cart = self
            .cart_repository
            .find_cart(&user.email)
            .await?
            .ok_or(ServiceError::CartRequiredForUpdate)?;

        if self
            .product_repository
            .find_by_id(product_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::ProductNotFound);
        }

        if !cart.set_quantity(product_id, quantity) {
            return Err(ServiceError::ProductNotInCart);
        }

        let cart = self.cart_repository.save_cart(cart).await?;

        info!("Cart item updated successfully");
        Ok(cart)
    }

    /// Remove a single product from the cart
    #[instrument(skip(self, user), fields(email = %user.email, product_id = %product_id))]
    pub async fn delete_product_from_cart(
        &self,
        user: &User,
        product_id: &str,
    ) -> ServiceResult<Cart> {
        info!("Removing product from cart");

        let _lease = self.locks.acquire(&user.email).await;

        let mut cart = self
            .cart_repository
            .find_cart(&user.email)
            .await?
            .ok_or(ServiceError::CartRequiredForDelete)?;

        if cart.remove_product(product_id).is_none() {
            return Err(ServiceError::ProductNotInCart);
        }

        let cart = self.cart_repository.save_cart(cart).await?;

        info!("Product removed from cart successfully");
        Ok(cart)
    }

    /// Debit the wallet by the cart total and empty the cart.
    ///
    /// Checks run in order and stop at the first failure: the cart exists, it
    /// is not empty, the user has a shipping address, the wallet covers the
    /// total. Nothing is written unless all of them pass. If the cleared cart
    /// cannot be saved, the debit is reversed before the error is returned.
    #[instrument(skip(self, user), fields(email = %user.email))]
    pub async fn checkout(&self, user: &User) -> ServiceResult<CheckoutSummary> {
        info!("Checking out cart");

        let _lease = self.locks.acquire(&user.email).await;

        let mut cart = self
            .cart_repository
            .find_cart(&user.email)
            .await?
            .ok_or(ServiceError::CartNotFound)?;

        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        if !user.has_non_default_address() {
            return Err(ServiceError::AddressNotSet);
        }

        let total = cart.total().ok_or_else(|| {
            warn!("Cart total overflowed");
            ServiceError::TotalOverflow
        })?;
        if total > user.wallet_money {
            warn!(
                total = %total,
                wallet_money = %user.wallet_money,
                "Insufficient money to checkout"
            );
            return Err(ServiceError::InsufficientFunds);
        }

        let debited = User {
            wallet_money: user.wallet_money - total,
            ..user.clone()
        };
        let debited = self.user_repository.save(debited).await?;

        cart.clear();
        if let Err(e) = self.cart_repository.save_cart(cart).await {
            error!("Failed to clear cart after debit, refunding: {}", e);
            self.refund(debited, total).await;
            return Err(e.into());
        }

        info!(total = %total, "Checkout completed successfully");
        Ok(CheckoutSummary {
            email: debited.email,
            total,
            wallet_money: debited.wallet_money,
        })
    }

    async fn refund(&self, debited: User, total: Decimal) {
        let restored = User {
            wallet_money: debited.wallet_money + total,
            ..debited
        };
        match self.user_repository.save(restored).await {
            Ok(user) => info!(wallet_money = %user.wallet_money, "Wallet refunded"),
            // The debit stands; only an operator can reconcile it now
            Err(e) => error!(total = %total, "Refund failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, Product, RepositoryError};
    use crate::repositories::{
        InMemoryCartRepository, InMemoryProductRepository, InMemoryUserRepository,
    };
    use async_trait::async_trait;
    use mockall::{mock, predicate, Sequence};
    use rust_decimal_macros::dec;

    mock! {
        TestCartRepository {}

        #[async_trait]
        impl CartRepository for TestCartRepository {
            async fn find_cart(&self, email: &str) -> Result<Option<Cart>, RepositoryError>;
            async fn create_cart(&self, email: &str) -> Result<Cart, RepositoryError>;
            async fn save_cart(&self, cart: Cart) -> Result<Cart, RepositoryError>;
        }
    }

    mock! {
        TestProductRepository {}

        #[async_trait]
        impl ProductRepository for TestProductRepository {
            async fn find_by_id(&self, id: &str) -> Result<Option<Product>, RepositoryError>;
        }
    }

    mock! {
        TestUserRepository {}

        #[async_trait]
        impl UserRepository for TestUserRepository {
            async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
            async fn save(&self, user: User) -> Result<User, RepositoryError>;
        }
    }

    const EMAIL: &str = "crio-user@gmail.com";

    fn ball() -> Product {
        Product {
            id: "P1".to_string(),
            name: "ball".to_string(),
            category: "Sports".to_string(),
            rating: 5,
            cost: dec!(20),
            image: "google.com".to_string(),
        }
    }

    fn bat() -> Product {
        Product {
            id: "P2".to_string(),
            name: "bat".to_string(),
            category: "Sports".to_string(),
            rating: 4,
            cost: dec!(15),
            image: "google.com".to_string(),
        }
    }

    fn glove() -> Product {
        Product {
            id: "P3".to_string(),
            name: "glove".to_string(),
            category: "Sports".to_string(),
            rating: 3,
            cost: dec!(5),
            image: "google.com".to_string(),
        }
    }

    fn create_test_user(wallet_money: Decimal) -> User {
        User::new(EMAIL, "crio-user")
            .with_address("ITPL Main Road, Bangalore")
            .with_wallet_money(wallet_money)
    }

    /// Cart worth 55: two balls and one bat
    fn create_test_cart() -> Cart {
        let mut cart = Cart::new(EMAIL);
        cart.push_item(ball(), 2);
        cart.push_item(bat(), 1);
        cart
    }

    fn echo_saved_cart(mock: &mut MockTestCartRepository) {
        mock.expect_save_cart()
            .times(1)
            .returning(|cart| Ok(Cart { version: cart.version + 1, ..cart }));
    }

    fn service(
        carts: MockTestCartRepository,
        products: MockTestProductRepository,
        users: MockTestUserRepository,
    ) -> CartService {
        CartService::new(Arc::new(carts), Arc::new(products), Arc::new(users))
    }

    #[tokio::test]
    async fn test_get_cart_not_found() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo
            .expect_find_cart()
            .with(predicate::eq(EMAIL.to_string()))
            .times(1)
            .returning(|_| Ok(None));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .get_cart_by_user(&create_test_user(dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::CartNotFound));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.to_string(), "User does not have a cart");
    }

    #[tokio::test]
    async fn test_get_cart_existing() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        let expected = test_cart.clone();
        mock_cart_repo
            .expect_find_cart()
            .times(1)
            .returning(move |_| Ok(Some(test_cart.clone())));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let cart = service
            .get_cart_by_user(&create_test_user(dec!(100)))
            .await
            .unwrap();
        assert_eq!(cart, expected);
    }

    #[tokio::test]
    async fn test_repository_failure_propagates_unmodified() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo
            .expect_find_cart()
            .returning(|_| Err(RepositoryError::Timeout));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .get_cart_by_user(&create_test_user(dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Repository(RepositoryError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_add_creates_cart_on_first_use() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let mut mock_product_repo = MockTestProductRepository::new();

        mock_cart_repo
            .expect_find_cart()
            .times(1)
            .returning(|_| Ok(None));
        mock_cart_repo
            .expect_create_cart()
            .with(predicate::eq(EMAIL.to_string()))
            .times(1)
            .returning(|email| Ok(Cart::new(email)));
        echo_saved_cart(&mut mock_cart_repo);
        mock_product_repo
            .expect_find_by_id()
            .with(predicate::eq("P1".to_string()))
            .times(1)
            .returning(|_| Ok(Some(ball())));

        let service = service(mock_cart_repo, mock_product_repo, MockTestUserRepository::new());

        let cart = service
            .add_product_to_cart(&create_test_user(dec!(100)), "P1", 2)
            .await
            .unwrap();

        assert_eq!(cart.email, EMAIL);
        assert_eq!(cart.cart_items.len(), 1);
        assert_eq!(cart.cart_items[0].product, ball());
        assert_eq!(cart.cart_items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_add_cart_creation_failure_is_internal() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo.expect_find_cart().returning(|_| Ok(None));
        mock_cart_repo
            .expect_create_cart()
            .times(1)
            .returning(|_| Err(RepositoryError::ConnectionFailed));
        mock_cart_repo.expect_save_cart().never();

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .add_product_to_cart(&create_test_user(dec!(100)), "P1", 1)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::CartCreation { .. }));
        assert_eq!(error.kind(), ErrorKind::InternalError);
        assert_eq!(error.to_string(), "Internal Server Error");
    }

    #[tokio::test]
    async fn test_add_duplicate_product_rejected() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo.expect_save_cart().never();

        let mut mock_product_repo = MockTestProductRepository::new();
        mock_product_repo.expect_find_by_id().never();

        let service = service(mock_cart_repo, mock_product_repo, MockTestUserRepository::new());

        let error = service
            .add_product_to_cart(&create_test_user(dec!(100)), "P1", 5)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::ProductAlreadyInCart));
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_add_unknown_product_rejected() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo.expect_save_cart().never();

        let mut mock_product_repo = MockTestProductRepository::new();
        mock_product_repo
            .expect_find_by_id()
            .with(predicate::eq("P404".to_string()))
            .returning(|_| Ok(None));

        let service = service(mock_cart_repo, mock_product_repo, MockTestUserRepository::new());

        let error = service
            .add_product_to_cart(&create_test_user(dec!(100)), "P404", 1)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::ProductNotFound));
        assert_eq!(error.to_string(), "Product doesn't exist in database");
    }

    #[tokio::test]
    async fn test_update_without_cart_rejected() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo.expect_find_cart().returning(|_| Ok(None));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .update_product_in_cart(&create_test_user(dec!(100)), "P1", 3)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::CartRequiredForUpdate));
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_update_unknown_product_checked_before_membership() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo
            .expect_find_cart()
            .returning(|_| Ok(Some(Cart::new(EMAIL))));
        mock_cart_repo.expect_save_cart().never();

        let mut mock_product_repo = MockTestProductRepository::new();
        mock_product_repo.expect_find_by_id().returning(|_| Ok(None));

        let service = service(mock_cart_repo, mock_product_repo, MockTestUserRepository::new());

        let error = service
            .update_product_in_cart(&create_test_user(dec!(100)), "P404", 3)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::ProductNotFound));
    }

    #[tokio::test]
    async fn test_update_product_not_in_cart() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo.expect_save_cart().never();

        let mut mock_product_repo = MockTestProductRepository::new();
        mock_product_repo
            .expect_find_by_id()
            .returning(|_| Ok(Some(glove())));

        let service = service(mock_cart_repo, mock_product_repo, MockTestUserRepository::new());

        let error = service
            .update_product_in_cart(&create_test_user(dec!(100)), "P3", 3)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::ProductNotInCart));
        assert_eq!(error.to_string(), "Product not in cart");
    }

    #[tokio::test]
    async fn test_update_changes_only_that_quantity() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        echo_saved_cart(&mut mock_cart_repo);

        let mut mock_product_repo = MockTestProductRepository::new();
        mock_product_repo
            .expect_find_by_id()
            .with(predicate::eq("P2".to_string()))
            .returning(|_| Ok(Some(bat())));

        let service = service(mock_cart_repo, mock_product_repo, MockTestUserRepository::new());

        let cart = service
            .update_product_in_cart(&create_test_user(dec!(100)), "P2", 4)
            .await
            .unwrap();

        assert_eq!(cart.cart_items.len(), 2);
        assert_eq!(cart.cart_items[0].product.id, "P1");
        assert_eq!(cart.cart_items[0].quantity, 2);
        assert_eq!(cart.cart_items[1].product.id, "P2");
        assert_eq!(cart.cart_items[1].quantity, 4);
    }

    #[tokio::test]
    async fn test_delete_without_cart_rejected() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo.expect_find_cart().returning(|_| Ok(None));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .delete_product_from_cart(&create_test_user(dec!(100)), "P1")
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::CartRequiredForDelete));
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_delete_product_not_in_cart() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo.expect_save_cart().never();

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .delete_product_from_cart(&create_test_user(dec!(100)), "P3")
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::ProductNotInCart));
    }

    #[tokio::test]
    async fn test_delete_preserves_order_of_remaining_items() {
        let mut test_cart = create_test_cart();
        test_cart.push_item(glove(), 7);

        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        echo_saved_cart(&mut mock_cart_repo);

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let cart = service
            .delete_product_from_cart(&create_test_user(dec!(100)), "P2")
            .await
            .unwrap();

        let ids: Vec<&str> = cart
            .cart_items
            .iter()
            .map(|item| item.product.id.as_str())
            .collect();
        assert_eq!(ids, vec!["P1", "P3"]);
        assert_eq!(cart.cart_items[1].quantity, 7);
    }

    #[tokio::test]
    async fn test_checkout_success() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let mut mock_user_repo = MockTestUserRepository::new();
        let test_cart = create_test_cart();

        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo
            .expect_save_cart()
            .withf(|cart| cart.is_empty())
            .times(1)
            .returning(|cart| Ok(cart));
        mock_user_repo
            .expect_save()
            .withf(|user| user.wallet_money == dec!(45))
            .times(1)
            .returning(|user| Ok(User { version: user.version + 1, ..user }));

        let service = service(mock_cart_repo, MockTestProductRepository::new(), mock_user_repo);

        let summary = service.checkout(&create_test_user(dec!(100))).await.unwrap();

        assert_eq!(summary.email, EMAIL);
        assert_eq!(summary.total, dec!(55));
        assert_eq!(summary.wallet_money, dec!(45));
    }

    #[tokio::test]
    async fn test_checkout_exact_balance() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let mut mock_user_repo = MockTestUserRepository::new();
        let test_cart = create_test_cart();

        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo.expect_save_cart().returning(|cart| Ok(cart));
        mock_user_repo
            .expect_save()
            .withf(|user| user.wallet_money == dec!(0))
            .returning(|user| Ok(user));

        let service = service(mock_cart_repo, MockTestProductRepository::new(), mock_user_repo);

        let summary = service.checkout(&create_test_user(dec!(55))).await.unwrap();
        assert_eq!(summary.wallet_money, dec!(0));
    }

    #[tokio::test]
    async fn test_checkout_insufficient_funds_writes_nothing() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let mut mock_user_repo = MockTestUserRepository::new();
        let test_cart = create_test_cart();

        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_cart_repo.expect_save_cart().never();
        mock_user_repo.expect_save().never();

        let service = service(mock_cart_repo, MockTestProductRepository::new(), mock_user_repo);

        let user = create_test_user(dec!(50));
        let error = service.checkout(&user).await.unwrap_err();

        assert!(matches!(error, ServiceError::InsufficientFunds));
        assert_eq!(error.to_string(), "Insufficient money to checkout");
        assert_eq!(user.wallet_money, dec!(50));
    }

    #[tokio::test]
    async fn test_checkout_total_overflow_is_rejected() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let mut mock_user_repo = MockTestUserRepository::new();

        let mut huge_cart = Cart::new(EMAIL);
        huge_cart.push_item(
            Product {
                cost: dec!(100000000000000000000),
                ..ball()
            },
            u32::MAX,
        );
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(huge_cart.clone())));
        mock_cart_repo.expect_save_cart().never();
        mock_user_repo.expect_save().never();

        let service = service(mock_cart_repo, MockTestProductRepository::new(), mock_user_repo);

        let error = service
            .checkout(&create_test_user(Decimal::MAX))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::TotalOverflow));
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo
            .expect_find_cart()
            .returning(|_| Ok(Some(Cart::new(EMAIL))));
        mock_cart_repo.expect_save_cart().never();

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .checkout(&create_test_user(dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::EmptyCart));
        assert_eq!(error.to_string(), "Cart is empty");
    }

    #[tokio::test]
    async fn test_checkout_address_checked_before_wallet() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let test_cart = create_test_cart();
        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        // Broke and without an address: the address failure wins
        let user = User::new(EMAIL, "crio-user").with_wallet_money(dec!(0));
        let error = service.checkout(&user).await.unwrap_err();
        assert!(matches!(error, ServiceError::AddressNotSet));
        assert_eq!(error.to_string(), "Address not set");
    }

    #[tokio::test]
    async fn test_checkout_without_cart_is_not_found() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        mock_cart_repo.expect_find_cart().returning(|_| Ok(None));

        let service = service(
            mock_cart_repo,
            MockTestProductRepository::new(),
            MockTestUserRepository::new(),
        );

        let error = service
            .checkout(&create_test_user(dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_checkout_refunds_when_cart_save_fails() {
        let mut mock_cart_repo = MockTestCartRepository::new();
        let mut mock_user_repo = MockTestUserRepository::new();
        let mut seq = Sequence::new();
        let test_cart = create_test_cart();

        mock_cart_repo
            .expect_find_cart()
            .returning(move |_| Ok(Some(test_cart.clone())));
        mock_user_repo
            .expect_save()
            .withf(|user| user.wallet_money == dec!(45) && user.version == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|user| Ok(User { version: user.version + 1, ..user }));
        mock_cart_repo
            .expect_save_cart()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(RepositoryError::ConnectionFailed));
        mock_user_repo
            .expect_save()
            .withf(|user| user.wallet_money == dec!(100) && user.version == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|user| Ok(User { version: user.version + 1, ..user }));

        let service = service(mock_cart_repo, MockTestProductRepository::new(), mock_user_repo);

        let error = service
            .checkout(&create_test_user(dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Repository(RepositoryError::ConnectionFailed)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_adds_of_same_product_admit_one() {
        let products = Arc::new(InMemoryProductRepository::new());
        products.insert(ball()).await;
        let carts = Arc::new(InMemoryCartRepository::new());
        let service = Arc::new(CartService::new(
            carts.clone(),
            products,
            Arc::new(InMemoryUserRepository::new()),
        ));
        let user = create_test_user(dec!(100));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let user = user.clone();
                tokio::spawn(async move { service.add_product_to_cart(&user, "P1", 1).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, ServiceError::ProductAlreadyInCart)),
            }
        }

        assert_eq!(successes, 1);
        let cart = carts.find_cart(EMAIL).await.unwrap().unwrap();
        assert_eq!(cart.cart_items.len(), 1);
    }
}
