use axum::http::StatusCode;
use thiserror::Error;

/// Status classification shared by every service failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    InternalError,
}

/// Service-level errors raised by cart operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("User does not have a cart")]
    CartNotFound,

    #[error("User does not have a cart. Use POST to create cart and add a product")]
    CartRequiredForUpdate,

    #[error("User does not have a cart")]
    CartRequiredForDelete,

    #[error("Product already in cart. Use the cart sidebar to update or remove product from cart")]
    ProductAlreadyInCart,

    #[error("Product doesn't exist in database")]
    ProductNotFound,

    #[error("Product not in cart")]
    ProductNotInCart,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Address not set")]
    AddressNotSet,

    #[error("Insufficient money to checkout")]
    InsufficientFunds,

    #[error("Cart total is too large")]
    TotalOverflow,

    #[error("Internal Server Error")]
    CartCreation {
        #[source]
        source: RepositoryError,
    },

    #[error("{message}")]
    Validation { message: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::CartNotFound => ErrorKind::NotFound,
            ServiceError::CartRequiredForUpdate
            | ServiceError::CartRequiredForDelete
            | ServiceError::ProductAlreadyInCart
            | ServiceError::ProductNotFound
            | ServiceError::ProductNotInCart
            | ServiceError::EmptyCart
            | ServiceError::AddressNotSet
            | ServiceError::InsufficientFunds
            | ServiceError::TotalOverflow
            | ServiceError::Validation { .. } => ErrorKind::BadRequest,
            ServiceError::CartCreation { .. } | ServiceError::Repository(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// HTTP status for this error. Repository conflicts and timeouts get their
    /// own statuses; everything else follows `kind()`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Repository(RepositoryError::VersionConflict { .. }) => {
                StatusCode::CONFLICT
            }
            ServiceError::Repository(RepositoryError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            _ => match self.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Repository-level errors for data access operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database connection failed")]
    ConnectionFailed,

    #[error("Document already exists: {key}")]
    AlreadyExists { key: String },

    #[error("Version conflict on {key}: expected version {expected}")]
    VersionConflict { key: String, expected: u64 },

    #[error("Invalid stored document: {message}")]
    InvalidDocument { message: String },

    #[error("AWS SDK error: {message}")]
    AwsSdk { message: String },

    #[error("Timeout occurred during operation")]
    Timeout,
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
