// Services module - business logic layer

pub mod cart_service;
pub mod user_locks;

pub use cart_service::CartService;
pub use user_locks::UserLocks;
