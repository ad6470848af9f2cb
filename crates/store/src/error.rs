//! Store error types.

use common::{CartLineId, OrderId, ProductId};
use domain::{Money, OrderPaymentStatus, OrderStatus, StateError, UnknownStatus};
use serde::Serialize;
use thiserror::Error;

/// One product that cannot cover the requested quantity.
///
/// Stock validation reports every offending product, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortage {
    pub product_id: ProductId,
    pub product_name: String,
    pub requested: u32,
    pub available: u32,
}

impl std::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (available: {})", self.product_name, self.available)
    }
}

fn join_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised at the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// One or more products cannot cover the requested quantities.
    #[error("insufficient stock for: {}", join_shortages(.shortages))]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// The user has no active cart, or it has no lines.
    #[error("cart is empty or not found")]
    EmptyCart,

    /// The address does not exist or does not belong to the requesting user.
    #[error("address not found or not owned by the requesting user")]
    AddressNotFound,

    /// Unknown product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The cart line does not exist in the user's active cart.
    #[error("cart line not found: {0}")]
    CartLineNotFound(CartLineId),

    /// Unknown order.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Line quantities must be at least 1 (and fit the stock column).
    #[error("invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// The order is not eligible for payment.
    #[error("order is not eligible for payment (status {status}, payment {payment_status})")]
    OrderNotPayable {
        status: OrderStatus,
        payment_status: OrderPaymentStatus,
    },

    /// A payment with this transaction id was already recorded.
    #[error("duplicate transaction id: {0}")]
    DuplicateTransaction(String),

    /// No payment carries this transaction id.
    #[error("unknown transaction id: {0}")]
    UnknownTransaction(String),

    /// The submitted amount does not match the order's frozen total.
    #[error("payment amount {submitted} does not match order total {expected}")]
    AmountMismatch { expected: Money, submitted: Money },

    /// A forbidden state transition was requested.
    #[error(transparent)]
    State(#[from] StateError),

    /// Transient store-level conflict; the operation may be retried once.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    /// A stored column value no longer maps onto the domain.
    #[error(transparent)]
    Corrupt(#[from] UnknownStatus),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// True for conflicts worth one local retry with a fresh read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
