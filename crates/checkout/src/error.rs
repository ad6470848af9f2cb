//! Checkout service errors.

use common::OrderId;
use store::StoreError;
use thiserror::Error;

/// Errors raised by the placement and settlement services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The acting identity does not own the resource.
    #[error("not authorized to act on this resource")]
    Forbidden,

    /// Unknown order.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// The payment gateway could not be reached or answered abnormally.
    ///
    /// The payment stays recorded as pending; the gateway callback can
    /// still settle it later.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// The notification dispatcher rejected a payload. Never escalated
    /// past the placement service.
    #[error("notification dispatch failed: {0}")]
    Notification(String),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
