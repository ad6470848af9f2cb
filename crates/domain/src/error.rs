//! Domain state-machine errors.

use thiserror::Error;

use crate::status::{OrderPaymentStatus, OrderStatus, PaymentStatus};

/// A forbidden state transition was requested.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The order is not in a state that permits the requested action.
    #[error("order cannot {action} while {status}/{payment_status}")]
    Order {
        status: OrderStatus,
        payment_status: OrderPaymentStatus,
        action: &'static str,
    },

    /// The payment record is not in a state that permits the requested action.
    #[error("payment cannot {action} while {status}")]
    Payment {
        status: PaymentStatus,
        action: &'static str,
    },
}
