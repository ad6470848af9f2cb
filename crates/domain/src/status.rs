//! Order and payment status state machines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a TEXT status column holds a value no enum variant matches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Fulfillment state of an order.
///
/// Transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Canceled
/// ```
///
/// `Pending → Processing` fires only as a side effect of a successful
/// payment settlement; there is no API to force it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Canceled,
}

impl OrderStatus {
    /// Returns true if the order can still be canceled.
    ///
    /// No cancellation once shipped.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Canceled)
    }

    /// Returns true for the fulfillment edges a staff identity may drive
    /// directly (`Processing → Shipped → Delivered`).
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    /// Returns the stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Parses a stored column value.
    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(UnknownStatus {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment substate carried on the order.
///
/// `Pending → Paid`, `Pending → Failed`, `Paid → Refunded`, plus the
/// retry edge `Failed → Paid` (a failed payment may be retried with a new
/// payment against the still-pending order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderPaymentStatus {
    /// Returns true if a new payment may still be recorded.
    pub fn is_payable(&self) -> bool {
        matches!(self, OrderPaymentStatus::Pending | OrderPaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "pending",
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::Failed => "failed",
            OrderPaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "pending" => Ok(OrderPaymentStatus::Pending),
            "paid" => Ok(OrderPaymentStatus::Paid),
            "failed" => Ok(OrderPaymentStatus::Failed),
            "refunded" => Ok(OrderPaymentStatus::Refunded),
            other => Err(UnknownStatus {
                kind: "order payment status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of an individual payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Returns true while a gateway outcome may still land on this payment.
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownStatus {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Paypal,
    MobileMoney,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "card" => Ok(PaymentMethod::Card),
            "paypal" => Ok(PaymentMethod::Paypal),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(UnknownStatus {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
