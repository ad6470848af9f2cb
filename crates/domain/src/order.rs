//! The immutable-after-creation order aggregate.

use chrono::{DateTime, Utc};
use common::{AddressId, OrderId, OrderLineId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::money::Money;
use crate::status::{OrderPaymentStatus, OrderStatus};

/// A materialized order.
///
/// Created atomically from an active cart; after creation only `status`
/// and `payment_status` change, and only through the methods below.
/// `total_amount` is frozen at creation and is the authoritative
/// settlement amount regardless of later catalog price changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Weak reference: user deletion detaches rather than deletes orders.
    pub user_id: Option<UserId>,
    pub billing_address_id: Option<AddressId>,
    pub shipping_address_id: Option<AddressId>,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if a payment may be recorded against this order.
    ///
    /// Requires a pending (not canceled) order whose payment substate is
    /// still open; a failed attempt may be retried.
    pub fn is_payable(&self) -> bool {
        self.status == OrderStatus::Pending && self.payment_status.is_payable()
    }

    /// Applies a successful settlement: `payment_status → Paid` and
    /// `status Pending → Processing`, atomically from the caller's view.
    pub fn record_payment_success(&mut self) -> Result<(), StateError> {
        if !self.is_payable() {
            return Err(self.transition_error("record payment success"));
        }
        self.payment_status = OrderPaymentStatus::Paid;
        self.status = OrderStatus::Processing;
        Ok(())
    }

    /// Applies a failed settlement: `payment_status → Failed`. The order
    /// itself stays `Pending` so a retry can follow.
    pub fn record_payment_failure(&mut self) -> Result<(), StateError> {
        if !self.is_payable() {
            return Err(self.transition_error("record payment failure"));
        }
        self.payment_status = OrderPaymentStatus::Failed;
        Ok(())
    }

    /// Applies a refund: `payment_status Paid → Refunded`.
    pub fn record_refund(&mut self) -> Result<(), StateError> {
        if self.payment_status != OrderPaymentStatus::Paid {
            return Err(self.transition_error("record refund"));
        }
        self.payment_status = OrderPaymentStatus::Refunded;
        Ok(())
    }

    /// Cancels the order. Allowed from `Pending` and `Processing` only.
    pub fn cancel(&mut self) -> Result<(), StateError> {
        if !self.status.can_cancel() {
            return Err(self.transition_error("cancel"));
        }
        self.status = OrderStatus::Canceled;
        Ok(())
    }

    /// Advances fulfillment (`Processing → Shipped → Delivered`).
    pub fn advance_fulfillment(&mut self, next: OrderStatus) -> Result<(), StateError> {
        if !self.status.can_advance_to(next) {
            return Err(self.transition_error("advance fulfillment"));
        }
        self.status = next;
        Ok(())
    }

    fn transition_error(&self, action: &'static str) -> StateError {
        StateError::Order {
            status: self.status,
            payment_status: self.payment_status,
            action,
        }
    }
}

/// One purchased product within an order. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    /// Weak reference: product deletion detaches order history.
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    /// Unit price at time of purchase, permanently fixed.
    pub price: Money,
}

impl OrderLine {
    /// `quantity * price`.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// An order together with its lines, as returned by materialization and
/// the order detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderWithLines {
    /// Recomputes the line total; equals `order.total_amount` at creation.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}
