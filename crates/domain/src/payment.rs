//! Payment records and the settlement status fan-out.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::money::Money;
use crate::order::Order;
use crate::status::{PaymentMethod, PaymentStatus};

/// A payment attempt recorded against an order.
///
/// `transaction_id` is globally unique and is the idempotency guard
/// against double submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal outcome reported by the payment gateway, synchronously or via
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    Succeeded,
    Failed,
    Refunded,
}

impl std::fmt::Display for GatewayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayOutcome::Succeeded => "succeeded",
            GatewayOutcome::Failed => "failed",
            GatewayOutcome::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

impl Payment {
    fn succeed(&mut self) -> Result<(), StateError> {
        if !self.status.is_open() {
            return Err(self.transition_error("succeed"));
        }
        self.status = PaymentStatus::Succeeded;
        Ok(())
    }

    fn fail(&mut self) -> Result<(), StateError> {
        if !self.status.is_open() {
            return Err(self.transition_error("fail"));
        }
        self.status = PaymentStatus::Failed;
        Ok(())
    }

    fn refund(&mut self) -> Result<(), StateError> {
        if self.status != PaymentStatus::Succeeded {
            return Err(self.transition_error("refund"));
        }
        self.status = PaymentStatus::Refunded;
        Ok(())
    }

    fn transition_error(&self, action: &'static str) -> StateError {
        StateError::Payment {
            status: self.status,
            action,
        }
    }
}

/// Applies a gateway outcome to a payment and its order together.
///
/// This is the single place the settlement fan-out is defined; both store
/// implementations persist whatever this function produces, inside one
/// transaction, so payment status, order payment status and order status
/// can never diverge.
pub fn apply_settlement_outcome(
    payment: &mut Payment,
    order: &mut Order,
    outcome: GatewayOutcome,
) -> Result<(), StateError> {
    match outcome {
        GatewayOutcome::Succeeded => {
            payment.succeed()?;
            order.record_payment_success()
        }
        GatewayOutcome::Failed => {
            payment.fail()?;
            order.record_payment_failure()
        }
        GatewayOutcome::Refunded => {
            payment.refund()?;
            order.record_refund()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{OrderPaymentStatus, OrderStatus};
    use common::{AddressId, UserId};

    fn order_and_payment() -> (Order, Payment) {
        let order = Order {
            id: OrderId::new(),
            user_id: Some(UserId::new()),
            billing_address_id: Some(AddressId::new()),
            shipping_address_id: Some(AddressId::new()),
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
            total_amount: Money::from_minor(2498),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let payment = Payment {
            id: PaymentId::new(),
            order_id: order.id,
            amount: order.total_amount,
            currency: "USD".to_string(),
            method: PaymentMethod::Card,
            transaction_id: "t1".to_string(),
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        (order, payment)
    }

    #[test]
    fn success_fans_out_to_order() {
        let (mut order, mut payment) = order_and_payment();
        apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Succeeded).unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn failure_leaves_order_pending() {
        let (mut order, mut payment) = order_and_payment();
        apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Failed).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(order.payment_status, OrderPaymentStatus::Failed);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn outcome_is_applied_at_most_once() {
        let (mut order, mut payment) = order_and_payment();
        apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Succeeded).unwrap();
        let err = apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Succeeded)
            .unwrap_err();
        assert!(matches!(err, StateError::Payment { .. }));
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn refund_requires_succeeded_payment() {
        let (mut order, mut payment) = order_and_payment();
        assert!(
            apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Refunded).is_err()
        );
        apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Succeeded).unwrap();
        apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Refunded).unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
    }

    #[test]
    fn processing_payment_can_still_settle() {
        let (mut order, mut payment) = order_and_payment();
        payment.status = PaymentStatus::Processing;
        apply_settlement_outcome(&mut payment, &mut order, GatewayOutcome::Succeeded).unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
    }
}
