//! Payment gateway trait and in-process implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{GatewayOutcome, Payment};

use crate::error::CheckoutError;

/// Trait for the payment gateway capability.
///
/// `authorize` may answer inline (the in-process gateway always does) or
/// the outcome may arrive later through the settlement callback; the
/// status fan-out is identical either way, only the trigger timing
/// differs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests authorization for a recorded payment.
    async fn authorize(&self, payment: &Payment) -> Result<GatewayOutcome, CheckoutError>;
}

#[derive(Debug, Default)]
struct GatewayState {
    decline_next: bool,
    unreachable: bool,
    authorized: u32,
}

/// In-process gateway that settles synchronously.
///
/// Stands in for a real provider integration; every authorization
/// succeeds unless configured otherwise.
#[derive(Debug, Clone, Default)]
pub struct InstantGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl InstantGateway {
    /// Creates a gateway that approves everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent authorizations come back declined.
    pub fn set_decline_next(&self, decline: bool) {
        self.state.write().unwrap().decline_next = decline;
    }

    /// Simulates an unreachable provider: `authorize` errors and the
    /// payment stays pending until a callback settles it.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    /// Number of authorizations processed.
    pub fn authorized_count(&self) -> u32 {
        self.state.read().unwrap().authorized
    }
}

#[async_trait]
impl PaymentGateway for InstantGateway {
    async fn authorize(&self, _payment: &Payment) -> Result<GatewayOutcome, CheckoutError> {
        let mut state = self.state.write().unwrap();
        if state.unreachable {
            return Err(CheckoutError::Gateway("gateway unreachable".to_string()));
        }
        state.authorized += 1;
        if state.decline_next {
            Ok(GatewayOutcome::Failed)
        } else {
            Ok(GatewayOutcome::Succeeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{OrderId, PaymentId};
    use domain::{Money, PaymentMethod, PaymentStatus};

    fn payment() -> Payment {
        Payment {
            id: PaymentId::new(),
            order_id: OrderId::new(),
            amount: Money::from_minor(1000),
            currency: "USD".to_string(),
            method: PaymentMethod::Card,
            transaction_id: "t1".to_string(),
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn approves_by_default() {
        let gateway = InstantGateway::new();
        let outcome = gateway.authorize(&payment()).await.unwrap();
        assert_eq!(outcome, GatewayOutcome::Succeeded);
        assert_eq!(gateway.authorized_count(), 1);
    }

    #[tokio::test]
    async fn decline_and_unreachable_modes() {
        let gateway = InstantGateway::new();
        gateway.set_decline_next(true);
        assert_eq!(
            gateway.authorize(&payment()).await.unwrap(),
            GatewayOutcome::Failed
        );

        gateway.set_unreachable(true);
        assert!(gateway.authorize(&payment()).await.is_err());
    }
}
