//! Payment settlement: recording, gateway dispatch and the status fan-out.

use common::{Identity, OrderId};
use domain::{GatewayOutcome, Money, Order, Payment, PaymentMethod, can_access};
use store::{CommerceStore, NewPayment};

use crate::error::{CheckoutError, Result};
use crate::services::gateway::PaymentGateway;

/// A payment submission.
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Money,
    pub currency: Option<String>,
    pub transaction_id: String,
}

/// Records payments and drives the order state machine from gateway
/// outcomes.
pub struct SettlementService<S, G> {
    store: S,
    gateway: G,
}

impl<S, G> SettlementService<S, G>
where
    S: CommerceStore,
    G: PaymentGateway,
{
    /// Creates a new settlement service.
    pub fn new(store: S, gateway: G) -> Self {
        Self { store, gateway }
    }

    /// Settles a payment for an order the acting identity owns.
    ///
    /// Records the payment (the unique transaction id is the idempotency
    /// guard), asks the gateway for authorization and applies the outcome
    /// atomically. When the gateway cannot answer inline the payment
    /// stays pending and [`Self::on_gateway_callback`] finishes the job.
    #[tracing::instrument(skip(self, identity, request), fields(order_id = %request.order_id))]
    pub async fn settle(
        &self,
        identity: &Identity,
        request: SettlementRequest,
    ) -> Result<(Payment, Order)> {
        metrics::counter!("settlement_attempts_total").increment(1);

        let order = self
            .store
            .order(request.order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(request.order_id))?;
        if !can_access(identity, &order) {
            return Err(CheckoutError::Forbidden);
        }

        let new = NewPayment {
            order_id: order.id,
            amount: request.amount,
            currency: request.currency.unwrap_or_else(|| "USD".to_string()),
            method: request.method,
            transaction_id: request.transaction_id,
        };
        let payment = match self.store.insert_payment(new.clone()).await {
            Err(e) if e.is_retryable() => self.store.insert_payment(new).await?,
            other => other?,
        };

        let outcome = self.gateway.authorize(&payment).await?;
        let applied = self.apply_outcome(&payment.transaction_id, outcome).await?;
        Ok(applied)
    }

    /// Applies an asynchronous gateway outcome.
    ///
    /// The external trigger for settlement: a provider callback carrying
    /// the transaction id and its terminal outcome. The synchronous path
    /// in [`Self::settle`] is the degenerate single-step case of this.
    #[tracing::instrument(skip(self))]
    pub async fn on_gateway_callback(
        &self,
        transaction_id: &str,
        outcome: GatewayOutcome,
    ) -> Result<(Payment, Order)> {
        metrics::counter!("settlement_callbacks_total").increment(1);
        self.apply_outcome(transaction_id, outcome).await
    }

    async fn apply_outcome(
        &self,
        transaction_id: &str,
        outcome: GatewayOutcome,
    ) -> Result<(Payment, Order)> {
        let (payment, order) = self
            .store
            .apply_payment_outcome(transaction_id, outcome)
            .await?;
        match outcome {
            GatewayOutcome::Succeeded => {
                metrics::counter!("settlements_succeeded_total").increment(1);
            }
            GatewayOutcome::Failed => {
                metrics::counter!("settlements_failed_total").increment(1);
            }
            GatewayOutcome::Refunded => {
                metrics::counter!("settlements_refunded_total").increment(1);
            }
        }
        tracing::info!(
            order_id = %order.id,
            payment_status = %payment.status,
            order_status = %order.status,
            "settlement outcome applied"
        );
        Ok((payment, order))
    }
}
