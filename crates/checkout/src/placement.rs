//! Order placement: cart materialization plus post-commit concerns.

use common::{AddressId, UserId};
use domain::OrderWithLines;
use store::CommerceStore;

use crate::error::{CheckoutError, Result};
use crate::services::notification::{NotificationDispatcher, OrderConfirmation};

/// Drives the cart-to-order conversion.
///
/// The store performs the conversion as one atomic transaction; this
/// service adds the policy around it: one retry on a transient conflict,
/// metrics, and the fire-and-forget confirmation dispatch after commit.
pub struct CheckoutService<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> CheckoutService<S, N>
where
    S: CommerceStore,
    N: NotificationDispatcher,
{
    /// Creates a new checkout service.
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Converts the user's active cart into an order.
    #[tracing::instrument(skip(self))]
    pub async fn place_order(
        &self,
        user: UserId,
        billing_address: AddressId,
        shipping_address: Option<AddressId>,
    ) -> Result<OrderWithLines> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let start = std::time::Instant::now();

        let placed = match self
            .materialize_with_retry(user, billing_address, shipping_address)
            .await
        {
            Ok(placed) => placed,
            Err(e) => {
                metrics::counter!("checkout_failed_total").increment(1);
                return Err(e);
            }
        };
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        metrics::counter!("checkout_completed_total").increment(1);
        tracing::info!(
            order_id = %placed.order.id,
            total = %placed.order.total_amount,
            lines = placed.lines.len(),
            "order placed"
        );

        // The order is committed; confirmation delivery must never undo it.
        let confirmation = OrderConfirmation::from(&placed);
        if let Err(e) = self.notifier.order_confirmed(confirmation).await {
            metrics::counter!("checkout_notify_failed_total").increment(1);
            tracing::warn!(order_id = %placed.order.id, error = %e, "confirmation dispatch failed");
        }

        Ok(placed)
    }

    async fn materialize_with_retry(
        &self,
        user: UserId,
        billing_address: AddressId,
        shipping_address: Option<AddressId>,
    ) -> Result<OrderWithLines> {
        match self
            .store
            .materialize_order(user, billing_address, shipping_address)
            .await
        {
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "materialization conflicted, retrying once");
                self.store
                    .materialize_order(user, billing_address, shipping_address)
                    .await
                    .map_err(CheckoutError::from)
            }
            other => other.map_err(CheckoutError::from),
        }
    }
}
