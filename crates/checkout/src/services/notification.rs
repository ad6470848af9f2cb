//! Notification dispatcher trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{OrderId, ProductId};
use domain::{Money, OrderStatus, OrderWithLines};
use serde::Serialize;

use crate::error::CheckoutError;

/// One line of an order confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationLine {
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub price: Money,
}

/// The payload handed to the notification dispatcher after an order
/// commits.
#[derive(Debug, Clone, Serialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub lines: Vec<ConfirmationLine>,
}

impl From<&OrderWithLines> for OrderConfirmation {
    fn from(placed: &OrderWithLines) -> Self {
        Self {
            order_id: placed.order.id,
            status: placed.order.status,
            total_amount: placed.order.total_amount,
            lines: placed
                .lines
                .iter()
                .map(|l| ConfirmationLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    price: l.price,
                })
                .collect(),
        }
    }
}

/// Trait for the order-confirmation dispatcher.
///
/// Fire-and-forget from the checkout's perspective: dispatch happens
/// after commit and a failure must never roll back the order.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Delivers an order confirmation.
    async fn order_confirmed(&self, confirmation: OrderConfirmation) -> Result<(), CheckoutError>;
}

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<OrderConfirmation>,
    fail_on_send: bool,
}

/// In-memory notification dispatcher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<NotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the dispatcher to fail on subsequent sends.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of confirmations delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the most recently delivered confirmation.
    pub fn last_confirmation(&self) -> Option<OrderConfirmation> {
        self.state.read().unwrap().sent.last().cloned()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotifier {
    async fn order_confirmed(&self, confirmation: OrderConfirmation) -> Result<(), CheckoutError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(CheckoutError::Notification(
                "dispatcher unavailable".to_string(),
            ));
        }
        state.sent.push(confirmation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation() -> OrderConfirmation {
        OrderConfirmation {
            order_id: OrderId::new(),
            status: OrderStatus::Pending,
            total_amount: Money::from_minor(2498),
            lines: vec![ConfirmationLine {
                product_id: Some(ProductId::new()),
                quantity: 2,
                price: Money::from_minor(999),
            }],
        }
    }

    #[tokio::test]
    async fn records_deliveries() {
        let notifier = InMemoryNotifier::new();
        notifier.order_confirmed(confirmation()).await.unwrap();
        assert_eq!(notifier.sent_count(), 1);
        assert!(notifier.last_confirmation().is_some());
    }

    #[tokio::test]
    async fn fail_on_send() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);
        let result = notifier.order_confirmed(confirmation()).await;
        assert!(result.is_err());
        assert_eq!(notifier.sent_count(), 0);
    }
}
