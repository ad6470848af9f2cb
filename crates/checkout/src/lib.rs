//! Order placement and payment settlement.
//!
//! Two services orchestrate the store's atomic primitives:
//!
//! 1. [`CheckoutService`] materializes the active cart into an order and
//!    dispatches the confirmation afterwards.
//! 2. [`SettlementService`] records payments, talks to the gateway and
//!    applies the settlement status fan-out: synchronously when the
//!    gateway answers inline, or from [`SettlementService::on_gateway_callback`]
//!    when the outcome arrives later.

pub mod error;
pub mod placement;
pub mod services;
pub mod settlement;

pub use error::CheckoutError;
pub use placement::CheckoutService;
pub use services::gateway::{InstantGateway, PaymentGateway};
pub use services::notification::{
    ConfirmationLine, InMemoryNotifier, NotificationDispatcher, OrderConfirmation,
};
pub use settlement::{SettlementRequest, SettlementService};
