//! The `CommerceStore` trait.

use async_trait::async_trait;
use common::{AddressId, CartLineId, OrderId, ProductId, UserId};
use domain::{
    Address, Cart, CartLine, GatewayOutcome, Money, Order, OrderStatus, OrderWithLines, Payment,
    PaymentMethod, PricedCartLine, Product,
};

use crate::error::Result;

/// A product to seed into the catalog.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
}

/// An address book entry to create.
#[derive(Debug, Clone)]
pub struct NewAddress {
    pub user_id: UserId,
    pub line1: String,
    pub city: String,
    pub country: String,
}

/// A payment attempt to record against an order.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub transaction_id: String,
}

impl NewPayment {
    /// A payment in the default currency.
    pub fn usd(
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            amount,
            currency: "USD".to_string(),
            method,
            transaction_id: transaction_id.into(),
        }
    }
}

/// The persistence boundary of the commerce backend.
///
/// Implementations must be thread-safe and must enforce every invariant
/// transactionally: concurrent callers may rely on at-most-one active
/// cart per user, unique `(cart, product)` lines, never-negative stock
/// and globally unique payment transaction ids, regardless of
/// interleaving.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    // -- catalog & address book -------------------------------------------

    /// Seeds a product into the catalog.
    async fn insert_product(&self, new: NewProduct) -> Result<Product>;

    /// Looks up a product by id.
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Removes a product from the catalog without touching order history:
    /// order lines are detached (product reference nulled) and cart lines
    /// referencing the product are dropped, in the same transaction as
    /// the deletion.
    async fn remove_product(&self, id: ProductId) -> Result<()>;

    /// Creates an address owned by a user.
    async fn insert_address(&self, new: NewAddress) -> Result<Address>;

    /// Looks up an address by id.
    async fn address(&self, id: AddressId) -> Result<Option<Address>>;

    // -- cart aggregate ---------------------------------------------------

    /// Returns the user's single active cart, creating one if absent.
    ///
    /// Safe under concurrent calls for the same user: the unique
    /// active-cart constraint is the final arbiter and losers retry
    /// against the winner's row.
    async fn get_or_create_active_cart(&self, user: UserId) -> Result<Cart>;

    /// The active cart's lines joined with their products, ordered by
    /// product name.
    async fn priced_cart_lines(&self, user: UserId) -> Result<Vec<PricedCartLine>>;

    /// Adds a product to the user's active cart, or increments the
    /// existing line. Refreshes the price snapshot to the product's
    /// current price either way. Fails with `InsufficientStock` if the
    /// resulting quantity exceeds current stock (advisory check).
    async fn add_or_increment_line(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// Overwrites a line's quantity and refreshes its price snapshot.
    /// Same advisory stock check as adding.
    async fn set_line_quantity(
        &self,
        user: UserId,
        line: CartLineId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// Deletes a line from the user's active cart unconditionally.
    async fn remove_line(&self, user: UserId, line: CartLineId) -> Result<()>;

    // -- order materialization --------------------------------------------

    /// Converts the user's active cart into an order, atomically:
    /// validates addresses and stock (batch-reporting all shortages),
    /// freezes the total, creates the order and its lines, decrements
    /// stock via guarded relative updates, deactivates the cart and
    /// deletes its lines. Any failure leaves zero observable side
    /// effects.
    async fn materialize_order(
        &self,
        user: UserId,
        billing_address: AddressId,
        shipping_address: Option<AddressId>,
    ) -> Result<OrderWithLines>;

    // -- orders -----------------------------------------------------------

    /// Looks up an order by id.
    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    /// An order together with its lines.
    async fn order_with_lines(&self, id: OrderId) -> Result<Option<OrderWithLines>>;

    /// A user's orders, most recent first.
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>>;

    /// All orders, most recent first (staff surface).
    async fn all_orders(&self) -> Result<Vec<Order>>;

    /// Cancels an order through the state machine.
    async fn cancel_order(&self, id: OrderId) -> Result<Order>;

    /// Advances fulfillment (`Processing → Shipped → Delivered`).
    async fn advance_order_status(&self, id: OrderId, next: OrderStatus) -> Result<Order>;

    // -- payments ---------------------------------------------------------

    /// Records a pending payment against a payable order.
    ///
    /// Fails with `DuplicateTransaction` when the transaction id was seen
    /// before and with `OrderNotPayable` when the order is not eligible.
    async fn insert_payment(&self, new: NewPayment) -> Result<Payment>;

    /// Looks up a payment by its gateway transaction id.
    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>>;

    /// Applies a gateway outcome to the payment and its order atomically:
    /// payment status, order payment status and order status change
    /// together or not at all.
    async fn apply_payment_outcome(
        &self,
        transaction_id: &str,
        outcome: GatewayOutcome,
    ) -> Result<(Payment, Order)>;
}
