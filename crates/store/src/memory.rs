//! In-memory store implementation for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AddressId, CartId, CartLineId, OrderId, OrderLineId, PaymentId, ProductId, UserId};
use domain::{
    Address, Cart, CartLine, GatewayOutcome, Order, OrderLine, OrderStatus, OrderWithLines,
    Payment, PaymentStatus, PricedCartLine, Product, apply_settlement_outcome,
};
use tokio::sync::RwLock;

use crate::error::{Result, StockShortage, StoreError};
use crate::store::{CommerceStore, NewAddress, NewPayment, NewProduct};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    addresses: HashMap<AddressId, Address>,
    carts: Vec<Cart>,
    cart_lines: Vec<CartLine>,
    orders: Vec<Order>,
    order_lines: Vec<OrderLine>,
    payments: Vec<Payment>,
}

impl State {
    fn active_cart(&self, user: UserId) -> Option<&Cart> {
        self.carts
            .iter()
            .find(|c| c.user_id == Some(user) && c.is_active)
    }

    fn ensure_active_cart(&mut self, user: UserId) -> Cart {
        if let Some(cart) = self.active_cart(user) {
            return cart.clone();
        }
        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(),
            user_id: Some(user),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.carts.push(cart.clone());
        cart
    }

    /// A line of the user's active cart, or `CartLineNotFound`.
    fn owned_line_index(&self, user: UserId, line: CartLineId) -> Result<usize> {
        let cart_id = self
            .active_cart(user)
            .map(|c| c.id)
            .ok_or(StoreError::CartLineNotFound(line))?;
        self.cart_lines
            .iter()
            .position(|l| l.id == line && l.cart_id == cart_id)
            .ok_or(StoreError::CartLineNotFound(line))
    }

    fn owned_address(&self, id: AddressId, user: UserId) -> Result<Address> {
        self.addresses
            .get(&id)
            .filter(|a| a.user_id == user)
            .cloned()
            .ok_or(StoreError::AddressNotFound)
    }

    fn order_index(&self, id: OrderId) -> Result<usize> {
        self.orders
            .iter()
            .position(|o| o.id == id)
            .ok_or(StoreError::OrderNotFound(id))
    }
}

fn check_quantity(quantity: u32) -> Result<()> {
    if quantity < 1 || i32::try_from(quantity).is_err() {
        return Err(StoreError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// In-memory `CommerceStore` with the same semantics as the PostgreSQL
/// implementation.
///
/// Every operation takes the state lock for its full duration, which
/// makes each one atomic exactly as its SQL counterpart is.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cart rows (active and historical). Test helper.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Number of payment rows, including failed attempts. Test helper.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let product = Product {
            id: ProductId::new(),
            name: new.name,
            price: new.price,
            stock_quantity: new.stock_quantity,
        };
        self.state
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn remove_product(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.remove(&id).is_none() {
            return Err(StoreError::ProductNotFound(id));
        }
        // Detach order history, drop pending cart lines.
        for line in &mut state.order_lines {
            if line.product_id == Some(id) {
                line.product_id = None;
            }
        }
        state.cart_lines.retain(|l| l.product_id != id);
        Ok(())
    }

    async fn insert_address(&self, new: NewAddress) -> Result<Address> {
        let address = Address {
            id: AddressId::new(),
            user_id: new.user_id,
            line1: new.line1,
            city: new.city,
            country: new.country,
        };
        self.state
            .write()
            .await
            .addresses
            .insert(address.id, address.clone());
        Ok(address)
    }

    async fn address(&self, id: AddressId) -> Result<Option<Address>> {
        Ok(self.state.read().await.addresses.get(&id).cloned())
    }

    async fn get_or_create_active_cart(&self, user: UserId) -> Result<Cart> {
        Ok(self.state.write().await.ensure_active_cart(user))
    }

    async fn priced_cart_lines(&self, user: UserId) -> Result<Vec<PricedCartLine>> {
        let state = self.state.read().await;
        let Some(cart) = state.active_cart(user) else {
            return Ok(Vec::new());
        };
        let mut lines: Vec<PricedCartLine> = state
            .cart_lines
            .iter()
            .filter(|l| l.cart_id == cart.id)
            .map(|l| {
                let product = state
                    .products
                    .get(&l.product_id)
                    .cloned()
                    .ok_or(StoreError::ProductNotFound(l.product_id))?;
                Ok(PricedCartLine {
                    line: l.clone(),
                    product,
                })
            })
            .collect::<Result<_>>()?;
        lines.sort_by(|a, b| a.product.name.cmp(&b.product.name));
        Ok(lines)
    }

    async fn add_or_increment_line(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        check_quantity(quantity)?;
        let mut state = self.state.write().await;
        let cart = state.ensure_active_cart(user);
        let product = state
            .products
            .get(&product)
            .cloned()
            .ok_or(StoreError::ProductNotFound(product))?;

        let existing = state
            .cart_lines
            .iter()
            .position(|l| l.cart_id == cart.id && l.product_id == product.id);
        let new_quantity = match existing {
            Some(i) => state.cart_lines[i].quantity + quantity,
            None => quantity,
        };
        if !product.has_stock_for(new_quantity) {
            return Err(StoreError::InsufficientStock {
                shortages: vec![StockShortage {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested: new_quantity,
                    available: product.stock_quantity,
                }],
            });
        }

        let line = match existing {
            Some(i) => {
                let line = &mut state.cart_lines[i];
                line.quantity = new_quantity;
                line.price_snapshot = Some(product.price);
                line.updated_at = Utc::now();
                line.clone()
            }
            None => {
                let line = CartLine {
                    id: CartLineId::new(),
                    cart_id: cart.id,
                    product_id: product.id,
                    quantity,
                    price_snapshot: Some(product.price),
                    updated_at: Utc::now(),
                };
                state.cart_lines.push(line.clone());
                line
            }
        };
        Ok(line)
    }

    async fn set_line_quantity(
        &self,
        user: UserId,
        line: CartLineId,
        quantity: u32,
    ) -> Result<CartLine> {
        check_quantity(quantity)?;
        let mut state = self.state.write().await;
        let index = state.owned_line_index(user, line)?;
        let product_id = state.cart_lines[index].product_id;
        let product = state
            .products
            .get(&product_id)
            .cloned()
            .ok_or(StoreError::ProductNotFound(product_id))?;
        if !product.has_stock_for(quantity) {
            return Err(StoreError::InsufficientStock {
                shortages: vec![StockShortage {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested: quantity,
                    available: product.stock_quantity,
                }],
            });
        }
        let stored = &mut state.cart_lines[index];
        stored.quantity = quantity;
        stored.price_snapshot = Some(product.price);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn remove_line(&self, user: UserId, line: CartLineId) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state.owned_line_index(user, line)?;
        state.cart_lines.remove(index);
        Ok(())
    }

    async fn materialize_order(
        &self,
        user: UserId,
        billing_address: AddressId,
        shipping_address: Option<AddressId>,
    ) -> Result<OrderWithLines> {
        let mut state = self.state.write().await;

        let cart = state.active_cart(user).cloned().ok_or(StoreError::EmptyCart)?;
        let lines: Vec<CartLine> = state
            .cart_lines
            .iter()
            .filter(|l| l.cart_id == cart.id)
            .cloned()
            .collect();
        if lines.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        let billing = state.owned_address(billing_address, user)?;
        let shipping = match shipping_address {
            Some(id) => state.owned_address(id, user)?,
            None => billing.clone(),
        };

        // Validate stock across every line before touching anything.
        let mut shortages = Vec::new();
        let mut priced = Vec::new();
        for line in &lines {
            let product = state
                .products
                .get(&line.product_id)
                .cloned()
                .ok_or(StoreError::ProductNotFound(line.product_id))?;
            if !product.has_stock_for(line.quantity) {
                shortages.push(StockShortage {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }
            priced.push((line.clone(), product));
        }
        if !shortages.is_empty() {
            return Err(StoreError::InsufficientStock { shortages });
        }

        let total_amount = priced
            .iter()
            .map(|(line, product)| line.line_total(product.price))
            .sum();

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            user_id: Some(user),
            billing_address_id: Some(billing.id),
            shipping_address_id: Some(shipping.id),
            status: OrderStatus::Pending,
            payment_status: Default::default(),
            total_amount,
            created_at: now,
            updated_at: now,
        };

        let mut order_lines = Vec::with_capacity(priced.len());
        for (line, product) in &priced {
            let stock = state
                .products
                .get_mut(&product.id)
                .ok_or(StoreError::ProductNotFound(product.id))?;
            stock.stock_quantity -= line.quantity;
            order_lines.push(OrderLine {
                id: OrderLineId::new(),
                order_id: order.id,
                product_id: Some(product.id),
                quantity: line.quantity,
                price: line.effective_unit_price(product.price),
            });
        }

        for stored in &mut state.carts {
            if stored.id == cart.id {
                stored.is_active = false;
                stored.updated_at = now;
            }
        }
        state.cart_lines.retain(|l| l.cart_id != cart.id);
        state.orders.push(order.clone());
        state.order_lines.extend(order_lines.clone());

        Ok(OrderWithLines {
            order,
            lines: order_lines,
        })
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn order_with_lines(&self, id: OrderId) -> Result<Option<OrderWithLines>> {
        let state = self.state.read().await;
        let Some(order) = state.orders.iter().find(|o| o.id == id).cloned() else {
            return Ok(None);
        };
        let lines = state
            .order_lines
            .iter()
            .filter(|l| l.order_id == id)
            .cloned()
            .collect();
        Ok(Some(OrderWithLines { order, lines }))
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.user_id == Some(user))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders = state.orders.clone();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let mut state = self.state.write().await;
        let index = state.order_index(id)?;
        let mut order = state.orders[index].clone();
        order.cancel()?;
        order.updated_at = Utc::now();
        state.orders[index] = order.clone();
        Ok(order)
    }

    async fn advance_order_status(&self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let mut state = self.state.write().await;
        let index = state.order_index(id)?;
        let mut order = state.orders[index].clone();
        order.advance_fulfillment(next)?;
        order.updated_at = Utc::now();
        state.orders[index] = order.clone();
        Ok(order)
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<Payment> {
        let mut state = self.state.write().await;
        let index = state.order_index(new.order_id)?;
        let order = &state.orders[index];

        if state
            .payments
            .iter()
            .any(|p| p.transaction_id == new.transaction_id)
        {
            return Err(StoreError::DuplicateTransaction(new.transaction_id));
        }
        let live_payment_exists = state
            .payments
            .iter()
            .any(|p| p.order_id == order.id && p.status != PaymentStatus::Failed);
        if !order.is_payable() || live_payment_exists {
            return Err(StoreError::OrderNotPayable {
                status: order.status,
                payment_status: order.payment_status,
            });
        }
        if new.amount != order.total_amount {
            return Err(StoreError::AmountMismatch {
                expected: order.total_amount,
                submitted: new.amount,
            });
        }

        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::new(),
            order_id: order.id,
            amount: new.amount,
            currency: new.currency,
            method: new.method,
            transaction_id: new.transaction_id,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn apply_payment_outcome(
        &self,
        transaction_id: &str,
        outcome: GatewayOutcome,
    ) -> Result<(Payment, Order)> {
        let mut state = self.state.write().await;
        let payment_index = state
            .payments
            .iter()
            .position(|p| p.transaction_id == transaction_id)
            .ok_or_else(|| StoreError::UnknownTransaction(transaction_id.to_string()))?;
        let mut payment = state.payments[payment_index].clone();
        let order_index = state.order_index(payment.order_id)?;
        let mut order = state.orders[order_index].clone();

        apply_settlement_outcome(&mut payment, &mut order, outcome)?;

        let now = Utc::now();
        payment.updated_at = now;
        order.updated_at = now;
        state.payments[payment_index] = payment.clone();
        state.orders[order_index] = order.clone();
        Ok((payment, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, OrderPaymentStatus, PaymentMethod, cart_total};

    async fn seed_product(store: &MemoryStore, name: &str, cents: i64, stock: u32) -> Product {
        store
            .insert_product(NewProduct {
                name: name.to_string(),
                price: Money::from_minor(cents),
                stock_quantity: stock,
            })
            .await
            .unwrap()
    }

    async fn seed_address(store: &MemoryStore, user: UserId) -> Address {
        store
            .insert_address(NewAddress {
                user_id: user,
                line1: "1 Main St".to_string(),
                city: "Nairobi".to_string(),
                country: "KE".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let first = store.get_or_create_active_cart(user).await.unwrap();
        let second = store.get_or_create_active_cart(user).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.cart_count().await, 1);
    }

    #[tokio::test]
    async fn re_adding_a_product_increments_the_line() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 999, 10).await;

        let first = store
            .add_or_increment_line(user, product.id, 2)
            .await
            .unwrap();
        let second = store
            .add_or_increment_line(user, product.id, 3)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 5);
        assert_eq!(store.priced_cart_lines(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advisory_stock_check_rejects_oversized_lines() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 999, 3).await;

        store
            .add_or_increment_line(user, product.id, 2)
            .await
            .unwrap();
        let err = store
            .add_or_increment_line(user, product.id, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        // The existing line is untouched.
        let lines = store.priced_cart_lines(user).await.unwrap();
        assert_eq!(lines[0].line.quantity, 2);
    }

    #[tokio::test]
    async fn increment_refreshes_the_price_snapshot() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 10).await;

        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();

        // Catalog price change between adds.
        store
            .state
            .write()
            .await
            .products
            .get_mut(&product.id)
            .unwrap()
            .price = Money::from_minor(1500);

        let line = store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        assert_eq!(line.price_snapshot, Some(Money::from_minor(1500)));
    }

    #[tokio::test]
    async fn set_quantity_and_remove_line() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 999, 10).await;

        let line = store
            .add_or_increment_line(user, product.id, 2)
            .await
            .unwrap();
        let updated = store.set_line_quantity(user, line.id, 7).await.unwrap();
        assert_eq!(updated.quantity, 7);

        let err = store.set_line_quantity(user, line.id, 11).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));

        store.remove_line(user, line.id).await.unwrap();
        assert!(store.priced_cart_lines(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lines_of_other_users_are_invisible() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let stranger = UserId::new();
        let product = seed_product(&store, "Widget", 999, 10).await;
        let line = store
            .add_or_increment_line(owner, product.id, 1)
            .await
            .unwrap();

        let err = store.set_line_quantity(stranger, line.id, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::CartLineNotFound(_)));
        let err = store.remove_line(stranger, line.id).await.unwrap_err();
        assert!(matches!(err, StoreError::CartLineNotFound(_)));
    }

    #[tokio::test]
    async fn materialize_snapshots_prices_and_decrements_stock() {
        // Scenario: 2 x 9.99 + 1 x 5.00 → 24.98, stock 10→8 and 1→0.
        let store = MemoryStore::new();
        let user = UserId::new();
        let x = seed_product(&store, "Product X", 999, 10).await;
        let y = seed_product(&store, "Product Y", 500, 1).await;
        let address = seed_address(&store, user).await;

        store.add_or_increment_line(user, x.id, 2).await.unwrap();
        store.add_or_increment_line(user, y.id, 1).await.unwrap();

        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();

        assert_eq!(placed.order.total_amount, Money::from_minor(2498));
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.payment_status, OrderPaymentStatus::Pending);
        assert_eq!(placed.lines.len(), 2);
        assert_eq!(placed.lines_total(), placed.order.total_amount);

        assert_eq!(store.product(x.id).await.unwrap().unwrap().stock_quantity, 8);
        assert_eq!(store.product(y.id).await.unwrap().unwrap().stock_quantity, 0);

        // The cart is deactivated, its lines are gone, and the next access
        // starts a fresh cart.
        assert!(store.priced_cart_lines(user).await.unwrap().is_empty());
        let fresh = store.get_or_create_active_cart(user).await.unwrap();
        assert_eq!(store.cart_count().await, 2);
        assert!(fresh.is_active);
    }

    #[tokio::test]
    async fn materialize_reports_every_shortage_and_changes_nothing() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let z = seed_product(&store, "Product Z", 999, 3).await;
        let w = seed_product(&store, "Product W", 500, 1).await;
        let address = seed_address(&store, user).await;

        store.add_or_increment_line(user, z.id, 3).await.unwrap();
        store.add_or_increment_line(user, w.id, 1).await.unwrap();

        // Stock drops underneath the cart after the advisory check passed.
        {
            let mut state = store.state.write().await;
            state.products.get_mut(&z.id).unwrap().stock_quantity = 2;
            state.products.get_mut(&w.id).unwrap().stock_quantity = 0;
        }

        let err = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap_err();
        let StoreError::InsufficientStock { shortages } = err else {
            panic!("expected InsufficientStock, got {err}");
        };
        assert_eq!(shortages.len(), 2);
        assert!(shortages.iter().any(|s| s.product_id == z.id && s.available == 2));
        assert!(shortages.iter().any(|s| s.product_id == w.id && s.available == 0));

        // No order, stock untouched, cart still active with its lines.
        assert!(store.all_orders().await.unwrap().is_empty());
        assert_eq!(store.product(z.id).await.unwrap().unwrap().stock_quantity, 2);
        assert_eq!(store.priced_cart_lines(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn materialize_requires_an_owned_address() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 999, 10).await;
        let foreign_address = seed_address(&store, UserId::new()).await;
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();

        let err = store
            .materialize_order(user, foreign_address.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AddressNotFound));
    }

    #[tokio::test]
    async fn materialize_rejects_empty_and_missing_carts() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let address = seed_address(&store, user).await;

        let err = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyCart));

        store.get_or_create_active_cart(user).await.unwrap();
        let err = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyCart));
    }

    #[tokio::test]
    async fn total_reflects_snapshot_not_current_price() {
        // Scenario: snapshot at 10.00, price raised to 15.00 before checkout.
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 10).await;
        let address = seed_address(&store, user).await;

        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        store
            .state
            .write()
            .await
            .products
            .get_mut(&product.id)
            .unwrap()
            .price = Money::from_minor(1500);

        let lines = store.priced_cart_lines(user).await.unwrap();
        assert_eq!(cart_total(&lines), Money::from_minor(1000));

        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();
        assert_eq!(placed.order.total_amount, Money::from_minor(1000));
        assert_eq!(placed.lines[0].price, Money::from_minor(1000));
    }

    #[tokio::test]
    async fn payment_lifecycle_with_duplicate_guard() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 5).await;
        let address = seed_address(&store, user).await;
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();

        let payment = store
            .insert_payment(NewPayment::usd(
                placed.order.id,
                placed.order.total_amount,
                PaymentMethod::Card,
                "t1",
            ))
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let (payment, order) = store
            .apply_payment_outcome("t1", GatewayOutcome::Succeeded)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, OrderPaymentStatus::Paid);

        // Replaying the same transaction id fails and changes nothing.
        let err = store
            .insert_payment(NewPayment::usd(
                placed.order.id,
                placed.order.total_amount,
                PaymentMethod::Card,
                "t1",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTransaction(_)));
        let order = store.order(placed.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn failed_payment_can_be_retried() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 5).await;
        let address = seed_address(&store, user).await;
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();
        let total = placed.order.total_amount;

        store
            .insert_payment(NewPayment::usd(placed.order.id, total, PaymentMethod::Card, "t1"))
            .await
            .unwrap();
        let (_, order) = store
            .apply_payment_outcome("t1", GatewayOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(order.payment_status, OrderPaymentStatus::Failed);
        assert_eq!(order.status, OrderStatus::Pending);

        // A fresh transaction id settles the retry.
        store
            .insert_payment(NewPayment::usd(placed.order.id, total, PaymentMethod::Card, "t2"))
            .await
            .unwrap();
        let (_, order) = store
            .apply_payment_outcome("t2", GatewayOutcome::Succeeded)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(store.payment_count().await, 2);
    }

    #[tokio::test]
    async fn second_live_payment_is_rejected() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 5).await;
        let address = seed_address(&store, user).await;
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();
        let total = placed.order.total_amount;

        store
            .insert_payment(NewPayment::usd(placed.order.id, total, PaymentMethod::Card, "t1"))
            .await
            .unwrap();
        // Still pending, but a live payment exists.
        let err = store
            .insert_payment(NewPayment::usd(placed.order.id, total, PaymentMethod::Paypal, "t2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotPayable { .. }));
    }

    #[tokio::test]
    async fn cancel_and_fulfillment_transitions() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 5).await;
        let address = seed_address(&store, user).await;
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();

        // Cannot ship a pending order.
        let err = store
            .advance_order_status(placed.order.id, OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::State(_)));

        let canceled = store.cancel_order(placed.order.id).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);

        // Canceled orders are not payable.
        let err = store
            .insert_payment(NewPayment::usd(
                placed.order.id,
                placed.order.total_amount,
                PaymentMethod::Card,
                "t1",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotPayable { .. }));
    }

    #[tokio::test]
    async fn removing_a_product_detaches_history_and_clears_carts() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let product = seed_product(&store, "Widget", 1000, 5).await;
        let address = seed_address(&store, user).await;
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        let placed = store
            .materialize_order(user, address.id, None)
            .await
            .unwrap();

        // Product ends up back in a fresh cart, then gets removed.
        store
            .add_or_increment_line(user, product.id, 1)
            .await
            .unwrap();
        store.remove_product(product.id).await.unwrap();

        let history = store
            .order_with_lines(placed.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.lines[0].product_id, None);
        assert_eq!(history.order.total_amount, placed.order.total_amount);
        assert!(store.priced_cart_lines(user).await.unwrap().is_empty());
    }
}
