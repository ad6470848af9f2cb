//! PostgreSQL-backed store implementation.

use async_trait::async_trait;
use common::{
    AddressId, CartId, CartLineId, OrderId, OrderLineId, PaymentId, ProductId, UserId,
};
use domain::{
    Address, Cart, CartLine, GatewayOutcome, Money, Order, OrderLine, OrderPaymentStatus,
    OrderStatus, OrderWithLines, Payment, PaymentMethod, PaymentStatus, PricedCartLine, Product,
    UnknownStatus, apply_settlement_outcome,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StockShortage, StoreError};
use crate::store::{CommerceStore, NewAddress, NewPayment, NewProduct};

/// PostgreSQL `CommerceStore`.
///
/// The database is the single synchronization point: all invariants are
/// carried by constraints and single transactions, never by in-process
/// locks.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn to_u32(value: i32, kind: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        StoreError::Corrupt(UnknownStatus {
            kind,
            value: value.to_string(),
        })
    })
}

fn quantity_param(quantity: u32) -> Result<i32> {
    if quantity < 1 {
        return Err(StoreError::InvalidQuantity(quantity));
    }
    i32::try_from(quantity).map_err(|_| StoreError::InvalidQuantity(quantity))
}

/// Maps transient serialization failures and deadlocks to `Conflict` so
/// callers can retry once; everything else stays a database error.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && matches!(db_err.code().as_deref(), Some("40001" | "40P01"))
    {
        return StoreError::Conflict(db_err.message().to_string());
    }
    StoreError::Database(e)
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::new(row.try_get::<Decimal, _>("price")?),
        stock_quantity: to_u32(row.try_get("stock_quantity")?, "stock quantity")?,
    })
}

fn row_to_address(row: &PgRow) -> Result<Address> {
    Ok(Address {
        id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        line1: row.try_get("line1")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
    })
}

fn row_to_cart(row: &PgRow) -> Result<Cart> {
    Ok(Cart {
        id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: row.try_get::<Option<Uuid>, _>("user_id")?.map(UserId::from_uuid),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
    Ok(CartLine {
        id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        price_snapshot: row
            .try_get::<Option<Decimal>, _>("price_snapshot")?
            .map(Money::new),
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: row.try_get::<Option<Uuid>, _>("user_id")?.map(UserId::from_uuid),
        billing_address_id: row
            .try_get::<Option<Uuid>, _>("billing_address_id")?
            .map(AddressId::from_uuid),
        shipping_address_id: row
            .try_get::<Option<Uuid>, _>("shipping_address_id")?
            .map(AddressId::from_uuid),
        status: OrderStatus::parse(row.try_get::<&str, _>("status")?)?,
        payment_status: OrderPaymentStatus::parse(row.try_get::<&str, _>("payment_status")?)?,
        total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: row
            .try_get::<Option<Uuid>, _>("product_id")?
            .map(ProductId::from_uuid),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        price: Money::new(row.try_get::<Decimal, _>("price")?),
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        amount: Money::new(row.try_get::<Decimal, _>("amount")?),
        currency: row.try_get::<String, _>("currency")?.trim_end().to_string(),
        method: PaymentMethod::parse(row.try_get::<&str, _>("method")?)?,
        transaction_id: row.try_get("transaction_id")?,
        status: PaymentStatus::parse(row.try_get::<&str, _>("status")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, billing_address_id, shipping_address_id, status, \
                             payment_status, total_amount, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, order_id, amount, currency, method, transaction_id, status, created_at, updated_at";

impl PostgresStore {
    async fn load_order_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: OrderId,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_error)?
        .ok_or(StoreError::OrderNotFound(id))?;
        row_to_order(&row)
    }

    async fn persist_order_status(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2, payment_status = $3, updated_at = now() \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(map_db_error)?;
        row_to_order(&row)
    }

    async fn owned_address(
        tx: &mut Transaction<'_, Postgres>,
        id: AddressId,
        user: UserId,
    ) -> Result<Address> {
        let row = sqlx::query(
            "SELECT id, user_id, line1, city, country FROM addresses \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_error)?
        .ok_or(StoreError::AddressNotFound)?;
        row_to_address(&row)
    }

    /// Finds or creates the active cart inside an open transaction.
    ///
    /// The partial unique index is the final arbiter under concurrent
    /// creation; a loser's insert hits `DO NOTHING` and the follow-up
    /// select picks up the winner's row.
    async fn active_cart_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
    ) -> Result<Cart> {
        for _ in 0..2 {
            let existing = sqlx::query(
                "SELECT id, user_id, is_active, created_at, updated_at FROM carts \
                 WHERE user_id = $1 AND is_active",
            )
            .bind(user.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_error)?;
            if let Some(row) = existing {
                return row_to_cart(&row);
            }

            let inserted = sqlx::query(
                "INSERT INTO carts (id, user_id, is_active) VALUES ($1, $2, TRUE) \
                 ON CONFLICT (user_id) WHERE is_active DO NOTHING \
                 RETURNING id, user_id, is_active, created_at, updated_at",
            )
            .bind(CartId::new().as_uuid())
            .bind(user.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_error)?;
            if let Some(row) = inserted {
                return row_to_cart(&row);
            }
        }
        Err(StoreError::Conflict(
            "active cart creation kept conflicting".to_string(),
        ))
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let row = sqlx::query(
            "INSERT INTO products (id, name, price, stock_quantity) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, price, stock_quantity",
        )
        .bind(ProductId::new().as_uuid())
        .bind(&new.name)
        .bind(new.price.amount())
        .bind(
            i32::try_from(new.stock_quantity)
                .map_err(|_| StoreError::InvalidQuantity(new.stock_quantity))?,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row_to_product(&row)
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price, stock_quantity FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(|r| row_to_product(&r)).transpose()
    }

    async fn remove_product(&self, id: ProductId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Detach order history first, then clear pending cart lines; the
        // product row itself goes last.
        sqlx::query("UPDATE order_lines SET product_id = NULL WHERE product_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        sqlx::query("DELETE FROM cart_lines WHERE product_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(())
    }

    async fn insert_address(&self, new: NewAddress) -> Result<Address> {
        let row = sqlx::query(
            "INSERT INTO addresses (id, user_id, line1, city, country) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, line1, city, country",
        )
        .bind(AddressId::new().as_uuid())
        .bind(new.user_id.as_uuid())
        .bind(&new.line1)
        .bind(&new.city)
        .bind(&new.country)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        row_to_address(&row)
    }

    async fn address(&self, id: AddressId) -> Result<Option<Address>> {
        let row = sqlx::query("SELECT id, user_id, line1, city, country FROM addresses WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(|r| row_to_address(&r)).transpose()
    }

    async fn get_or_create_active_cart(&self, user: UserId) -> Result<Cart> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let cart = Self::active_cart_in_tx(&mut tx, user).await?;
        tx.commit().await.map_err(map_db_error)?;
        Ok(cart)
    }

    async fn priced_cart_lines(&self, user: UserId) -> Result<Vec<PricedCartLine>> {
        let rows = sqlx::query(
            "SELECT l.id, l.cart_id, l.product_id, l.quantity, l.price_snapshot, l.updated_at, \
                    p.name, p.price, p.stock_quantity \
             FROM cart_lines l \
             JOIN carts c ON c.id = l.cart_id \
             JOIN products p ON p.id = l.product_id \
             WHERE c.user_id = $1 AND c.is_active \
             ORDER BY p.name",
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.iter()
            .map(|row| {
                let line = row_to_cart_line(row)?;
                let product = Product {
                    id: line.product_id,
                    name: row.try_get("name")?,
                    price: Money::new(row.try_get::<Decimal, _>("price")?),
                    stock_quantity: to_u32(row.try_get("stock_quantity")?, "stock quantity")?,
                };
                Ok(PricedCartLine { line, product })
            })
            .collect()
    }

    async fn add_or_increment_line(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let qty = quantity_param(quantity)?;
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let cart = Self::active_cart_in_tx(&mut tx, user).await?;
        let product_row =
            sqlx::query("SELECT id, name, price, stock_quantity FROM products WHERE id = $1")
                .bind(product.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?
                .ok_or(StoreError::ProductNotFound(product))?;
        let product = row_to_product(&product_row)?;

        let row = sqlx::query(
            "INSERT INTO cart_lines (id, cart_id, product_id, quantity, price_snapshot) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (cart_id, product_id) \
             DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity, \
                           price_snapshot = EXCLUDED.price_snapshot, \
                           updated_at = now() \
             RETURNING id, cart_id, product_id, quantity, price_snapshot, updated_at",
        )
        .bind(CartLineId::new().as_uuid())
        .bind(cart.id.as_uuid())
        .bind(product.id.as_uuid())
        .bind(qty)
        .bind(product.price.amount())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let line = row_to_cart_line(&row)?;

        // Advisory stock check on the resulting quantity; the transaction
        // rolls back on failure so the increment never lands.
        if !product.has_stock_for(line.quantity) {
            return Err(StoreError::InsufficientStock {
                shortages: vec![StockShortage {
                    product_id: product.id,
                    product_name: product.name,
                    requested: line.quantity,
                    available: product.stock_quantity,
                }],
            });
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(line)
    }

    async fn set_line_quantity(
        &self,
        user: UserId,
        line: CartLineId,
        quantity: u32,
    ) -> Result<CartLine> {
        let qty = quantity_param(quantity)?;
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let owned = sqlx::query(
            "SELECT l.product_id FROM cart_lines l \
             JOIN carts c ON c.id = l.cart_id \
             WHERE l.id = $1 AND c.user_id = $2 AND c.is_active",
        )
        .bind(line.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?
        .ok_or(StoreError::CartLineNotFound(line))?;
        let product_id = ProductId::from_uuid(owned.try_get::<Uuid, _>("product_id")?);

        let product_row =
            sqlx::query("SELECT id, name, price, stock_quantity FROM products WHERE id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?
                .ok_or(StoreError::ProductNotFound(product_id))?;
        let product = row_to_product(&product_row)?;

        if !product.has_stock_for(quantity) {
            return Err(StoreError::InsufficientStock {
                shortages: vec![StockShortage {
                    product_id: product.id,
                    product_name: product.name,
                    requested: quantity,
                    available: product.stock_quantity,
                }],
            });
        }

        let row = sqlx::query(
            "UPDATE cart_lines SET quantity = $2, price_snapshot = $3, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, cart_id, product_id, quantity, price_snapshot, updated_at",
        )
        .bind(line.as_uuid())
        .bind(qty)
        .bind(product.price.amount())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let updated = row_to_cart_line(&row)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(updated)
    }

    async fn remove_line(&self, user: UserId, line: CartLineId) -> Result<()> {
        let deleted = sqlx::query(
            "DELETE FROM cart_lines l USING carts c \
             WHERE l.id = $1 AND l.cart_id = c.id AND c.user_id = $2 AND c.is_active",
        )
        .bind(line.as_uuid())
        .bind(user.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::CartLineNotFound(line));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn materialize_order(
        &self,
        user: UserId,
        billing_address: AddressId,
        shipping_address: Option<AddressId>,
    ) -> Result<OrderWithLines> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // 1. The active cart and its lines, joined with current product
        //    price and stock.
        let cart_row = sqlx::query(
            "SELECT id, user_id, is_active, created_at, updated_at FROM carts \
             WHERE user_id = $1 AND is_active",
        )
        .bind(user.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?
        .ok_or(StoreError::EmptyCart)?;
        let cart = row_to_cart(&cart_row)?;

        let line_rows = sqlx::query(
            "SELECT l.id, l.cart_id, l.product_id, l.quantity, l.price_snapshot, l.updated_at, \
                    p.name, p.price, p.stock_quantity \
             FROM cart_lines l JOIN products p ON p.id = l.product_id \
             WHERE l.cart_id = $1 ORDER BY p.name",
        )
        .bind(cart.id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db_error)?;
        if line_rows.is_empty() {
            return Err(StoreError::EmptyCart);
        }
        let mut priced = Vec::with_capacity(line_rows.len());
        for row in &line_rows {
            let line = row_to_cart_line(row)?;
            let product = Product {
                id: line.product_id,
                name: row.try_get("name")?,
                price: Money::new(row.try_get::<Decimal, _>("price")?),
                stock_quantity: to_u32(row.try_get("stock_quantity")?, "stock quantity")?,
            };
            priced.push(PricedCartLine { line, product });
        }

        // 2. Addresses must exist and belong to the requesting user;
        //    shipping defaults to billing.
        let billing = Self::owned_address(&mut tx, billing_address, user).await?;
        let shipping = match shipping_address {
            Some(id) => Self::owned_address(&mut tx, id, user).await?,
            None => billing.clone(),
        };

        // 3. Validate stock across every line, reporting all violations.
        let shortages: Vec<StockShortage> = priced
            .iter()
            .filter(|p| !p.product.has_stock_for(p.line.quantity))
            .map(|p| StockShortage {
                product_id: p.product.id,
                product_name: p.product.name.clone(),
                requested: p.line.quantity,
                available: p.product.stock_quantity,
            })
            .collect();
        if !shortages.is_empty() {
            return Err(StoreError::InsufficientStock { shortages });
        }

        // 4. Freeze the total from the snapshots (exact decimal math).
        let total_amount: Money = priced.iter().map(PricedCartLine::line_total).sum();

        // 5. The order header.
        let order_id = OrderId::new();
        let order_row = sqlx::query(&format!(
            "INSERT INTO orders (id, user_id, billing_address_id, shipping_address_id, \
                                 status, payment_status, total_amount) \
             VALUES ($1, $2, $3, $4, 'pending', 'pending', $5) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id.as_uuid())
        .bind(user.as_uuid())
        .bind(billing.id.as_uuid())
        .bind(shipping.id.as_uuid())
        .bind(total_amount.amount())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let order = row_to_order(&order_row)?;

        // 6. Order lines plus the guarded relative stock decrement. A
        //    zero-row update means a concurrent checkout won the race for
        //    the remaining units; roll the whole order back.
        let mut lines = Vec::with_capacity(priced.len());
        for p in &priced {
            let qty = quantity_param(p.line.quantity)?;
            let decremented = sqlx::query(
                "UPDATE products \
                 SET stock_quantity = stock_quantity - $2, updated_at = now() \
                 WHERE id = $1 AND stock_quantity >= $2",
            )
            .bind(p.product.id.as_uuid())
            .bind(qty)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
            if decremented.rows_affected() == 0 {
                let available = sqlx::query_scalar::<_, i32>(
                    "SELECT stock_quantity FROM products WHERE id = $1",
                )
                .bind(p.product.id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db_error)?;
                return Err(StoreError::InsufficientStock {
                    shortages: vec![StockShortage {
                        product_id: p.product.id,
                        product_name: p.product.name.clone(),
                        requested: p.line.quantity,
                        available: to_u32(available, "stock quantity")?,
                    }],
                });
            }

            let price = p.unit_price();
            let line_row = sqlx::query(
                "INSERT INTO order_lines (id, order_id, product_id, quantity, price) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, order_id, product_id, quantity, price",
            )
            .bind(OrderLineId::new().as_uuid())
            .bind(order.id.as_uuid())
            .bind(p.product.id.as_uuid())
            .bind(qty)
            .bind(price.amount())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;
            lines.push(row_to_order_line(&line_row)?);
        }

        // 7. Deactivate the cart and clear its lines; the cart row stays
        //    as history.
        sqlx::query("UPDATE carts SET is_active = FALSE, updated_at = now() WHERE id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(OrderWithLines { order, lines })
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(|r| row_to_order(&r)).transpose()
    }

    async fn order_with_lines(&self, id: OrderId) -> Result<Option<OrderWithLines>> {
        let Some(order) = self.order(id).await? else {
            return Ok(None);
        };
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, quantity, price FROM order_lines \
             WHERE order_id = $1 ORDER BY id",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        let lines = rows
            .iter()
            .map(row_to_order_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(OrderWithLines { order, lines }))
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(row_to_order).collect()
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        rows.iter().map(row_to_order).collect()
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let mut order = Self::load_order_for_update(&mut tx, id).await?;
        order.cancel()?;
        let order = Self::persist_order_status(&mut tx, &order).await?;
        tx.commit().await.map_err(map_db_error)?;
        Ok(order)
    }

    async fn advance_order_status(&self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let mut order = Self::load_order_for_update(&mut tx, id).await?;
        order.advance_fulfillment(next)?;
        let order = Self::persist_order_status(&mut tx, &order).await?;
        tx.commit().await.map_err(map_db_error)?;
        Ok(order)
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<Payment> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        let order = Self::load_order_for_update(&mut tx, new.order_id).await?;

        // Replays of an already-seen transaction id must surface as
        // duplicates, regardless of what state the order is in by now.
        let duplicate: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM payments WHERE transaction_id = $1 LIMIT 1")
                .bind(&new.transaction_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?;
        if duplicate.is_some() {
            return Err(StoreError::DuplicateTransaction(new.transaction_id));
        }

        let live_payment: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM payments WHERE order_id = $1 AND status <> 'failed' LIMIT 1",
        )
        .bind(order.id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;
        if !order.is_payable() || live_payment.is_some() {
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

        let row = sqlx::query(&format!(
            "INSERT INTO payments (id, order_id, amount, currency, method, transaction_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending') \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(PaymentId::new().as_uuid())
        .bind(order.id.as_uuid())
        .bind(new.amount.amount())
        .bind(&new.currency)
        .bind(new.method.as_str())
        .bind(&new.transaction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("payments_transaction_id_key") => {
                        return StoreError::DuplicateTransaction(new.transaction_id.clone());
                    }
                    Some("payments_one_live_per_order") => {
                        return StoreError::Conflict(
                            "concurrent payment recorded for order".to_string(),
                        );
                    }
                    _ => {}
                }
            }
            map_db_error(e)
        })?;
        let payment = row_to_payment(&row)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(payment)
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        row.map(|r| row_to_payment(&r)).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn apply_payment_outcome(
        &self,
        transaction_id: &str,
        outcome: GatewayOutcome,
    ) -> Result<(Payment, Order)> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let payment_row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1 FOR UPDATE"
        ))
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| StoreError::UnknownTransaction(transaction_id.to_string()))?;
        let mut payment = row_to_payment(&payment_row)?;
        let mut order = Self::load_order_for_update(&mut tx, payment.order_id).await?;

        // The status fan-out is defined once in the domain; persist
        // whatever it produced, in the same transaction.
        apply_settlement_outcome(&mut payment, &mut order, outcome)?;

        let payment_row = sqlx::query(&format!(
            "UPDATE payments SET status = $2, updated_at = now() \
             WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let payment = row_to_payment(&payment_row)?;
        let order = Self::persist_order_status(&mut tx, &order).await?;

        tx.commit().await.map_err(map_db_error)?;
        Ok((payment, order))
    }
}
