//! The mutable cart aggregate.

use chrono::{DateTime, Utc};
use common::{CartId, CartLineId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::money::Money;

/// A user's in-progress selection of products.
///
/// At most one cart per user is active at any time; materializing an order
/// deactivates the cart rather than deleting it, so inactive carts
/// accumulate as a history trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product within a cart.
///
/// A product appears at most once per cart; re-adding increments the
/// quantity instead of duplicating the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured when the line was last added or updated.
    /// Falls back to the product's current price when absent.
    pub price_snapshot: Option<Money>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// The unit price this line settles at: the snapshot, or the product's
    /// current price when no snapshot was taken.
    pub fn effective_unit_price(&self, current_price: Money) -> Money {
        self.price_snapshot.unwrap_or(current_price)
    }

    /// `quantity * effective unit price`.
    pub fn line_total(&self, current_price: Money) -> Money {
        self.effective_unit_price(current_price).multiply(self.quantity)
    }
}

/// A cart line joined with its product, as served to the cart view and
/// consumed by the materializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedCartLine {
    pub line: CartLine,
    pub product: Product,
}

impl PricedCartLine {
    /// The unit price this line would settle at right now.
    pub fn unit_price(&self) -> Money {
        self.line.effective_unit_price(self.product.price)
    }

    /// The line's contribution to the cart total.
    pub fn line_total(&self) -> Money {
        self.line.line_total(self.product.price)
    }
}

/// Computes the cart total: `sum(quantity * (snapshot ?? current price))`.
///
/// Derived on demand, never persisted on the cart row.
pub fn cart_total(lines: &[PricedCartLine]) -> Money {
    lines.iter().map(PricedCartLine::line_total).sum()
}

/// Total number of units across all lines.
pub fn cart_item_count(lines: &[PricedCartLine]) -> u32 {
    lines.iter().map(|l| l.line.quantity).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced(quantity: u32, snapshot: Option<i64>, current: i64) -> PricedCartLine {
        let product = Product {
            id: ProductId::new(),
            name: "Widget".to_string(),
            price: Money::from_minor(current),
            stock_quantity: 100,
        };
        PricedCartLine {
            line: CartLine {
                id: CartLineId::new(),
                cart_id: CartId::new(),
                product_id: product.id,
                quantity,
                price_snapshot: snapshot.map(Money::from_minor),
                updated_at: Utc::now(),
            },
            product,
        }
    }

    #[test]
    fn snapshot_price_wins_over_current() {
        let line = priced(2, Some(1000), 1500);
        assert_eq!(line.unit_price(), Money::from_minor(1000));
        assert_eq!(line.line_total(), Money::from_minor(2000));
    }

    #[test]
    fn missing_snapshot_falls_back_to_current_price() {
        let line = priced(3, None, 500);
        assert_eq!(line.line_total(), Money::from_minor(1500));
    }

    #[test]
    fn total_over_mixed_lines() {
        // 2 x 9.99 snapshotted + 1 x 5.00 at current price.
        let lines = vec![priced(2, Some(999), 1299), priced(1, None, 500)];
        assert_eq!(cart_total(&lines), Money::from_minor(2498));
        assert_eq!(cart_item_count(&lines), 3);
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(cart_total(&[]), Money::zero());
        assert_eq!(cart_item_count(&[]), 0);
    }
}
