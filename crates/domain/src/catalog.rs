//! Read views of the catalog and address book.
//!
//! Products and addresses are owned by external subsystems; the checkout
//! core reads price, stock and address ownership, and mutates nothing
//! here except the stock decrement performed inside order materialization.

use common::{AddressId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A catalog product as seen by the cart and checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current list price. Mutable by the catalog at any time, hence the
    /// per-line price snapshots.
    pub price: Money,
    /// Units currently available.
    pub stock_quantity: u32,
}

impl Product {
    /// Returns true if `quantity` units could be fulfilled right now.
    ///
    /// Advisory from the cart's perspective; the materializer re-validates
    /// inside its transaction.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        quantity <= self.stock_quantity
    }
}

/// An address book entry. The core only needs existence and ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub line1: String,
    pub city: String,
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_check_is_inclusive() {
        let product = Product {
            id: ProductId::new(),
            name: "Widget".to_string(),
            price: Money::from_minor(999),
            stock_quantity: 3,
        };
        assert!(product.has_stock_for(3));
        assert!(!product.has_stock_for(4));
    }
}
