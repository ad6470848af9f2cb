//! Resource ownership as an explicit capability.

use common::{Identity, UserId};

use crate::cart::Cart;
use crate::catalog::Address;
use crate::order::Order;

/// Implemented by every entity that belongs to a user.
///
/// Authorization is then a single polymorphic call instead of per-type
/// attribute inspection. `None` means the resource has no owner (an
/// anonymous cart or a detached order); only staff may act on it.
pub trait Ownable {
    fn owner(&self) -> Option<UserId>;
}

impl Ownable for Cart {
    fn owner(&self) -> Option<UserId> {
        self.user_id
    }
}

impl Ownable for Order {
    fn owner(&self) -> Option<UserId> {
        self.user_id
    }
}

impl Ownable for Address {
    fn owner(&self) -> Option<UserId> {
        Some(self.user_id)
    }
}

/// The one access rule: staff see everything, everyone else only what
/// they own.
pub fn can_access(identity: &Identity, resource: &impl Ownable) -> bool {
    identity.is_staff || resource.owner() == Some(identity.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::status::{OrderPaymentStatus, OrderStatus};
    use chrono::Utc;
    use common::{AddressId, OrderId};

    fn order_owned_by(user_id: Option<UserId>) -> Order {
        Order {
            id: OrderId::new(),
            user_id,
            billing_address_id: None,
            shipping_address_id: None,
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
            total_amount: Money::zero(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_can_access_own_order() {
        let user = UserId::new();
        let order = order_owned_by(Some(user));
        assert!(can_access(&Identity::user(user), &order));
        assert!(!can_access(&Identity::user(UserId::new()), &order));
    }

    #[test]
    fn staff_can_access_everything() {
        let order = order_owned_by(Some(UserId::new()));
        assert!(can_access(&Identity::staff(UserId::new()), &order));
    }

    #[test]
    fn detached_order_is_staff_only() {
        let order = order_owned_by(None);
        assert!(!can_access(&Identity::user(UserId::new()), &order));
        assert!(can_access(&Identity::staff(UserId::new()), &order));
    }

    #[test]
    fn address_ownership() {
        let user = UserId::new();
        let address = Address {
            id: AddressId::new(),
            user_id: user,
            line1: "1 Main St".to_string(),
            city: "Nairobi".to_string(),
            country: "KE".to_string(),
        };
        assert!(can_access(&Identity::user(user), &address));
        assert!(!can_access(&Identity::user(UserId::new()), &address));
    }
}
