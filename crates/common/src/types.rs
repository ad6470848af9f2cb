use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Defines a newtype UUID identifier.
///
/// Each entity gets its own id type to prevent mixing up, say, a cart id
/// with an order id at a call site that takes both.
macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a user, as issued by the external identity provider.
    UserId
);
entity_id!(
    /// Identifier of a catalog product.
    ProductId
);
entity_id!(
    /// Identifier of a shopping cart.
    CartId
);
entity_id!(
    /// Identifier of a single line within a cart.
    CartLineId
);
entity_id!(
    /// Identifier of an order.
    OrderId
);
entity_id!(
    /// Identifier of a single line within an order.
    OrderLineId
);
entity_id!(
    /// Identifier of a payment record.
    PaymentId
);
entity_id!(
    /// Identifier of an address in the user's address book.
    AddressId
);

/// The authenticated identity attached to a request.
///
/// Issued by the upstream identity provider; the backend treats it as an
/// opaque authorization fact ("does this identity own this resource").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub is_staff: bool,
}

impl Identity {
    /// A regular customer identity.
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_staff: false,
        }
    }

    /// A staff identity, allowed to see and manage all resources.
    pub fn staff(user_id: UserId) -> Self {
        Self {
            user_id,
            is_staff: true,
        }
    }
}
