pub mod types;

pub use types::{
    AddressId, CartId, CartLineId, Identity, OrderId, OrderLineId, PaymentId, ProductId, UserId,
};
