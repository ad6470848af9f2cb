//! Address book endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::Address;
use serde::{Deserialize, Serialize};
use store::{CommerceStore, NewAddress};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Caller;

#[derive(Deserialize)]
pub struct CreateAddressRequest {
    pub line1: String,
    pub city: String,
    pub country: String,
}

#[derive(Serialize)]
pub struct AddressResponse {
    pub id: Uuid,
    pub line1: String,
    pub city: String,
    pub country: String,
}

impl From<Address> for AddressResponse {
    fn from(address: Address) -> Self {
        Self {
            id: address.id.as_uuid(),
            line1: address.line1,
            city: address.city,
            country: address.country,
        }
    }
}

/// POST /addresses — create an address owned by the caller.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Json(req): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<AddressResponse>), ApiError> {
    let address = state
        .store
        .insert_address(NewAddress {
            user_id: identity.user_id,
            line1: req.line1,
            city: req.city,
            country: req.country,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(address.into())))
}
