//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CartLineId, ProductId};
use domain::{CartLine, Money, PricedCartLine, cart_item_count, cart_total};
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Caller;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub price_snapshot: Option<Money>,
}

impl From<CartLine> for CartLineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            id: line.id.as_uuid(),
            product_id: line.product_id.as_uuid(),
            quantity: line.quantity,
            price_snapshot: line.price_snapshot,
        }
    }
}

#[derive(Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub is_active: bool,
    pub items: Vec<CartItemView>,
    pub cart_total: Money,
    pub cart_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn item_view(priced: &PricedCartLine) -> CartItemView {
    CartItemView {
        id: priced.line.id.as_uuid(),
        product_id: priced.product.id.as_uuid(),
        product_name: priced.product.name.clone(),
        quantity: priced.line.quantity,
        unit_price: priced.unit_price(),
        line_total: priced.line_total(),
    }
}

// -- Handlers --

/// GET /carts/me — the caller's active cart, created lazily.
#[tracing::instrument(skip(state))]
pub async fn my_cart<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .store
        .get_or_create_active_cart(identity.user_id)
        .await?;
    let lines = state.store.priced_cart_lines(identity.user_id).await?;

    Ok(Json(CartResponse {
        id: cart.id.as_uuid(),
        is_active: cart.is_active,
        items: lines.iter().map(item_view).collect(),
        cart_total: cart_total(&lines),
        cart_count: cart_item_count(&lines),
        created_at: cart.created_at,
        updated_at: cart.updated_at,
    }))
}

/// POST /carts/items — add a product, or bump the existing line.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLineResponse>), ApiError> {
    let line = state
        .store
        .add_or_increment_line(
            identity.user_id,
            ProductId::from_uuid(req.product_id),
            req.quantity,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(line.into())))
}

/// PATCH /carts/items/{id} — overwrite a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartLineResponse>, ApiError> {
    let line = state
        .store
        .set_line_quantity(identity.user_id, CartLineId::from_uuid(id), req.quantity)
        .await?;
    Ok(Json(line.into()))
}

/// DELETE /carts/items/{id} — drop a line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .remove_line(identity.user_id, CartLineId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
