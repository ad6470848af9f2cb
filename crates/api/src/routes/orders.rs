//! Order endpoints: checkout, retrieval and lifecycle transitions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AddressId, OrderId};
use domain::{
    Money, Order, OrderPaymentStatus, OrderStatus, OrderWithLines, can_access,
};
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Caller;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateFromCartRequest {
    pub billing_address_id: Uuid,
    pub shipping_address_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub quantity: u32,
    pub price: Money,
    pub line_total: Money,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub summary: OrderSummaryResponse,
    pub billing_address_id: Option<Uuid>,
    pub shipping_address_id: Option<Uuid>,
    pub lines: Vec<OrderLineResponse>,
}

impl From<&Order> for OrderSummaryResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.as_uuid(),
            user_id: order.user_id.map(|u| u.as_uuid()),
            status: order.status,
            payment_status: order.payment_status,
            total_amount: order.total_amount,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl From<&OrderWithLines> for OrderResponse {
    fn from(placed: &OrderWithLines) -> Self {
        Self {
            summary: (&placed.order).into(),
            billing_address_id: placed.order.billing_address_id.map(|a| a.as_uuid()),
            shipping_address_id: placed.order.shipping_address_id.map(|a| a.as_uuid()),
            lines: placed
                .lines
                .iter()
                .map(|l| OrderLineResponse {
                    id: l.id.as_uuid(),
                    product_id: l.product_id.map(|p| p.as_uuid()),
                    quantity: l.quantity,
                    price: l.price,
                    line_total: l.line_total(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders/create-from-cart — materialize the caller's active cart.
#[tracing::instrument(skip(state, req))]
pub async fn create_from_cart<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Json(req): Json<CreateFromCartRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let placed = state
        .checkout
        .place_order(
            identity.user_id,
            AddressId::from_uuid(req.billing_address_id),
            req.shipping_address_id.map(AddressId::from_uuid),
        )
        .await?;
    Ok((StatusCode::CREATED, Json((&placed).into())))
}

/// GET /orders — the caller's orders; staff see everyone's.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
) -> Result<Json<Vec<OrderSummaryResponse>>, ApiError> {
    let orders = if identity.is_staff {
        state.store.all_orders().await?
    } else {
        state.store.orders_for_user(identity.user_id).await?
    };
    Ok(Json(orders.iter().map(Into::into).collect()))
}

/// GET /orders/{id} — one order with its lines.
///
/// Responds 404 rather than 403 for orders the caller does not own, so
/// the endpoint does not leak which ids exist.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let placed = state
        .store
        .order_with_lines(order_id)
        .await?
        .filter(|o| can_access(&identity, &o.order))
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {order_id}")))?;
    Ok(Json((&placed).into()))
}

/// POST /orders/{id}/cancel — cancel a pending or processing order.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(identity): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderSummaryResponse>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .store
        .order(order_id)
        .await?
        .filter(|o| can_access(&identity, o))
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {order_id}")))?;
    let canceled = state.store.cancel_order(order.id).await?;
    Ok(Json((&canceled).into()))
}

/// POST /orders/{id}/status — staff-only fulfillment advance.
#[tracing::instrument(skip(state, req))]
pub async fn advance_status<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<AdvanceStatusRequest>,
) -> Result<Json<OrderSummaryResponse>, ApiError> {
    caller.require_staff()?;
    let order = state
        .store
        .advance_order_status(OrderId::from_uuid(id), req.status)
        .await?;
    Ok(Json((&order).into()))
}
