//! Catalog seeding endpoints (staff only).
//!
//! Catalog management proper lives in another subsystem; these two
//! endpoints exist so that stock and prices can be provisioned, and so
//! product removal goes through the detach-order-history path instead of
//! cascading deletes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{Money, Product};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, NewProduct};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Caller;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.as_uuid(),
            name: product.name,
            price: product.price,
            stock_quantity: product.stock_quantity,
        }
    }
}

/// POST /products — seed a product.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    caller.require_staff()?;
    let product = state
        .store
        .insert_product(NewProduct {
            name: req.name,
            price: req.price,
            stock_quantity: req.stock_quantity,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// DELETE /products/{id} — remove a product, detaching order history.
#[tracing::instrument(skip(state))]
pub async fn remove<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    caller.require_staff()?;
    state.store.remove_product(ProductId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
