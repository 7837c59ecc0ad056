//! Cart endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{Cart, CartLine};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::{AppState, ShopBackend};

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub user_id: String,
    pub lines: Vec<CartLineResponse>,
    pub total_quantity: u64,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

impl From<&CartLine> for CartLineResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id().to_string(),
            product_id: line.product_id().to_string(),
            name: line.name().to_string(),
            unit_price_cents: line.unit_price().cents(),
            quantity: line.quantity(),
            line_total_cents: line.line_total().cents(),
        }
    }
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            id: cart.id().to_string(),
            user_id: cart.user_id().to_string(),
            lines: cart.lines().iter().map(CartLineResponse::from).collect(),
            total_quantity: cart.total_quantity(),
            total_cents: cart.total().cents(),
        }
    }
}

// -- Handlers --

/// GET /api/cart: the caller's cart, created empty on first access.
#[tracing::instrument(skip(state))]
pub async fn get<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.shop.get_or_create_cart(identity.user_id()).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /api/cart/items: add units of a catalog product.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartLineResponse>, ApiError> {
    let product_id = parse_product_id(&req.product_id)?;
    if req.quantity <= 0 {
        return Err(ApiError::BadRequest(
            "quantity must be positive".to_string(),
        ));
    }

    let line = state
        .shop
        .add_item(identity.user_id(), product_id, req.quantity)
        .await?
        .ok_or_else(|| ApiError::BadRequest("quantity must be positive".to_string()))?;

    Ok(Json(CartLineResponse::from(&line)))
}

/// PUT /api/cart/items/:product_id: set a line's quantity; zero or less removes it.
#[tracing::instrument(skip(state, req))]
pub async fn set_quantity<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
    Path(product_id): Path<String>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<StatusCode, ApiError> {
    let product_id = parse_product_id(&product_id)?;
    state
        .shop
        .set_cart_quantity(identity.user_id(), product_id, req.quantity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/cart/items/:product_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
    Path(product_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id = parse_product_id(&product_id)?;
    state
        .shop
        .remove_item(identity.user_id(), product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/cart/clear
#[tracing::instrument(skip(state))]
pub async fn clear<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
) -> Result<StatusCode, ApiError> {
    state.shop.clear_cart(identity.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid product_id: {e}")))
}
