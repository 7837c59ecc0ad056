//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::OrderSummary;
use chrono::SecondsFormat;
use common::OrderId;
use domain::{Order, OrderLine};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::{AppState, ShopBackend};

// -- Request types --

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub id: String,
    pub status: String,
    pub total_cents: i64,
}

impl From<OrderSummary> for CheckoutResponse {
    fn from(summary: OrderSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            status: summary.status.to_string(),
            total_cents: summary.total.cents(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_cents: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id().to_string(),
            name: line.name().to_string(),
            unit_price_cents: line.unit_price().cents(),
            quantity: line.quantity(),
            line_total_cents: line.line_total().cents(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            lines: order.lines().iter().map(OrderLineResponse::from).collect(),
            total_cents: order.total().cents(),
            created_at: order.created_at().to_rfc3339_opts(SecondsFormat::Micros, true),
            updated_at: order.updated_at().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

// -- Handlers --

/// POST /api/orders/checkout: turn the caller's cart into an order.
#[tracing::instrument(skip(state))]
pub async fn checkout<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let summary = state.shop.checkout(identity.user_id()).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(summary))))
}

/// GET /api/orders/my: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn mine<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.shop.orders_for_user(identity.user_id()).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /api/orders/:id: visible to the owner and to admins.
#[tracing::instrument(skip(state))]
pub async fn get<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.shop.get_order(order_id, identity.0).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /api/orders: every order, admin only.
#[tracing::instrument(skip(state))]
pub async fn list<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    identity.require_admin()?;
    let orders = state.shop.all_orders().await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// PATCH /api/orders/:id/status: admin only.
#[tracing::instrument(skip(state, req))]
pub async fn set_status<B: ShopBackend>(
    State(state): State<Arc<AppState<B>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<StatusCode, ApiError> {
    identity.require_admin()?;
    let order_id = parse_order_id(&id)?;
    state.shop.set_order_status(order_id, &req.status).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}
