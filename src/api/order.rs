use crate::api::error::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::api::AppState;
use crate::database::order_repository::{Order, OrderStatus};
use crate::error::AppError;
use crate::orders::OrderDetails;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// GET /api/v1/order/orders
pub async fn my_orders(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_for_user(&caller).await?))
}

/// GET /api/v1/order/all-orders
pub async fn all_orders(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = page.offset.unwrap_or(0);
    Ok(Json(state.orders.list_all(&caller, limit, offset).await?))
}

/// GET /api/v1/order/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetails>, ApiError> {
    Ok(Json(state.orders.get_order(order_id, &caller).await?))
}

/// PATCH /api/v1/order/cancel-order/:order_id
pub async fn cancel_order(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.cancel(order_id, &caller).await?))
}

/// PATCH /api/v1/order/update-order-status/:order_id
pub async fn update_order_status(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(request) = payload.map_err(|e| AppError::invalid_request(e.body_text()))?;
    Ok(Json(
        state
            .orders
            .update_status(order_id, request.status, &caller)
            .await?,
    ))
}
