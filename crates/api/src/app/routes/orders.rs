use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use stockhold_core::OrderId;
use stockhold_infra::{InventoryStore, OrderPatch, WorkflowError};
use stockhold_sales::OrderStatus;

use crate::app::dto::{
    CreateOrderRequest, OrderListParams, OrderResponse, PageResponse, UpdateOrderRequest,
};
use crate::app::errors::{ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(update_order).patch(update_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let order = services
        .orders
        .place_order(body.product, principal.principal(), body.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = services
        .store
        .order(order_id)
        .await
        .map_err(WorkflowError::from)?
        .ok_or(WorkflowError::OrderNotFound(order_id))?;
    Ok(Json(OrderResponse::from(order)).into_response())
}

/// Edit quantity and/or status. `total` is recomputed; a submitted total is ignored.
pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> ApiResult {
    let order_id: OrderId = parse_id(&id, "order")?;
    let Json(body) = body?;
    let status = body
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let patch = OrderPatch {
        quantity: body.quantity,
        status,
    };
    let order = services
        .orders
        .update_order(order_id, patch, principal.principal())
        .await?;
    Ok(Json(OrderResponse::from(order)).into_response())
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<OrderListParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let query = params.to_query()?;
    let page = services
        .store
        .orders(&query)
        .await
        .map_err(WorkflowError::from)?;
    Ok(Json(PageResponse::from_page(page, OrderResponse::from)).into_response())
}
