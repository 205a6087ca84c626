use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use stockhold_core::ProductId;
use stockhold_infra::{InventoryStore, PageRequest, WorkflowError};
use stockhold_inventory::{NewProduct, ProductPatch};

use crate::app::dto::{CursorParams, PageResponse, ProductResponse};
use crate::app::errors::{ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product).patch(update_product))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let product = services
        .catalog
        .create_product(body, principal.principal())
        .await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let product_id: ProductId = parse_id(&id, "product")?;
    let product = services
        .store
        .product(product_id)
        .await
        .map_err(WorkflowError::from)?
        .ok_or(WorkflowError::ProductNotFound(product_id))?;
    Ok(Json(ProductResponse::from(product)).into_response())
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<ProductPatch>, JsonRejection>,
) -> ApiResult {
    let product_id: ProductId = parse_id(&id, "product")?;
    let Json(patch) = body?;
    let product = services
        .catalog
        .update_product(product_id, patch, principal.principal())
        .await?;
    Ok(Json(ProductResponse::from(product)).into_response())
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<CursorParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let request = PageRequest::products(params.cursor()?.as_ref())?;
    let page = services
        .store
        .products(request)
        .await
        .map_err(WorkflowError::from)?;
    Ok(Json(PageResponse::from_page(page, ProductResponse::from)).into_response())
}
