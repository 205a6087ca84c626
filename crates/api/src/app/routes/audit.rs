use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::QueryRejection},
    response::IntoResponse,
    routing::get,
};

use stockhold_infra::{InventoryStore, WorkflowError};

use crate::app::dto::{AuditListParams, PageResponse};
use crate::app::errors::ApiResult;
use crate::app::services::AppServices;

/// Read-only: the trail is written by workflows alone.
pub fn router() -> Router {
    Router::new().route("/", get(list_audit_entries))
}

pub async fn list_audit_entries(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<AuditListParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let query = params.to_query()?;
    let page = services
        .store
        .audit_entries(&query)
        .await
        .map_err(WorkflowError::from)?;
    Ok(Json(PageResponse::from_page(page, |entry| entry)).into_response())
}
