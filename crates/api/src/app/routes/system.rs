use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Run one reclamation pass now. Idempotent.
pub async fn reclaim_expired(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let report = services.reservations.reclaim_expired(Utc::now()).await?;
    Ok(Json(report).into_response())
}
