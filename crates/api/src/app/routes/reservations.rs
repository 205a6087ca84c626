use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use stockhold_core::ReservationId;
use stockhold_infra::{InventoryStore, PageRequest, WorkflowError};

use crate::app::dto::{
    CreateReservationRequest, CursorParams, PageResponse, ReservationResponse,
    UpdateReservationRequest,
};
use crate::app::errors::{ApiResult, parse_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_reservations).post(create_reservation))
        .route(
            "/:id",
            get(get_reservation)
                .put(update_reservation)
                .patch(update_reservation),
        )
}

/// Purchase: reserve stock and open a 10 minute hold.
pub async fn create_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let reservation = services
        .purchases
        .purchase(body.product, principal.principal(), body.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(ReservationResponse::from(reservation))).into_response())
}

pub async fn get_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let reservation_id: ReservationId = parse_id(&id, "reservation")?;
    let reservation = services
        .store
        .reservation(reservation_id)
        .await
        .map_err(WorkflowError::from)?
        .ok_or(WorkflowError::ReservationNotFound(reservation_id))?;
    Ok(Json(ReservationResponse::from(reservation)).into_response())
}

pub async fn update_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateReservationRequest>, JsonRejection>,
) -> ApiResult {
    let reservation_id: ReservationId = parse_id(&id, "reservation")?;
    let Json(body) = body?;
    let reservation = services
        .reservations
        .adjust(reservation_id, body.quantity, principal.principal())
        .await?;
    Ok(Json(ReservationResponse::from(reservation)).into_response())
}

pub async fn list_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<CursorParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let request = PageRequest::reservations(params.cursor()?.as_ref())?;
    let page = services
        .store
        .reservations(request)
        .await
        .map_err(WorkflowError::from)?;
    Ok(Json(PageResponse::from_page(page, ReservationResponse::from)).into_response())
}
