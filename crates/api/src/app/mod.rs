//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and workflow wiring
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and query-string parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let resources = routes::router().layer(axum::middleware::from_fn(
        middleware::principal_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(resources)
        .layer(Extension(services))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::middleware::REQUEST_ID_HEADER;

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_echoes_inbound_request_id() {
        let app = build_app(Arc::new(AppServices::in_memory()));
        let res = app
            .oneshot(
                Request::get("/health")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[REQUEST_ID_HEADER], "req-42");
        let body = body_json(res).await;
        assert_eq!(body["request_id"], "req-42");
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn errors_carry_a_generated_request_id() {
        let app = build_app(Arc::new(AppServices::in_memory()));
        let res = app
            .oneshot(
                Request::get("/orders/not-an-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let header = res.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        let body = body_json(res).await;
        assert_eq!(body["request_id"], header.as_str());
        assert_eq!(body["error"], "invalid_id");
    }
}
