use axum::{Router, routing::post};

pub mod audit;
pub mod orders;
pub mod products;
pub mod reservations;
pub mod system;

/// Router for all resource endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/reservations", reservations::router())
        .nest("/orders", orders::router())
        .nest("/audit", audit::router())
        .route("/maintenance/reclaim-expired", post(system::reclaim_expired))
}
