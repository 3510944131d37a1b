pub mod auth;
pub mod dto;
pub mod errors;
pub mod extract;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::context::AppContext;
use handlers::ApiDoc;

pub fn router(ctx: AppContext) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/sensors/readings",
            get(handlers::get_readings).post(handlers::post_reading),
        )
        .route("/sensors/data", post(handlers::post_sensor_data))
        .route(
            "/sensors/thresholds",
            get(handlers::get_thresholds)
                .put(handlers::put_thresholds)
                .post(handlers::put_thresholds),
        )
        .route(
            "/sensors/thresholds/history",
            get(handlers::get_threshold_history),
        )
        .route(
            "/sensors/notifications",
            get(handlers::get_notifications).post(handlers::post_notification),
        )
        .route("/admin/stats", get(handlers::admin_stats))
        .route("/health", get(handlers::health))
        .with_state(ctx)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
