pub mod automation;
pub mod docs;
pub mod health;
pub mod scan;
pub mod users;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::middleware::cors::api_cors;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let user_api = Router::new()
        .route(
            "/api/users",
            get(users::list_users)
                .post(users::create_user)
                .delete(users::clear_users),
        )
        .route("/api/users/stats", get(users::user_stats))
        .route("/api/users/refresh", post(users::refresh_users))
        .route(
            "/api/users/:user_id",
            patch(users::update_user).delete(users::delete_user),
        )
        .route("/api/users/:user_id/toggle", post(users::toggle_user));

    let scan_api = Router::new()
        .route("/api/scan", get(scan::scan_state))
        .route("/api/scan/permission", post(scan::set_permission))
        .route("/api/scan/start", post(scan::start_scan))
        .route("/api/scan/frames", post(scan::submit_frame));

    let automation_api = Router::new()
        .route("/api/launch", post(automation::launch))
        .route("/api/automation", get(automation::automation_status))
        .route("/api/automation/retry", post(automation::retry))
        .route("/launch", get(automation::quick_launch));

    Router::new()
        .route("/health", get(health::health))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        .merge(user_api)
        .merge(scan_api)
        .merge(automation_api)
        .with_state(state)
        .layer(api_cors())
}
