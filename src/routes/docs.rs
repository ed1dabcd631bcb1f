use axum::Json;
use utoipa::OpenApi;

use crate::dto::{
    automation_dto::{LaunchPayload, LaunchSummary},
    scan_dto::{FramePayload, PermissionPayload},
    user_dto::{CreateUserPayload, UpdateUserPayload, UserResponse, UserStatsResponse},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::users::list_users,
        crate::routes::users::create_user,
        crate::routes::users::update_user,
        crate::routes::users::delete_user,
        crate::routes::users::toggle_user,
        crate::routes::users::clear_users,
        crate::routes::users::user_stats,
        crate::routes::users::refresh_users,
        crate::routes::scan::set_permission,
        crate::routes::scan::start_scan,
        crate::routes::scan::submit_frame,
        crate::routes::scan::scan_state,
        crate::routes::automation::launch,
        crate::routes::automation::automation_status,
        crate::routes::automation::retry,
        crate::routes::automation::quick_launch,
    ),
    components(schemas(
        CreateUserPayload,
        UpdateUserPayload,
        UserResponse,
        UserStatsResponse,
        PermissionPayload,
        FramePayload,
        LaunchPayload,
        LaunchSummary,
    ))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
