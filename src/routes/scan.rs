use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    dto::scan_dto::{FramePayload, PermissionPayload},
    error::Result,
    services::qr_service::CameraPermission,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/scan/permission",
    request_body = PermissionPayload,
    responses((status = 200, description = "Scanner state after the permission outcome"))
)]
#[axum::debug_handler]
pub async fn set_permission(
    State(state): State<AppState>,
    Json(payload): Json<PermissionPayload>,
) -> impl IntoResponse {
    let permission = if payload.granted {
        CameraPermission::Granted
    } else {
        CameraPermission::Denied
    };
    Json(state.scan_service.set_permission(permission))
}

#[utoipa::path(
    post,
    path = "/api/scan/start",
    responses(
        (status = 200, description = "Scanning"),
        (status = 503, description = "Camera permission missing")
    )
)]
#[axum::debug_handler]
pub async fn start_scan(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.scan_service.start()?))
}

#[utoipa::path(
    post,
    path = "/api/scan/frames",
    request_body = FramePayload,
    responses(
        (status = 202, description = "Frame queued for analysis"),
        (status = 400, description = "Malformed frame")
    )
)]
#[axum::debug_handler]
pub async fn submit_frame(
    State(state): State<AppState>,
    Json(payload): Json<FramePayload>,
) -> Result<impl IntoResponse> {
    let frame = payload.into_frame()?;
    Ok((StatusCode::ACCEPTED, Json(state.scan_service.submit_frame(frame))))
}

#[utoipa::path(
    get,
    path = "/api/scan",
    responses((status = 200, description = "Current scanner state"))
)]
#[axum::debug_handler]
pub async fn scan_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scan_service.state())
}
