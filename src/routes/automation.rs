use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    dto::automation_dto::{LaunchPayload, LaunchSummary},
    error::Result,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/launch",
    request_body = LaunchPayload,
    responses(
        (status = 202, description = "Automation run started"),
        (status = 400, description = "Not an http(s) link"),
        (status = 409, description = "A run is already in progress")
    )
)]
#[axum::debug_handler]
pub async fn launch(
    State(state): State<AppState>,
    Json(payload): Json<LaunchPayload>,
) -> Result<impl IntoResponse> {
    let status = state.automation_service.launch(&payload.url).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

#[utoipa::path(
    get,
    path = "/api/automation",
    responses((status = 200, description = "Status of the current or last run"))
)]
#[axum::debug_handler]
pub async fn automation_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.automation_service.status())
}

#[utoipa::path(
    post,
    path = "/api/automation/retry",
    responses(
        (status = 202, description = "Page reload requested"),
        (status = 409, description = "No failed page load to retry")
    )
)]
#[axum::debug_handler]
pub async fn retry(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.automation_service.retry().await?;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    get,
    path = "/launch",
    responses((status = 200, description = "Quick-launch summary", body = LaunchSummary))
)]
#[axum::debug_handler]
pub async fn quick_launch(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(LaunchSummary {
        users: crate::routes::users::stats(&state).await?,
        scanner: state.scan_service.state(),
        automation: state.automation_service.status(),
    }))
}
