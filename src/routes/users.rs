use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use validator::Validate;

use crate::{
    dto::user_dto::{CreateUserPayload, UpdateUserPayload, UserResponse, UserStatsResponse},
    error::{Error, Result},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "Stored accounts", body = [UserResponse]))
)]
#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let users = state.credential_store.list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect::<Vec<_>>()))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserPayload,
    responses(
        (status = 201, description = "Account added", body = UserResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "User ID already stored")
    )
)]
#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<impl IntoResponse> {
    let payload = payload.trimmed();
    payload.validate()?;
    let user_id = payload.user_id.as_str();

    if !state
        .credential_store
        .add(&payload.name, user_id, &payload.password)
        .await?
    {
        return Err(Error::Conflict(format!("User {} already exists", user_id)));
    }
    tracing::info!(user = %user_id, "Account added");

    let user = find(&state, user_id).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    patch,
    path = "/api/users/{user_id}",
    params(("user_id" = String, Path, description = "Login identifier")),
    request_body = UpdateUserPayload,
    responses(
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Account not found")
    )
)]
#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    if !state
        .credential_store
        .update(&user_id, payload.name.trim(), payload.password.as_deref())
        .await?
    {
        return Err(Error::NotFound(format!("User {} not found", user_id)));
    }
    Ok(Json(find(&state, &user_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = String, Path, description = "Login identifier")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 404, description = "Account not found")
    )
)]
#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    if !state.credential_store.delete(&user_id).await? {
        return Err(Error::NotFound(format!("User {} not found", user_id)));
    }
    tracing::info!(user = %user_id, "Account deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/users/{user_id}/toggle",
    params(("user_id" = String, Path, description = "Login identifier")),
    responses(
        (status = 200, description = "Active flag flipped", body = UserResponse),
        (status = 404, description = "Account not found")
    )
)]
#[axum::debug_handler]
pub async fn toggle_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    if !state.credential_store.toggle_active(&user_id).await? {
        return Err(Error::NotFound(format!("User {} not found", user_id)));
    }
    Ok(Json(find(&state, &user_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/users",
    responses(
        (status = 204, description = "All accounts removed"),
        (status = 404, description = "No accounts to clear")
    )
)]
#[axum::debug_handler]
pub async fn clear_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    if state.credential_store.count().await? == 0 {
        return Err(Error::NotFound("No users to clear".to_string()));
    }
    state.credential_store.clear_all().await?;
    tracing::info!("All accounts cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/stats",
    responses((status = 200, description = "Account counts", body = UserStatsResponse))
)]
#[axum::debug_handler]
pub async fn user_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(stats(&state).await?))
}

#[utoipa::path(
    post,
    path = "/api/users/refresh",
    responses((status = 200, description = "Accounts reloaded from storage", body = [UserResponse]))
)]
#[axum::debug_handler]
pub async fn refresh_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let users = state.credential_store.refresh().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect::<Vec<_>>()))
}

pub(crate) async fn stats(state: &AppState) -> Result<UserStatsResponse> {
    Ok(UserStatsResponse {
        total: state.credential_store.count().await?,
        active: state.credential_store.active_count().await?,
    })
}

async fn find(state: &AppState, user_id: &str) -> Result<UserResponse> {
    state
        .credential_store
        .list()
        .await?
        .into_iter()
        .find(|u| u.user_id == user_id)
        .map(UserResponse::from)
        .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))
}
