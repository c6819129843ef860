//! User management API
//!
//! Every route requires the admin scope.

use axum::{
    extract::State,
    middleware,
    routing::get,
    Json, Router,
};

use super::error::ApiError;
use super::extract::{ValidJson, ValidPath};
use super::middleware::{require_admin, AppState};
use super::responses::{MessageResponse, UserRead};
use crate::models::{CreateUserInput, UpdateUserInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/users", get(list_users).post(create_user))
        .route(
            "/api/auth/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn(require_admin))
}

/// POST /api/auth/users
pub async fn create_user(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<CreateUserInput>,
) -> Result<Json<UserRead>, ApiError> {
    let user = state.users.create_user(input).await?;
    Ok(Json(user.into()))
}

/// GET /api/auth/users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserRead>>, ApiError> {
    let users = state.users.list_users().await?;
    Ok(Json(users.into_iter().map(UserRead::from).collect()))
}

/// GET /api/auth/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<UserRead>, ApiError> {
    Ok(Json(state.users.get_user(id).await?.into()))
}

/// PATCH /api/auth/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(input): ValidJson<UpdateUserInput>,
) -> Result<Json<UserRead>, ApiError> {
    Ok(Json(state.users.update_user(id, input).await?.into()))
}

/// DELETE /api/auth/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.users.delete_user(id).await?;
    Ok(Json(MessageResponse::new(format!(
        "User with ID {} deleted successfully",
        id
    ))))
}
