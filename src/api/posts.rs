//! Blog post API
//!
//! Reads are public. Writes require the admin scope.

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};

use super::error::ApiError;
use super::extract::{CurrentUser, ValidJson, ValidPath};
use super::middleware::{require_admin, AppState};
use super::responses::{MessageResponse, PostRead};
use crate::models::{CreatePostInput, UpdatePostInput};

pub fn router() -> Router<AppState> {
    let admin_routes = Router::new()
        .route("/api/blog/", post(create_post))
        .route("/api/blog/{id}", axum::routing::patch(update_post).delete(delete_post))
        .route("/api/blog/{id}/publish", post(publish_post))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/api/blog/", get(list_posts))
        .route("/api/blog/{id}", get(get_post))
        .merge(admin_routes)
}

/// GET /api/blog/
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<PostRead>>, ApiError> {
    let posts = state.posts.list_posts().await?;
    Ok(Json(posts.into_iter().map(PostRead::from).collect()))
}

/// GET /api/blog/{id}
pub async fn get_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<PostRead>, ApiError> {
    Ok(Json(state.posts.get_post(id).await?.into()))
}

/// POST /api/blog/
///
/// The author is the authenticated database user; posts created with the
/// shared secret have none.
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(input): ValidJson<CreatePostInput>,
) -> Result<Json<PostRead>, ApiError> {
    let post = state.posts.create_post(input, user.user_id()).await?;
    Ok(Json(post.into()))
}

/// PATCH /api/blog/{id}
pub async fn update_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
    ValidJson(input): ValidJson<UpdatePostInput>,
) -> Result<Json<PostRead>, ApiError> {
    Ok(Json(state.posts.update_post(id, input).await?.into()))
}

/// POST /api/blog/{id}/publish
pub async fn publish_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<PostRead>, ApiError> {
    Ok(Json(state.posts.publish_post(id).await?.into()))
}

/// DELETE /api/blog/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.posts.delete_post(id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Post with ID {} deleted successfully",
        id
    ))))
}
