//! Server-rendered pages

use axum::{
    extract::State,
    http::Uri,
    response::Html,
    routing::get,
    Router,
};

use super::error::ApiError;
use super::extract::{Auth, Htmx, ValidPath};
use super::middleware::AppState;
use super::responses::PostRead;
use crate::render::PageContext;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/blog/", get(blog))
        .route("/blog/{id}", get(single_blog))
}

/// GET /
pub async fn home(
    State(state): State<AppState>,
    Auth(auth): Auth,
    Htmx(is_htmx): Htmx,
    uri: Uri,
) -> Result<Html<String>, ApiError> {
    let ctx = PageContext::new(uri.path(), is_htmx, &auth).into_context();
    Ok(Html(state.renderer.render("pages/home.html", &ctx)?))
}

/// GET /blog/
///
/// htmx requests receive only the post list fragment.
pub async fn blog(
    State(state): State<AppState>,
    Auth(auth): Auth,
    Htmx(is_htmx): Htmx,
    uri: Uri,
) -> Result<Html<String>, ApiError> {
    let posts: Vec<PostRead> = state
        .posts
        .list_posts()
        .await?
        .into_iter()
        .map(PostRead::from)
        .collect();

    let mut ctx = PageContext::new(uri.path(), is_htmx, &auth).into_context();
    ctx.insert("posts", &posts);

    let template = if is_htmx {
        "pages/blog/_posts.html"
    } else {
        "pages/blog/blog.html"
    };
    Ok(Html(state.renderer.render(template, &ctx)?))
}

/// GET /blog/{id}
pub async fn single_blog(
    State(state): State<AppState>,
    Auth(auth): Auth,
    Htmx(is_htmx): Htmx,
    ValidPath(id): ValidPath<i64>,
    uri: Uri,
) -> Result<Html<String>, ApiError> {
    let post = PostRead::from(state.posts.get_post(id).await?);

    let mut ctx = PageContext::new(uri.path(), is_htmx, &auth).into_context();
    ctx.insert("post", &post);
    Ok(Html(state.renderer.render("pages/blog/single_blog.html", &ctx)?))
}
