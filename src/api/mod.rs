//! API layer - HTTP handlers and routing
//!
//! This module contains every HTTP endpoint of the blog:
//! - User management API (`/api/auth/users`)
//! - Blog post API (`/api/blog`)
//! - Server-rendered pages (`/`, `/blog/`)
//! - Admin panel (`/admin`)
//! - Health check and static files

pub mod admin;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod responses;
pub mod users;

use axum::{extract::State, middleware as axum_middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::{predicate::SizeAbove, CompressionLayer},
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;

pub use error::{ApiError, ErrorReport};
pub use middleware::AppState;

/// Minimum body size before responses are gzipped
const COMPRESSION_MIN_SIZE: u16 = 1000;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = state.pool.ping().await {
        tracing::error!("Health check failed: {:#}", e);
        return Err(ApiError::service_unavailable("Database is not reachable"));
    }
    Ok(Json(json!({ "status": "ok" })))
}

/// Routes without middleware
pub fn build_routes(config: &Config) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(users::router())
        .merge(posts::router())
        .merge(pages::router())
        .merge(admin::router())
        .nest_service("/static", ServeDir::new(&config.paths.static_dir))
}

/// Build the complete router with middleware
///
/// Production mode adds CORS, HTTPS redirect, trusted hosts and the CSRF
/// flag check.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let production = config.is_production();

    let mut app = build_routes(config)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .layer(axum_middleware::from_fn(middleware::htmx));

    if production {
        let allowed_hosts = Arc::new(config.security.allowed_hosts.clone());
        app = app
            .layer(axum_middleware::from_fn(middleware::csrf_guard))
            .layer(axum_middleware::from_fn_with_state(
                allowed_hosts,
                middleware::trusted_host,
            ));
        if config.security.https_redirect {
            app = app.layer(axum_middleware::from_fn(middleware::https_redirect));
        }
    }

    app = app
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            error::negotiate_errors,
        ));

    if production {
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true);
        app = app.layer(cors);
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CompressionLayer::new()
                    .gzip(true)
                    .compress_when(SizeAbove::new(COMPRESSION_MIN_SIZE)),
            ),
    )
    .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtectedSecret;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::{CreatePostInput, CreateUserInput, UpdateUserInput};
    use crate::render::Renderer;
    use crate::services::SECRET_KEY_USERNAME;
    use axum::http::{header, HeaderName, HeaderValue, StatusCode};
    use axum_test::{TestRequest, TestServer};

    const SECRET: &str = "Sup3rSecretKey";

    fn test_config(debug: bool, allowed_hosts: &[&str]) -> Config {
        let mut config = Config::default();
        config.debug = debug;
        config.security.secret_key = Some(ProtectedSecret::new(SECRET).unwrap());
        config.security.allowed_hosts = allowed_hosts.iter().map(|h| h.to_string()).collect();
        config.security.https_redirect = false;
        config
    }

    async fn setup_with(config: Config) -> (TestServer, AppState) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let renderer = Renderer::new(None).expect("Failed to load templates");
        let state = AppState::new(pool, &config, renderer);
        let server = TestServer::new(build_router(state.clone(), &config)).unwrap();
        (server, state)
    }

    async fn setup() -> (TestServer, AppState) {
        setup_with(test_config(true, &["*"])).await
    }

    fn with_credentials(request: TestRequest, username: &'static str, password: &'static str) -> TestRequest {
        request
            .add_header(
                HeaderName::from_static(middleware::USERNAME_HEADER),
                HeaderValue::from_static(username),
            )
            .add_header(
                HeaderName::from_static(middleware::PASSWORD_HEADER),
                HeaderValue::from_static(password),
            )
    }

    fn as_admin(request: TestRequest) -> TestRequest {
        with_credentials(request, SECRET_KEY_USERNAME, SECRET)
    }

    fn wants_json(request: TestRequest) -> TestRequest {
        request.add_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    fn session_token(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix("session="))
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (server, _) = setup().await;
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_unknown_route_negotiates_format() {
        let (server, _) = setup().await;

        let response = wants_json(server.get("/does-not-exist")).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({"status_code": 404, "detail": "Not Found"})
        );

        let response = server.get("/does-not-exist").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        let body = response.text();
        assert!(body.contains("404"));
        assert!(body.contains("Not Found"));
    }

    #[tokio::test]
    async fn test_method_not_allowed_is_wrapped() {
        let (server, _) = setup().await;
        let response = wants_json(server.put("/health")).await;
        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.json::<Value>()["detail"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn test_users_api_requires_admin() {
        let (server, state) = setup().await;

        let response = wants_json(server.get("/api/auth/users")).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

        state
            .users
            .create_user(CreateUserInput::new("reader", "readerpass1"))
            .await
            .unwrap();
        let response = wants_json(with_credentials(server.get("/api/auth/users"), "reader", "readerpass1")).await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["detail"], "Admin privileges required");

        let response = wants_json(with_credentials(server.get("/api/auth/users"), "reader", "wrongpass")).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["detail"], "Invalid username or password");
    }

    #[tokio::test]
    async fn test_users_api_crud() {
        let (server, _) = setup().await;

        let response = as_admin(server.post("/api/auth/users"))
            .json(&json!({"username": "alice", "password": "password123", "email": "alice@example.com"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let created = response.json::<Value>();
        assert_eq!(created["username"], "alice");
        assert_eq!(created["is_superuser"], false);
        assert!(created.get("password").is_none());
        assert!(created.get("password_hash").is_none());
        let id = created["id"].as_i64().unwrap();

        let response = as_admin(server.post("/api/auth/users"))
            .json(&json!({"username": "alice", "password": "password123"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = as_admin(server.patch(&format!("/api/auth/users/{}", id)))
            .json(&json!({"full_name": "Alice Doe"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["full_name"], "Alice Doe");

        let response = wants_json(as_admin(server.delete(&format!("/api/auth/users/{}", id)))).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.json::<Value>()["message"],
            format!("User with ID {} deleted successfully", id)
        );

        let response = wants_json(as_admin(server.get(&format!("/api/auth/users/{}", id)))).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["detail"], "User not found");
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_validation_error() {
        let (server, _) = setup().await;
        let response = as_admin(server.post("/api/auth/users"))
            .json(&json!({"username": "bob"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["detail"], "Invalid input data. Please check your request.");
        assert!(body["context"]["error_detail"].is_array());
    }

    #[tokio::test]
    async fn test_blog_api_public_reads() {
        let (server, _) = setup().await;

        let response = server.get("/api/blog/").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!([]));

        let response = wants_json(server.get("/api/blog/999")).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["detail"], "Post not found");

        let response = server.post("/api/blog/").json(&json!({"title": "x", "content": "y"})).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_blog_api_create_publish_delete() {
        let (server, _) = setup().await;

        let response = as_admin(server.post("/api/blog/"))
            .json(&json!({"title": "Hello World", "content": "First post", "post_metadata": {"tags": ["intro"]}}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let post = response.json::<Value>();
        assert_eq!(post["post_status"], "DRAFT");
        assert_eq!(post["user_id"], Value::Null);
        let id = post["id"].as_i64().unwrap();

        let response = as_admin(server.post(&format!("/api/blog/{}/publish", id))).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["post_status"], "PUBLISHED");

        let response = as_admin(server.delete(&format!("/api/blog/{}", id))).await;
        assert_eq!(
            response.json::<Value>()["message"],
            format!("Post with ID {} deleted successfully", id)
        );

        let response = wants_json(as_admin(server.delete(&format!("/api/blog/{}", id)))).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blog_pages() {
        let (server, state) = setup().await;
        let post = state
            .posts
            .create_post(CreatePostInput::new("Rendered Title", "Body text"), None)
            .await
            .unwrap();

        let page = server.get("/blog/").await;
        assert_eq!(page.status_code(), StatusCode::OK);
        assert!(page.text().contains("<html"));
        assert!(page.text().contains("Rendered Title"));

        let fragment = server
            .get("/blog/")
            .add_header(HeaderName::from_static("hx-request"), HeaderValue::from_static("true"))
            .await;
        assert_eq!(fragment.status_code(), StatusCode::OK);
        assert!(!fragment.text().contains("<html"));
        assert!(fragment.text().contains("Rendered Title"));

        let single = server.get(&format!("/blog/{}", post.id)).await;
        assert_eq!(single.status_code(), StatusCode::OK);
        assert!(single.text().contains("Body text"));

        let missing = server.get("/blog/4242").await;
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert!(missing.text().contains("Post not found"));

        let home = server.get("/").await;
        assert_eq!(home.status_code(), StatusCode::OK);
        assert!(home.text().contains(r#"href="/static/css/styles.css""#));
    }

    #[tokio::test]
    async fn test_admin_redirects_anonymous_to_login() {
        let (server, state) = setup().await;

        let response = server.get("/admin/").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/admin/login");

        state
            .users
            .create_user(CreateUserInput::new("reader", "readerpass1"))
            .await
            .unwrap();
        let response = with_credentials(server.get("/admin/"), "reader", "readerpass1").await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

        let response = server.get("/admin/login").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_login_flow() {
        let (server, state) = setup().await;
        state
            .users
            .create_user(CreateUserInput::new("alice", "password123").superuser())
            .await
            .unwrap();
        state
            .users
            .create_user(CreateUserInput::new("reader", "readerpass1"))
            .await
            .unwrap();

        let response = server
            .post("/admin/login")
            .form(&[("username", "reader"), ("password", "readerpass1")])
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(response.text().contains("User does not exist or is not an admin"));

        let response = server
            .post("/admin/login")
            .form(&[("username", "alice"), ("password", "wrong-password")])
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(response.text().contains("Invalid username or password"));

        let response = server
            .post("/admin/login")
            .form(&[("username", "alice"), ("password", "password123")])
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/admin/");
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        let token = session_token(&set_cookie);
        assert!(!token.is_empty());

        let cookie = HeaderValue::from_str(&format!("session={}", token)).unwrap();
        let dashboard = server.get("/admin/").add_header(header::COOKIE, cookie.clone()).await;
        assert_eq!(dashboard.status_code(), StatusCode::OK);
        assert!(dashboard.text().contains("Hello alice!"));
        assert!(dashboard.text().contains("Go to frontend"));
        assert!(dashboard.text().contains("0 draft, 0 published"));

        let users = server.get("/admin/users/").add_header(header::COOKIE, cookie.clone()).await;
        assert_eq!(users.status_code(), StatusCode::OK);
        assert!(users.text().contains("reader"));
        assert!(!users.text().contains("argon2"));

        let logout = server.post("/admin/logout").add_header(header::COOKIE, cookie.clone()).await;
        assert_eq!(logout.status_code(), StatusCode::SEE_OTHER);
        assert!(logout.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        let after = server.get("/admin/").add_header(header::COOKIE, cookie).await;
        assert_eq!(after.status_code(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_admin_user_edit_keeps_password_when_blank() {
        let (server, state) = setup().await;
        let user = state
            .users
            .create_user(CreateUserInput::new("carol", "password123"))
            .await
            .unwrap();
        let permission = state
            .permissions
            .create(crate::models::PermissionInput::new("posts:write", None))
            .await
            .unwrap();

        let permission_id = permission.id.to_string();
        let response = as_admin(server.post(&format!("/admin/users/{}/edit", user.id)))
            .form(&[
                ("username", "carol"),
                ("email", ""),
                ("full_name", "Carol"),
                ("password", ""),
                ("is_active", "true"),
                ("permissions", permission_id.as_str()),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

        let verified = state.users.verify_credentials("carol", "password123").await.unwrap();
        assert_eq!(verified.unwrap().full_name.as_deref(), Some("Carol"));
        let granted = state.users.permissions_for(user.id).await.unwrap();
        assert_eq!(granted.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_user_form_unknown_permission_writes_nothing() {
        let (server, state) = setup().await;

        let response = as_admin(server.post("/admin/users/new"))
            .form(&[
                ("username", "dave"),
                ("email", ""),
                ("full_name", ""),
                ("password", "password123"),
                ("is_active", "true"),
                ("permissions", "999"),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(response.text().contains("Permission with ID 999 does not exist"));
        assert_eq!(state.users.count().await.unwrap(), 0);

        let user = state
            .users
            .create_user(CreateUserInput::new("erin", "password123"))
            .await
            .unwrap();
        let response = as_admin(server.post(&format!("/admin/users/{}/edit", user.id)))
            .form(&[
                ("username", "erin"),
                ("email", ""),
                ("full_name", "Erin Renamed"),
                ("password", ""),
                ("is_active", "true"),
                ("permissions", "999"),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let stored = state.users.get_user(user.id).await.unwrap();
        assert_eq!(stored.full_name, None);
    }

    #[tokio::test]
    async fn test_demoted_admin_session_is_revoked() {
        let (server, state) = setup().await;
        let user = state
            .users
            .create_user(CreateUserInput::new("alice", "password123").superuser())
            .await
            .unwrap();

        let response = server
            .post("/admin/login")
            .form(&[("username", "alice"), ("password", "password123")])
            .await;
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        let cookie = HeaderValue::from_str(&format!("session={}", session_token(&set_cookie))).unwrap();

        let before = wants_json(server.get("/api/auth/users"))
            .add_header(header::COOKIE, cookie.clone())
            .await;
        assert_eq!(before.status_code(), StatusCode::OK);

        state
            .users
            .update_user(
                user.id,
                UpdateUserInput {
                    is_superuser: Some(false),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let api = wants_json(server.get("/api/auth/users"))
            .add_header(header::COOKIE, cookie.clone())
            .await;
        assert_eq!(api.status_code(), StatusCode::UNAUTHORIZED);

        let panel = server.get("/admin/").add_header(header::COOKIE, cookie).await;
        assert_eq!(panel.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(panel.headers()[header::LOCATION], "/admin/login");
    }

    #[tokio::test]
    async fn test_admin_post_form_validation() {
        let (server, state) = setup().await;

        let response = as_admin(server.post("/admin/posts/new"))
            .form(&[
                ("title", ""),
                ("content", "body"),
                ("post_status", "DRAFT"),
                ("post_metadata", ""),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(state.posts.count().await.unwrap(), 0);

        let response = as_admin(server.post("/admin/posts/new"))
            .form(&[
                ("title", "Admin post"),
                ("content", "body"),
                ("post_status", "PUBLISHED"),
                ("post_metadata", r#"{"source": "admin"}"#),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        let posts = state.posts.list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].is_published());
    }

    #[tokio::test]
    async fn test_production_csrf_flag() {
        let (server, _) = setup_with(test_config(false, &["*"])).await;

        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("csrf_flag=1"));
        assert!(set_cookie.contains("SameSite=Strict"));

        let response = as_admin(server.post("/api/blog/"))
            .json(&json!({"title": "t", "content": "c"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["detail"], "CSRF flag is missing or invalid.");

        let response = as_admin(server.post("/api/blog/"))
            .add_header(header::COOKIE, HeaderValue::from_static("csrf_flag=1"))
            .json(&json!({"title": "t", "content": "c"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_production_trusted_host() {
        let (server, _) = setup_with(test_config(false, &["example.com", "*.example.org"])).await;

        let response = wants_json(server.get("/health"))
            .add_header(header::HOST, HeaderValue::from_static("evil.com"))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["detail"], "Invalid host header");

        let response = server
            .get("/health")
            .add_header(header::HOST, HeaderValue::from_static("example.com:8000"))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let response = server
            .get("/health")
            .add_header(header::HOST, HeaderValue::from_static("blog.example.org"))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }
}
