//! API middleware
//!
//! Contains the shared application state and middleware for:
//! - Authentication (session cookie or credential headers)
//! - Authorization (admin scope for the API and the admin panel)
//! - CSRF flag cookie, trusted hosts and HTTPS redirect in production
//! - htmx request detection

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use super::error::ApiError;
use crate::config::Config;
use crate::db::repositories::{
    SqlxPermissionRepository, SqlxPostRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::Authentication;
use crate::render::Renderer;
use crate::services::{AuthBackend, AuthError, PermissionService, PostService, UserService};

pub const SESSION_COOKIE: &str = "session";
pub const CSRF_COOKIE: &str = "csrf_flag";
pub const USERNAME_HEADER: &str = "authorization-username";
pub const PASSWORD_HEADER: &str = "authorization-password";
const CSRF_COOKIE_MAX_AGE: i64 = 86_400;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub users: Arc<UserService>,
    pub permissions: Arc<PermissionService>,
    pub posts: Arc<PostService>,
    pub auth: Arc<AuthBackend>,
    pub renderer: Arc<Renderer>,
    /// Mark cookies `Secure`. On in production.
    pub secure_cookies: bool,
}

impl AppState {
    /// Wire repositories and services on top of `pool`.
    pub fn new(pool: DynDatabasePool, config: &Config, renderer: Renderer) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let permission_repo = SqlxPermissionRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());

        let users = Arc::new(UserService::new(
            user_repo,
            permission_repo.clone(),
            session_repo.clone(),
        ));
        let auth = Arc::new(AuthBackend::new(
            users.clone(),
            session_repo,
            config.security.secret_key.clone(),
            config.security.session_max_age_days,
        ));

        Self {
            pool,
            users,
            permissions: Arc::new(PermissionService::new(permission_repo)),
            posts: Arc::new(PostService::new(post_repo)),
            auth,
            renderer: Arc::new(renderer),
            secure_cookies: config.is_production(),
        }
    }
}

/// Whether the request was issued by htmx
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HtmxRequest(pub bool);

/// Read a cookie value from the `Cookie` header
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Set-Cookie` value for a new admin session
pub fn session_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Authentication middleware
///
/// Attaches an [`Authentication`] to every request. Anonymous requests pass
/// through; header credentials that fail verification are rejected with 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let token = cookie_value(headers, SESSION_COOKIE);
    let username = header_str(headers, USERNAME_HEADER);
    let password = header_str(headers, PASSWORD_HEADER);

    let auth = match state
        .auth
        .authenticate(token.as_deref(), username, password)
        .await
    {
        Ok(auth) => auth,
        Err(AuthError::InvalidCredentials) => {
            return Err(ApiError::unauthorized("Invalid username or password"))
        }
        Err(e) => return Err(e.into()),
    };

    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}

fn request_auth(request: &Request) -> Authentication {
    request
        .extensions()
        .get::<Authentication>()
        .cloned()
        .unwrap_or_default()
}

/// Admin authorization middleware for API routes
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let auth = request_auth(&request);
    if !auth.is_authenticated() {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    if !auth.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }
    Ok(next.run(request).await)
}

/// Admin authorization for the admin panel. Anonymous visitors are sent to
/// the login page.
pub async fn require_admin_page(request: Request, next: Next) -> Result<Response, ApiError> {
    let auth = request_auth(&request);
    if !auth.is_authenticated() {
        return Ok(Redirect::to("/admin/login").into_response());
    }
    if !auth.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }
    Ok(next.run(request).await)
}

/// CSRF flag middleware
///
/// Unsafe methods must carry the `csrf_flag` cookie. Responses to requests
/// without it set the cookie.
pub async fn csrf_guard(request: Request, next: Next) -> Result<Response, ApiError> {
    let has_flag = cookie_value(request.headers(), CSRF_COOKIE).is_some();

    if request.method() != Method::GET && !has_flag {
        tracing::warn!(
            "CSRF flag missing for {} {}",
            request.method(),
            request.uri().path()
        );
        return Err(ApiError::forbidden("CSRF flag is missing or invalid."));
    }

    let mut response = next.run(request).await;
    if !has_flag {
        let cookie = format!(
            "{}=1; Max-Age={}; Path=/; SameSite=Strict; Secure; HttpOnly",
            CSRF_COOKIE, CSRF_COOKIE_MAX_AGE
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

/// Record whether the request came from htmx
pub async fn htmx(mut request: Request, next: Next) -> Response {
    let is_htmx = header_str(request.headers(), "hx-request")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    request.extensions_mut().insert(HtmxRequest(is_htmx));
    next.run(request).await
}

/// Reject requests whose `Host` is not in the allowed list
pub async fn trusted_host(
    State(allowed): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or("");

    if !host_allowed(host, &allowed) {
        return Err(ApiError::bad_request("Invalid host header"));
    }
    Ok(next.run(request).await)
}

/// Match a host (port ignored) against `ALLOWED_HOSTS` patterns
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    let host = strip_port(host).to_ascii_lowercase();
    allowed.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*" {
            true
        } else if let Some(domain) = pattern.strip_prefix("*.") {
            host.ends_with(&format!(".{}", domain))
        } else {
            host == pattern
        }
    })
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return host.split_once(']').map_or(host, |(addr, _)| &host[..addr.len() + 1]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

/// Redirect plain HTTP to HTTPS with a 307
pub async fn https_redirect(request: Request, next: Next) -> Response {
    let scheme = header_str(request.headers(), "x-forwarded-proto")
        .map(|s| s.split(',').next().unwrap_or("").trim().to_ascii_lowercase())
        .or_else(|| request.uri().scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());

    if scheme == "http" || scheme == "ws" {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let host = match host.rsplit_once(':') {
            Some((name, "80")) => name,
            _ => host,
        };
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let location = format!("https://{}{}", host, path);
        return match HeaderValue::from_str(&location) {
            Ok(value) => (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, value)]).into_response(),
            Err(_) => ApiError::bad_request("Invalid host header").into_response(),
        };
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn headers_with_cookie(cookie: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        headers
    }

    #[test]
    fn test_cookie_value() {
        let headers = headers_with_cookie("theme=dark; session=abc-123; csrf_flag=1");
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("abc-123"));
        assert_eq!(cookie_value(&headers, "csrf_flag").as_deref(), Some("1"));
        assert_eq!(cookie_value(&headers, "missing"), None);
        assert_eq!(cookie_value(&HeaderMap::new(), "session"), None);
    }

    #[test]
    fn test_cookie_value_exact_name() {
        let headers = headers_with_cookie("mysession=nope");
        assert_eq!(cookie_value(&headers, "session"), None);
    }

    #[test]
    fn test_session_cookie() {
        let cookie = session_cookie("tok", 604_800, true);
        assert_eq!(
            cookie,
            "session=tok; Max-Age=604800; Path=/; HttpOnly; SameSite=Lax; Secure"
        );
        assert!(!session_cookie("tok", 10, false).contains("Secure"));
        assert!(clear_session_cookie(false).starts_with("session=; Max-Age=0"));
    }

    #[test]
    fn test_host_allowed() {
        let allowed = vec!["example.com".to_string(), "*.blog.dev".to_string()];
        assert!(host_allowed("example.com", &allowed));
        assert!(host_allowed("EXAMPLE.com:8000", &allowed));
        assert!(host_allowed("www.blog.dev", &allowed));
        assert!(!host_allowed("blog.dev", &allowed));
        assert!(!host_allowed("evil.com", &allowed));
        assert!(host_allowed("anything", &["*".to_string()]));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("localhost:8000"), "localhost");
        assert_eq!(strip_port("localhost"), "localhost");
        assert_eq!(strip_port("[::1]:8000"), "[::1]");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn property_wildcard_matches_subdomains_only(
            sub in "[a-z]{1,10}",
            domain in "[a-z]{1,10}\\.[a-z]{2,3}",
            port in 1u16..,
        ) {
            let allowed = vec![format!("*.{}", domain)];
            let subdomain = format!("{}.{}", sub, domain);
            let with_port = format!("{}:{}", subdomain, port);
            prop_assert!(host_allowed(&subdomain, &allowed));
            prop_assert!(host_allowed(&with_port, &allowed));
            prop_assert!(!host_allowed(&domain, &allowed));
        }

        #[test]
        fn property_exact_host_ignores_port_and_case(
            host in "[a-z]{1,10}\\.[a-z]{2,3}",
            port in 1u16..,
        ) {
            let allowed = vec![host.clone()];
            let shouted = format!("{}:{}", host.to_uppercase(), port);
            let other = format!("x{}", host);
            prop_assert!(host_allowed(&shouted, &allowed));
            prop_assert!(!host_allowed(&other, &allowed));
        }
    }
}
