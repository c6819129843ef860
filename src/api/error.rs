//! Error responses
//!
//! Handlers return [`ApiError`]. Its response carries an [`ErrorReport`]
//! extension, and [`negotiate_errors`] turns that report into a log line and
//! a JSON or HTML body chosen from the request's `Content-Type`.

use axum::{
    body::{Body, HttpBody},
    extract::{
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
        Request, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::any::Any;

use super::AppState;
use crate::models::FieldError;
use crate::render::{RenderError, Renderer};
use crate::services::{AuthError, PermissionServiceError, PostServiceError, UserServiceError};

pub const VALIDATION_DETAIL: &str = "Invalid input data. Please check your request.";
const DATABASE_ERROR_CONTEXT: &str = "A database error occurred while processing your request.";

/// Error returned from handlers and middleware
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{detail}")]
    Http { status: StatusCode, detail: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn describe_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApiError {
    pub fn status(status: StatusCode, detail: impl Into<String>) -> Self {
        Self::Http {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, detail)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::SERVICE_UNAVAILABLE, detail)
    }

    /// Build the report describing this error
    pub fn report(&self) -> ErrorReport {
        match self {
            ApiError::Validation(errors) => ErrorReport {
                status: StatusCode::BAD_REQUEST,
                detail: VALIDATION_DETAIL.to_string(),
                context: Some(json!({ "error_detail": errors })),
                kind: ErrorKind::Validation,
                error_name: "ValidationError",
                error_message: describe_fields(errors),
            },
            ApiError::Http { status, detail } => ErrorReport::http(*status, detail),
            ApiError::Internal(err) => {
                let is_database = err.chain().any(|cause| cause.is::<sqlx::Error>());
                let (error_name, context) = if is_database {
                    ("DatabaseError", DATABASE_ERROR_CONTEXT.to_string())
                } else {
                    let name = error_type_name(err);
                    (
                        name,
                        format!("An unexpected server error occurred. (Error type: {})", name),
                    )
                };
                ErrorReport::internal(error_name, context, format!("{:#}", err))
            }
        }
    }
}

/// Name of the innermost recognised error in the chain.
///
/// Ad-hoc `anyhow!` messages have no type of their own and report as
/// `InternalError`.
fn error_type_name(err: &anyhow::Error) -> &'static str {
    err.chain()
        .rev()
        .find_map(known_error_name)
        .unwrap_or("InternalError")
}

fn known_error_name(cause: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    if cause.is::<std::io::Error>() {
        Some("IoError")
    } else if cause.is::<serde_json::Error>() {
        Some("JsonError")
    } else if cause.is::<tera::Error>() {
        Some("TemplateError")
    } else if cause.is::<RenderError>() {
        Some("RenderError")
    } else if cause.is::<std::num::ParseIntError>() {
        Some("ParseIntError")
    } else if cause.is::<chrono::ParseError>() {
        Some("DateParseError")
    } else if cause.is::<uuid::Error>() {
        Some("UuidError")
    } else {
        None
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.report().into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(vec![FieldError::new("body", rejection.body_text())])
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::Validation(vec![FieldError::new("body", rejection.body_text())])
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(vec![FieldError::new("path", rejection.body_text())])
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(vec![FieldError::new("query", rejection.body_text())])
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Validation(errors) => ApiError::Validation(errors),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::Internal(e) => ApiError::Internal(e),
            other @ (UserServiceError::UsernameTaken(_)
            | UserServiceError::EmailTaken(_)
            | UserServiceError::UnknownPermission(_)) => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<PermissionServiceError> for ApiError {
    fn from(err: PermissionServiceError) -> Self {
        match err {
            PermissionServiceError::Validation(errors) => ApiError::Validation(errors),
            PermissionServiceError::NotFound => ApiError::not_found("Permission not found"),
            PermissionServiceError::Internal(e) => ApiError::Internal(e),
            other @ PermissionServiceError::NameTaken(_) => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::Validation(errors) => ApiError::Validation(errors),
            PostServiceError::NotFound => ApiError::not_found("Post not found"),
            PostServiceError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(e) => ApiError::Internal(e),
            other => ApiError::unauthorized(other.to_string()),
        }
    }
}

/// How an error is classified for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Client,
    Server,
    Unhandled,
    Internal,
}

/// Everything needed to log an error and render its body.
///
/// Attached to error responses as an extension.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub detail: String,
    pub context: Option<Value>,
    pub kind: ErrorKind,
    pub error_name: &'static str,
    pub error_message: String,
}

impl ErrorReport {
    /// Report for an error that carries an HTTP status
    pub fn http(status: StatusCode, detail: &str) -> Self {
        let detail = detail.trim();
        let (kind, detail) = if status.is_client_error() {
            let d = if detail.is_empty() { "A client error occurred." } else { detail };
            (ErrorKind::Client, d.to_string())
        } else if status.is_server_error() {
            let d = if detail.is_empty() { "A server error occurred." } else { detail };
            (ErrorKind::Server, d.to_string())
        } else {
            (
                ErrorKind::Unhandled,
                format!("Unhandled status code: {}", status.as_u16()),
            )
        };
        Self {
            status,
            error_message: detail.clone(),
            detail,
            context: None,
            kind,
            error_name: "HttpError",
        }
    }

    /// Report for an uncaught failure; always a 500
    pub fn internal(error_name: &'static str, context: String, error_message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Internal server error: {}", context),
            context: None,
            kind: ErrorKind::Internal,
            error_name,
            error_message,
        }
    }

    /// Report for a framework response that has an error status but no body
    pub fn bare(status: StatusCode) -> Self {
        Self::http(status, status.canonical_reason().unwrap_or(""))
    }

    /// Log line in the form ` {message} | Path: {path} | {ErrorName}: {error}`
    pub fn log_line(&self, path: &str) -> String {
        let message = match self.kind {
            ErrorKind::Validation => "Client error - validation exception",
            ErrorKind::Client => "Client error",
            ErrorKind::Server => "Server error",
            ErrorKind::Unhandled => "Unhandled status code",
            ErrorKind::Internal => "Internal server error",
        };
        format!(
            " {} | Path: {} | {}: {}",
            message, path, self.error_name, self.error_message
        )
    }

    pub fn log(&self, path: &str) {
        let line = self.log_line(path);
        match self.kind {
            ErrorKind::Validation => tracing::info!("{}", line),
            ErrorKind::Client => tracing::warn!("{}", line),
            ErrorKind::Server | ErrorKind::Unhandled | ErrorKind::Internal => {
                tracing::error!("{}", line)
            }
        }
    }

    pub fn json_body(&self) -> Value {
        let mut body = json!({
            "status_code": self.status.as_u16(),
            "detail": self.detail,
        });
        if let (Some(context), Some(map)) = (&self.context, body.as_object_mut()) {
            map.insert("context".into(), context.clone());
        }
        body
    }

    fn context_text(&self) -> Option<String> {
        self.context.as_ref().map(|c| match c.get("error_detail") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match (item.get("field"), item.get("message")) {
                    (Some(Value::String(f)), Some(Value::String(m))) => format!("{}: {}", f, m),
                    _ => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            _ => c.to_string(),
        })
    }

    /// Render the report in the requested format
    pub fn render(&self, format: ErrorFormat, renderer: &Renderer) -> Response {
        let mut response = match format {
            ErrorFormat::Json => (self.status, Json(self.json_body())).into_response(),
            ErrorFormat::Html => {
                let html = renderer.render_error_page(
                    self.status.as_u16(),
                    &self.detail,
                    self.context_text().as_deref(),
                );
                (
                    self.status,
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    html,
                )
                    .into_response()
            }
        };
        response.extensions_mut().insert(self.clone());
        response
    }
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.json_body())).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Body format for error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFormat {
    Json,
    Html,
}

impl ErrorFormat {
    /// Pick the format from the request `Content-Type`. HTML is the default.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if content_type.contains("json") {
            ErrorFormat::Json
        } else {
            ErrorFormat::Html
        }
    }
}

/// Log error responses and rewrite their bodies for the client.
pub async fn negotiate_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let format = ErrorFormat::from_headers(request.headers());

    let mut response = next.run(request).await;

    let report = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => report,
        None if is_bare_error(&response) => ErrorReport::bare(response.status()),
        None => return response,
    };
    report.log(&path);

    let (mut parts, _) = response.into_parts();
    let rendered = report.render(format, &state.renderer);
    let (rendered_parts, body) = rendered.into_parts();

    parts.status = rendered_parts.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_ENCODING);
    if let Some(content_type) = rendered_parts.headers.get(header::CONTENT_TYPE) {
        parts.headers.insert(header::CONTENT_TYPE, content_type.clone());
    }
    parts.extensions.insert(report);
    Response::from_parts(parts, body)
}

fn is_bare_error(response: &Response) -> bool {
    let status = response.status();
    (status.is_client_error() || status.is_server_error())
        && response.body().size_hint().exact() == Some(0)
}

/// Convert a caught panic into a 500 report.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    let report = ErrorReport::internal(
        "Panic",
        "An unexpected server error occurred. (Error type: Panic)".to_string(),
        message,
    );
    let mut response = report.clone().into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_http_report_defaults() {
        let report = ErrorReport::http(StatusCode::NOT_FOUND, "");
        assert_eq!(report.detail, "A client error occurred.");
        assert_eq!(report.kind, ErrorKind::Client);

        let report = ErrorReport::http(StatusCode::BAD_GATEWAY, "");
        assert_eq!(report.detail, "A server error occurred.");
        assert_eq!(report.kind, ErrorKind::Server);

        let report = ErrorReport::http(StatusCode::FOUND, "moved");
        assert_eq!(report.detail, "Unhandled status code: 302");
        assert_eq!(report.kind, ErrorKind::Unhandled);
    }

    #[test]
    fn test_log_line_format() {
        let report = ApiError::not_found("Post not found").report();
        assert_eq!(
            report.log_line("/api/blog/9"),
            " Client error | Path: /api/blog/9 | HttpError: Post not found"
        );
    }

    #[test]
    fn test_internal_error_context() {
        let report = ApiError::Internal(anyhow::anyhow!("boom")).report();
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            report.detail,
            "Internal server error: An unexpected server error occurred. (Error type: InternalError)"
        );

        let db_err = anyhow::Error::new(sqlx::Error::PoolTimedOut).context("Failed to list posts");
        let report = ApiError::Internal(db_err).report();
        assert_eq!(
            report.detail,
            "Internal server error: A database error occurred while processing your request."
        );
        assert_eq!(report.error_name, "DatabaseError");
    }

    #[test]
    fn test_internal_error_names_root_cause() {
        let io_err = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ))
        .context("Failed to read template directory");
        let report = ApiError::Internal(io_err).report();
        assert_eq!(
            report.detail,
            "Internal server error: An unexpected server error occurred. (Error type: IoError)"
        );
        assert_eq!(report.error_name, "IoError");

        let json_err = serde_json::from_str::<Value>("{").unwrap_err();
        let report = ApiError::Internal(anyhow::Error::new(json_err).context("decode")).report();
        assert!(report.detail.ends_with("(Error type: JsonError)"));
    }

    #[tokio::test]
    async fn test_validation_response_body() {
        let response =
            ApiError::Validation(vec![FieldError::new("title", "Field required")]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<ErrorReport>().is_some());

        let body = body_json(response).await;
        assert_eq!(body["status_code"], 400);
        assert_eq!(body["detail"], VALIDATION_DETAIL);
        assert_eq!(body["context"]["error_detail"][0]["field"], "title");
    }

    #[test]
    fn test_error_format_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(ErrorFormat::from_headers(&headers), ErrorFormat::Html);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(ErrorFormat::from_headers(&headers), ErrorFormat::Json);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert_eq!(ErrorFormat::from_headers(&headers), ErrorFormat::Html);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(ErrorFormat::from_headers(&headers), ErrorFormat::Html);
    }

    #[test]
    fn test_service_error_mapping() {
        let err: ApiError = UserServiceError::UsernameTaken("alice".into()).into();
        let report = err.report();
        assert_eq!(report.status, StatusCode::BAD_REQUEST);
        assert_eq!(report.detail, "Username 'alice' is already taken.");

        let err: ApiError = PostServiceError::NotFound.into();
        assert_eq!(err.report().status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_panic_response() {
        let response = panic_response(Box::new("kaboom"));
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(report.error_message, "kaboom");
        assert!(report.detail.ends_with("(Error type: Panic)"));
    }
}
