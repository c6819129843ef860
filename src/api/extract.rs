//! Request extractors
//!
//! `ValidJson`, `ValidPath` and `ValidForm` wrap the axum extractors so that
//! malformed input becomes an [`ApiError::Validation`].

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;

use super::error::ApiError;
use super::middleware::HtmxRequest;
use crate::models::{AuthUser, Authentication};

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ValidJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ValidPath<T>(pub T);

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct ValidForm<T>(pub T);

/// Authentication attached by the `authenticate` middleware.
///
/// Requests that bypassed the middleware are anonymous.
#[derive(Debug, Clone)]
pub struct Auth(pub Authentication);

impl<S: Send + Sync> FromRequestParts<S> for Auth {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Auth(
            parts
                .extensions
                .get::<Authentication>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

/// The authenticated principal. Rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authentication>()
            .and_then(|auth| auth.user().cloned())
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Whether the request came from htmx
#[derive(Debug, Clone, Copy)]
pub struct Htmx(pub bool);

impl<S: Send + Sync> FromRequestParts<S> for Htmx {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let is_htmx = match parts.extensions.get::<HtmxRequest>() {
            Some(HtmxRequest(flag)) => *flag,
            None => parts
                .headers
                .get("hx-request")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        };
        Ok(Htmx(is_htmx))
    }
}
