//! HTTP handlers and the helpers they share.
//!
//! Flow Overview:
//! 1) Validate request fields.
//! 2) Authenticate the bearer token and consult the [`Authorizer`](crate::api::Authorizer)
//!    on protected routes.
//! 3) Call the user or token service and map its error to a status and code.

pub mod health;
pub mod tokens;
pub mod users;

use crate::{
    api::{HeaderExtractor, Services},
    auth::AuthClaims,
    model::TraceContext,
    service::ServiceError,
};
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use opentelemetry::global;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Error response: a status plus a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub(crate) fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: "Unauthorized".to_string(),
        }
    }

    pub(crate) fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN",
            message: "Forbidden".to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RepoNotFound => Self {
                status: StatusCode::NOT_FOUND,
                code: "NOT_FOUND_USER",
                message: "User not found".to_string(),
            },
            ServiceError::RepoConflict => Self {
                status: StatusCode::CONFLICT,
                code: "CONFLICT_USER",
                message: "User already exists".to_string(),
            },
            ServiceError::Unauthorized => Self::unauthorized(),
            ServiceError::RepoServerError | ServiceError::ServerError => {
                error!("Request failed: {}", err);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "INTERNAL_SERVER_ERROR",
                    message: "Internal server error".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Extract the bearer token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticate the request and check the policy for `resource` and `action`.
pub(crate) fn require_auth(
    headers: &HeaderMap,
    services: &Services,
    resource: &str,
    action: &str,
) -> Result<AuthClaims, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    let claims = services.tokens.authenticate(token)?;

    if !services.authorizer.allowed(claims.role, resource, action) {
        debug!(account_id = %claims.user_id, resource, action, "denied by policy");
        return Err(ApiError::forbidden());
    }
    Ok(claims)
}

/// Propagation headers the caller sent, re-encoded for the outbox.
///
/// Read from the request itself so the stored context does not depend on which
/// spans the log filter enables.
pub(crate) fn trace_context(headers: &HeaderMap) -> TraceContext {
    let mut trace = TraceContext::default();
    global::get_text_map_propagator(|propagator| {
        let caller = propagator.extract(&HeaderExtractor(headers));
        propagator.inject_context(&caller, &mut trace);
    });
    trace
}

pub(crate) fn valid_login_id(login_id: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9]{8,20}$").is_ok_and(|regex| regex.is_match(login_id))
}

pub(crate) fn valid_password(password: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9]{8,20}$").is_ok_and(|regex| regex.is_match(password))
}

pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

pub(crate) fn valid_phone(phone: &str) -> bool {
    Regex::new(r"^[0-9]{3}-[0-9]{4}-[0-9]{4}$").is_ok_and(|regex| regex.is_match(phone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use opentelemetry_sdk::propagation::TraceContextPropagator;

    #[test]
    fn login_id_and_password_format() {
        assert!(valid_login_id("alice1234"));
        assert!(!valid_login_id("short"));
        assert!(!valid_login_id("has space1"));
        assert!(!valid_login_id("abcdefghijklmnopqrstu"));
        assert!(valid_password("Secret123"));
        assert!(!valid_password("Secret!23"));
    }

    #[test]
    fn email_and_phone_format() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice.example.com"));
        assert!(valid_phone("010-1234-5678"));
        assert!(!valid_phone("0101-234-5678"));
        assert!(!valid_phone("01012345678"));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn service_errors_map_to_codes() {
        let cases = [
            (ServiceError::RepoNotFound, StatusCode::NOT_FOUND, "NOT_FOUND_USER"),
            (ServiceError::RepoConflict, StatusCode::CONFLICT, "CONFLICT_USER"),
            (ServiceError::Unauthorized, StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (
                ServiceError::RepoServerError,
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn trace_context_is_empty_without_caller_headers() {
        assert!(trace_context(&HeaderMap::new()).headers().is_empty());
    }

    #[test]
    fn trace_context_keeps_caller_traceparent() {
        global::set_text_map_propagator(TraceContextPropagator::new());
        let traceparent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(traceparent));

        let trace = trace_context(&headers);
        assert_eq!(
            trace.headers().get("traceparent").map(String::as_str),
            Some(traceparent)
        );
    }
}
