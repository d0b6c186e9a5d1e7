use super::{ApiError, ErrorBody};
use crate::{api::Services, auth::IssuedToken};
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login_id: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for AccessTokenResponse {
    fn from(token: IssuedToken) -> Self {
        Self {
            access_token: token.token,
            token_type: "Bearer".to_string(),
            expires_at: token.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/v1/tokens/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens.", body = TokenResponse),
        (status = 400, description = "Malformed body.", body = ErrorBody),
        (status = 401, description = "Unknown login id or wrong password.", body = ErrorBody),
    ),
    tag = "tokens"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(services): Extension<Services>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    if request.login_id.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Missing login id or password"));
    }

    let pair = services
        .tokens
        .login(request.login_id.trim(), &request.password)
        .await?;
    let body = TokenResponse {
        access_token: pair.access.token,
        token_type: "Bearer".to_string(),
        expires_at: pair.access.expires_at,
        refresh_token: pair.refresh.token,
        refresh_expires_at: pair.refresh.expires_at,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/tokens/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "A fresh access token.", body = AccessTokenResponse),
        (status = 400, description = "Malformed body.", body = ErrorBody),
        (status = 401, description = "Refresh token rejected.", body = ErrorBody),
    ),
    tag = "tokens"
)]
#[instrument(skip_all)]
pub async fn refresh(
    Extension(services): Extension<Services>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let access = services.tokens.refresh(request.refresh_token.trim()).await?;
    Ok((StatusCode::OK, Json(AccessTokenResponse::from(access))).into_response())
}
