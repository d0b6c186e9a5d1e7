//! Account endpoints.
//!
//! `POST /v1/users` is open so accounts can sign up; asking for the admin role
//! there requires an admin bearer token. Everything else is bearer-authenticated
//! and checked against the policy using the route template as the resource.

use super::{
    ApiError, ErrorBody, bearer_token, require_auth, trace_context, valid_email, valid_login_id,
    valid_password, valid_phone,
};
use crate::{
    api::{Services, policy::SELF_RESOURCE},
    model::{Account, AccountChanges, NewAccount, Role},
};
use axum::{
    Json,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const USERS_RESOURCE: &str = "/v1/users";
const USER_RESOURCE: &str = "/v1/users/{id}";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub login_id: String,
    pub role: Role,
    pub phone: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for UserResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            login_id: account.login_id,
            role: account.role,
            phone: account.phone,
            email: account.email,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub login_id: String,
    pub password: String,
    pub role: Option<Role>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub password: String,
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::bad_request("Invalid user id"))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn check_contact(phone: Option<&str>, email: Option<&str>) -> Result<(), ApiError> {
    if phone.is_some_and(|phone| !phone.is_empty() && !valid_phone(phone)) {
        return Err(ApiError::bad_request("Invalid phone"));
    }
    if email.is_some_and(|email| !email.is_empty() && !valid_email(email)) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    Ok(())
}

fn validate_update(request: &UpdateUserRequest) -> Result<(), ApiError> {
    if !valid_password(&request.password) {
        return Err(ApiError::bad_request("Invalid password"));
    }
    check_contact(request.phone.as_deref(), request.email.as_deref())
}

fn into_changes(request: UpdateUserRequest) -> (AccountChanges, String) {
    (
        AccountChanges {
            role: request.role,
            phone: request.phone,
            email: request.email,
        },
        request.password,
    )
}

#[utoipa::path(
    get,
    path = "/v1/users",
    params(ListParams),
    responses(
        (status = 200, description = "Live accounts, oldest first.", body = [UserResponse]),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 403, description = "Forbidden.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(services): Extension<Services>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &services, USERS_RESOURCE, "GET")?;
    let accounts = services
        .users
        .list_accounts(params.offset.unwrap_or(0), params.limit.unwrap_or(0))
        .await?;
    let body: Vec<UserResponse> = accounts.into_iter().map(UserResponse::from).collect();
    Ok((StatusCode::OK, Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created.", body = UserResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 403, description = "Admin role without an admin token.", body = ErrorBody),
        (status = 409, description = "Login id already taken.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn create_user(
    headers: HeaderMap,
    Extension(services): Extension<Services>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;

    if !valid_login_id(&request.login_id) {
        return Err(ApiError::bad_request("Invalid login id"));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::bad_request("Invalid password"));
    }
    check_contact(Some(&request.phone), Some(&request.email))?;

    let role = request.role.unwrap_or(Role::Standard);
    if role == Role::Admin {
        let claims = bearer_token(&headers)
            .map(|token| services.tokens.authenticate(token))
            .transpose()?;
        if !claims.is_some_and(|claims| claims.role == Role::Admin) {
            return Err(ApiError::forbidden());
        }
    }

    let fields = NewAccount {
        login_id: request.login_id,
        role,
        phone: request.phone,
        email: request.email,
    };
    let account = services
        .users
        .create_account(fields, &request.password, &trace_context(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(account))).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account detail.", body = UserResponse),
        (status = 400, description = "Invalid account id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 403, description = "Forbidden.", body = ErrorBody),
        (status = 404, description = "Account not found.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(services): Extension<Services>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &services, USER_RESOURCE, "GET")?;
    let account = services.users.get_account(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(UserResponse::from(account))).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Account id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Account updated.", body = UserResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 403, description = "Forbidden.", body = ErrorBody),
        (status = 404, description = "Account not found.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(services): Extension<Services>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &services, USER_RESOURCE, "PUT")?;
    let id = parse_id(&id)?;
    let request = json_body(payload)?;
    validate_update(&request)?;

    let (changes, password) = into_changes(request);
    let account = services.users.update_account(id, changes, &password).await?;
    Ok((StatusCode::OK, Json(UserResponse::from(account))).into_response())
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account deleted."),
        (status = 400, description = "Invalid account id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 403, description = "Forbidden.", body = ErrorBody),
        (status = 404, description = "Account not found.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(services): Extension<Services>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &services, USER_RESOURCE, "DELETE")?;
    services
        .users
        .delete_account(parse_id(&id)?, &trace_context(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[utoipa::path(
    get,
    path = "/v1/users/me",
    responses(
        (status = 200, description = "The caller's account.", body = UserResponse),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 404, description = "Account not found.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn get_me(
    headers: HeaderMap,
    Extension(services): Extension<Services>,
) -> Result<Response, ApiError> {
    let claims = require_auth(&headers, &services, SELF_RESOURCE, "GET")?;
    let account = services.users.get_account(claims.user_id).await?;
    Ok((StatusCode::OK, Json(UserResponse::from(account))).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/users/me",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "The caller's account, updated.", body = UserResponse),
        (status = 400, description = "Invalid input.", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 403, description = "Role changes need an admin token.", body = ErrorBody),
        (status = 404, description = "Account not found.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_me(
    headers: HeaderMap,
    Extension(services): Extension<Services>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let claims = require_auth(&headers, &services, SELF_RESOURCE, "PUT")?;
    let request = json_body(payload)?;
    validate_update(&request)?;
    if request.role.is_some_and(|role| role != claims.role) && claims.role != Role::Admin {
        return Err(ApiError::forbidden());
    }

    let (changes, password) = into_changes(request);
    let account = services
        .users
        .update_account(claims.user_id, changes, &password)
        .await?;
    Ok((StatusCode::OK, Json(UserResponse::from(account))).into_response())
}

#[utoipa::path(
    delete,
    path = "/v1/users/me",
    responses(
        (status = 204, description = "The caller's account was deleted."),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
        (status = 404, description = "Account not found.", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn delete_me(
    headers: HeaderMap,
    Extension(services): Extension<Services>,
) -> Result<Response, ApiError> {
    let claims = require_auth(&headers, &services, SELF_RESOURCE, "DELETE")?;
    services
        .users
        .delete_account(claims.user_id, &trace_context(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
