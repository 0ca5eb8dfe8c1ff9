use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use tracing::instrument;

use super::parse_id;
use crate::iam::{AuthService, Invitation, Principal};
use crate::warden::{
    error::ApiError,
    middleware::RequestId,
    types::{ErrorResponse, InviteRequest, UpdatePasswordRequest, UserResponse},
};

#[utoipa::path(
    get,
    path= "/users/me",
    responses (
        (status = 200, description = "The caller", body = UserResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn find_me(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(principal): Extension<Principal>,
    request_id: RequestId,
) -> Result<Json<UserResponse>, ApiError> {
    let user = service
        .find_me(&principal)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path= "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses (
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 403, description = "Role not allowed", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all, fields(user_id = %id))]
pub async fn find_user(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(principal): Extension<Principal>,
    request_id: RequestId,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(&id, &request_id)?;
    let user = service
        .find_user(&principal, id)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path= "/users/{id}/password",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdatePasswordRequest,
    responses (
        (status = 200, description = "Password updated", body = bool),
        (status = 401, description = "Token is stale, unverified or missing", body = ErrorResponse),
        (status = 403, description = "Token belongs to another user", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all, fields(user_id = %id))]
pub async fn update_password(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(principal): Extension<Principal>,
    request_id: RequestId,
    Path(id): Path<String>,
    payload: Option<Json<UpdatePasswordRequest>>,
) -> Result<Json<bool>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::MissingPayload);
    };

    let id = parse_id(&id, &request_id)?;
    let updated = service
        .update_password(&principal, id, &request.password)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(updated))
}

#[utoipa::path(
    post,
    path= "/users",
    request_body = InviteRequest,
    responses (
        (status = 201, description = "User invited", body = UserResponse),
        (status = 400, description = "Invalid email ID or phone number", body = ErrorResponse),
        (status = 403, description = "Only platform administrators may invite", body = ErrorResponse),
        (status = 409, description = "Email ID or phone number already registered", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn invite(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(principal): Extension<Principal>,
    request_id: RequestId,
    payload: Option<Json<InviteRequest>>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::MissingPayload);
    };

    let invitation = Invitation {
        name: request.name,
        email_id: request.email_id,
        phone_number: request.phone.number,
        role: request.role,
    };
    let user = service
        .invite(&principal, invitation)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok((StatusCode::CREATED, Json(user.into())))
}
