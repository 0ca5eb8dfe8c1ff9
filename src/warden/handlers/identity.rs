//! Challenge, verification and password login endpoints. None of them need a
//! bearer token.

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use tracing::instrument;

use super::parse_id;
use crate::iam::AuthService;
use crate::warden::{
    error::ApiError,
    middleware::RequestId,
    types::{
        ChallengeResponse, ContactRequest, ErrorResponse, LoginRequest, SessionResponse,
        VerifyRequest,
    },
};

#[utoipa::path(
    post,
    path= "/challenge",
    request_body = ContactRequest,
    responses (
        (status = 200, description = "Challenge opened and code sent", body = ChallengeResponse),
        (status = 400, description = "Invalid email ID or phone number", body = ErrorResponse),
        (status = 429, description = "Challenge requested again too soon", body = ErrorResponse),
    ),
    tag= "identity"
)]
#[instrument(skip_all)]
pub async fn challenge(
    Extension(service): Extension<Arc<AuthService>>,
    request_id: RequestId,
    payload: Option<Json<ContactRequest>>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::MissingPayload);
    };

    let contact = request
        .contact()
        .map_err(|err| ApiError::new(err, &request_id))?;
    let challenge = service
        .challenge(contact)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(challenge.into()))
}

#[utoipa::path(
    post,
    path= "/challenges/{challengeId}/resend",
    params(("challengeId" = String, Path, description = "Challenge id")),
    responses (
        (status = 200, description = "New code sent", body = ChallengeResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse),
        (status = 422, description = "Malformed challenge id", body = ErrorResponse),
        (status = 429, description = "Challenge requested again too soon", body = ErrorResponse),
    ),
    tag= "identity"
)]
#[instrument(skip_all, fields(challenge_id = %challenge_id))]
pub async fn resend(
    Extension(service): Extension<Arc<AuthService>>,
    request_id: RequestId,
    Path(challenge_id): Path<String>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let challenge_id = parse_id(&challenge_id, &request_id)?;
    let challenge = service
        .resend(challenge_id)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(challenge.into()))
}

#[utoipa::path(
    post,
    path= "/verify",
    request_body = VerifyRequest,
    responses (
        (status = 200, description = "Code accepted, verified session issued", body = SessionResponse),
        (status = 403, description = "Wrong code or too many failed attempts", body = ErrorResponse),
        (status = 404, description = "No open challenge or no such user", body = ErrorResponse),
    ),
    tag= "identity"
)]
#[instrument(skip_all)]
pub async fn verify(
    Extension(service): Extension<Arc<AuthService>>,
    request_id: RequestId,
    payload: Option<Json<VerifyRequest>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::MissingPayload);
    };

    let contact = request
        .contact
        .contact()
        .map_err(|err| ApiError::new(err, &request_id))?;
    let session = service
        .verify(contact, &request.otp)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(session.into()))
}

#[utoipa::path(
    post,
    path= "/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Password accepted", body = SessionResponse),
        (status = 401, description = "Invalid username or password", body = ErrorResponse),
        (status = 403, description = "Locked out or verification incomplete", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag= "identity"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(service): Extension<Arc<AuthService>>,
    request_id: RequestId,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::MissingPayload);
    };

    let contact = request
        .contact
        .contact()
        .map_err(|err| ApiError::new(err, &request_id))?;
    let session = service
        .login(contact, &request.password)
        .await
        .map_err(|err| ApiError::new(err, &request_id))?;

    Ok(Json(session.into()))
}
