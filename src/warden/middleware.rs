use std::{convert::Infallible, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use tracing::debug;

use super::error::ApiError;
use crate::iam::{AuthService, IamError, Principal};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The `x-request-id` assigned to the request, empty if none.
#[derive(Clone, Debug, Default)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .headers
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        ))
    }
}

/// Decode the bearer token into a [`Principal`] for the handlers.
///
/// No token means anonymous; a token that fails verification ends the
/// request with 401 before any handler runs.
pub async fn authenticate(
    Extension(service): Extension<Arc<AuthService>>,
    request_id: RequestId,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = match request.headers().get(AUTHORIZATION) {
        None => Principal::Anonymous,
        Some(value) if value.is_empty() => Principal::Anonymous,
        Some(value) => {
            let token = value
                .to_str()
                .ok()
                .and_then(|value| value.strip_prefix("Bearer "))
                .unwrap_or_default()
                .trim();

            match service.tokens().verify(token) {
                Ok(claims) => Principal::Authenticated(claims),
                Err(err) => {
                    debug!(request_id = %request_id.0, "Rejected bearer token: {err}");
                    return ApiError::new(IamError::Unauthorised, &request_id).into_response();
                }
            }
        }
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}
