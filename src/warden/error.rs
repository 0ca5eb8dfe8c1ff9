use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};

use super::middleware::RequestId;
use super::types::{ErrorEntry, ErrorResponse};
use crate::iam::IamError;

/// Handler failure rendered as `{"errors":[{code,message}],"requestId":..}`.
#[derive(Debug)]
pub enum ApiError {
    Iam { error: IamError, request_id: String },
    MissingPayload,
}

impl ApiError {
    pub fn new(error: impl Into<IamError>, request_id: &RequestId) -> Self {
        Self::Iam {
            error: error.into(),
            request_id: request_id.0.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error, request_id) = match self {
            Self::Iam { error, request_id } => (error, request_id),
            Self::MissingPayload => {
                return (StatusCode::BAD_REQUEST, "Missing payload").into_response()
            }
        };

        let status = error.status();
        let code = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // The cause stays in the logs; clients only get the status text.
            error!(request_id = %request_id, "Request failed: {error:#}");
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            debug!(request_id = %request_id, code = error.code(), "Request rejected");
            error.code().to_string()
        };

        let body = ErrorResponse {
            errors: vec![ErrorEntry {
                code,
                message: error.message().to_string(),
            }],
            request_id,
        };

        (status, Json(body)).into_response()
    }
}
