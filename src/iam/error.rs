//! Symbolic error kinds for the identity core.
//!
//! Every kind has a stable string code, a user-facing message and an HTTP
//! status. The three mappings are exhaustive matches, so adding a kind without
//! wiring it up does not compile.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IamError {
    #[error("userAlreadyExists")]
    UserAlreadyExists,
    #[error("userNotFound")]
    UserNotFound,
    #[error("userNotRegistered")]
    UserNotRegistered,
    #[error("credentialsInvalid")]
    CredentialsInvalid,
    #[error("failedLoginLimitExceeded")]
    FailedLoginLimitExceeded,
    #[error("challengeNotFound")]
    ChallengeNotFound,
    #[error("failedVerificationLimitExceeded")]
    FailedVerificationLimitExceeded,
    #[error("userVerificationIncomplete")]
    UserVerificationIncomplete,
    #[error("verificationFailed")]
    VerificationFailed,
    #[error("tooManyChallengeRequests")]
    TooManyChallengeRequests,
    #[error("emailIdInvalid")]
    EmailIdInvalid,
    #[error("phoneNumberInvalid")]
    PhoneNumberInvalid,
    #[error("identityTypeNotFound")]
    IdentityTypeNotFound,
    #[error("unauthorised")]
    Unauthorised,
    #[error("forbidden")]
    Forbidden,
    #[error("notFound")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("idInvalid")]
    IdInvalid,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IamError {
    /// Stable code sent to clients alongside the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserAlreadyExists => "userAlreadyExists",
            Self::UserNotFound => "userNotFound",
            Self::UserNotRegistered => "userNotRegistered",
            Self::CredentialsInvalid => "credentialsInvalid",
            Self::FailedLoginLimitExceeded => "failedLoginLimitExceeded",
            Self::ChallengeNotFound => "challengeNotFound",
            Self::FailedVerificationLimitExceeded => "failedVerificationLimitExceeded",
            Self::UserVerificationIncomplete => "userVerificationIncomplete",
            Self::VerificationFailed => "verificationFailed",
            Self::TooManyChallengeRequests => "tooManyChallengeRequests",
            Self::EmailIdInvalid => "emailIdInvalid",
            Self::PhoneNumberInvalid => "phoneNumberInvalid",
            Self::IdentityTypeNotFound => "identityTypeNotFound",
            Self::Unauthorised => "unauthorised",
            Self::Forbidden => "forbidden",
            Self::NotFound => "notFound",
            Self::Conflict => "conflict",
            Self::IdInvalid => "idInvalid",
            Self::Internal(_) => "internalServerError",
        }
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::UserAlreadyExists => {
                "User with the given phone number or email ID already exists"
            }
            Self::UserNotFound => "User not found",
            Self::UserNotRegistered => "User not registered",
            Self::CredentialsInvalid => "You have entered an invalid username or password",
            Self::FailedLoginLimitExceeded => "Exceeded failed login limit",
            Self::ChallengeNotFound => "Challenge not found",
            Self::FailedVerificationLimitExceeded => "Exceeded failed verification limit",
            Self::UserVerificationIncomplete => {
                "Complete user verification before attempting to login"
            }
            Self::VerificationFailed => "Verification failed",
            Self::TooManyChallengeRequests => "Too many challenge requests",
            Self::EmailIdInvalid => "Invalid email ID",
            Self::PhoneNumberInvalid => "Invalid phone number",
            Self::IdentityTypeNotFound => "Identity type not found",
            Self::Unauthorised => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::Conflict => "Conflict",
            Self::IdInvalid => "Id Invalid",
            Self::Internal(_) => "Internal Server Error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UserAlreadyExists | Self::Conflict => StatusCode::CONFLICT,
            Self::UserNotFound
            | Self::UserNotRegistered
            | Self::ChallengeNotFound
            | Self::IdentityTypeNotFound
            | Self::NotFound => StatusCode::NOT_FOUND,
            Self::CredentialsInvalid | Self::Unauthorised => StatusCode::UNAUTHORIZED,
            Self::FailedLoginLimitExceeded
            | Self::FailedVerificationLimitExceeded
            | Self::UserVerificationIncomplete
            | Self::VerificationFailed
            | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::TooManyChallengeRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::EmailIdInvalid | Self::PhoneNumberInvalid => StatusCode::BAD_REQUEST,
            Self::IdInvalid => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
