use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{health, identity, users};
use super::types::{
    ChallengeResponse, ContactRequest, ErrorEntry, ErrorResponse, IdentityResponse,
    InviteRequest, LoginRequest, Phone, SessionResponse, UpdatePasswordRequest, UserResponse,
    VerifyRequest,
};
use crate::iam::{IdentityType, Role};

/// Title, version, description, contact and license come from Cargo metadata.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        identity::challenge,
        identity::resend,
        identity::verify,
        identity::login,
        users::find_me,
        users::find_user,
        users::update_password,
        users::invite,
    ),
    components(schemas(
        health::Health,
        IdentityType,
        Role,
        Phone,
        ContactRequest,
        VerifyRequest,
        LoginRequest,
        UpdatePasswordRequest,
        InviteRequest,
        ChallengeResponse,
        IdentityResponse,
        UserResponse,
        SessionResponse,
        ErrorEntry,
        ErrorResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness"),
        (name = "identity", description = "OTP challenges, verification and password login"),
        (name = "users", description = "User lookup, invitation and password changes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn spec() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
