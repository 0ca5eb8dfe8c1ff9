//! Wire types. OTPs, password hashes, failure counters and timestamps never
//! appear in a response.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::iam::{Challenge, Contact, IamError, IdentityType, Role, Session, User};

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Phone {
    #[serde(default)]
    pub number: String,
}

/// Fields shared by requests that name one contact of a given type.
#[derive(ToSchema, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[schema(value_type = IdentityType)]
    pub identity_type: String,
    #[serde(default)]
    pub email_id: String,
    #[serde(default)]
    pub phone: Phone,
}

impl ContactRequest {
    /// # Errors
    /// `IdentityTypeNotFound` for an unknown `identityType`.
    pub fn contact(&self) -> Result<Contact, IamError> {
        let identity_type = IdentityType::parse(&self.identity_type)?;
        Ok(Contact::from_parts(
            identity_type,
            &self.email_id,
            &self.phone.number,
        ))
    }
}

#[derive(ToSchema, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(flatten)]
    pub contact: ContactRequest,
    pub otp: String,
}

#[derive(ToSchema, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(flatten)]
    pub contact: ContactRequest,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("contact", &self.contact)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(ToSchema, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub name: String,
    #[serde(default)]
    pub email_id: String,
    #[serde(default)]
    pub phone: Phone,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub id: Uuid,
    pub identity_type: IdentityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Phone>,
}

impl From<Challenge> for ChallengeResponse {
    fn from(challenge: Challenge) -> Self {
        let (email_id, phone) = split_contact(challenge.contact.clone());
        Self {
            id: challenge.id,
            identity_type: challenge.identity_type(),
            email_id,
            phone,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Phone>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub version: i64,
    pub identities: Vec<IdentityResponse>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let identities = user
            .identities
            .into_iter()
            .map(|identity| {
                let identity_type = identity.identity_type();
                let (email_id, phone) = split_contact(identity.contact);
                IdentityResponse {
                    identity_type,
                    verified: identity.verified,
                    email_id,
                    phone,
                }
            })
            .collect();

        Self {
            id: user.id,
            role: user.role,
            name: user.name,
            version: user.version,
            identities,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub token: String,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            user: session.user.into(),
            token: session.token,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub errors: Vec<ErrorEntry>,
    pub request_id: String,
}

fn split_contact(contact: Contact) -> (Option<String>, Option<Phone>) {
    match contact {
        Contact::Email(email_id) => (Some(email_id), None),
        Contact::Phone(number) => (None, Some(Phone { number })),
    }
}
