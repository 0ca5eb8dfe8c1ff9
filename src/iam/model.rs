//! Users, identities, challenges and sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::IamError;
use super::validation::{validate_email_id, validate_phone};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentityType {
    Email,
    Phone,
}

impl IdentityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
        }
    }

    /// # Errors
    /// Returns `IdentityTypeNotFound` for unknown values.
    pub fn parse(value: &str) -> Result<Self, IamError> {
        match value {
            "EMAIL" => Ok(Self::Email),
            "PHONE" => Ok(Self::Phone),
            _ => Err(IamError::IdentityTypeNotFound),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    PlatformAdmin,
    MerchantAdmin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlatformAdmin => "PLATFORM_ADMIN",
            Self::MerchantAdmin => "MERCHANT_ADMIN",
        }
    }

    /// # Errors
    /// Returns an internal error for values the store should never hold.
    pub fn parse(value: &str) -> Result<Self, IamError> {
        match value {
            "PLATFORM_ADMIN" => Ok(Self::PlatformAdmin),
            "MERCHANT_ADMIN" => Ok(Self::MerchantAdmin),
            other => Err(IamError::Internal(anyhow::anyhow!("unknown role {other}"))),
        }
    }
}

/// A contact value; the variant is the identity type, so an email and a phone
/// can never both be set on the same record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    /// Pick the value matching `identity_type` out of a request that carries both fields.
    #[must_use]
    pub fn from_parts(identity_type: IdentityType, email_id: &str, phone_number: &str) -> Self {
        match identity_type {
            IdentityType::Email => Self::Email(email_id.trim().to_string()),
            IdentityType::Phone => Self::Phone(phone_number.trim().to_string()),
        }
    }

    #[must_use]
    pub const fn identity_type(&self) -> IdentityType {
        match self {
            Self::Email(_) => IdentityType::Email,
            Self::Phone(_) => IdentityType::Phone,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Email(value) | Self::Phone(value) => value,
        }
    }

    /// # Errors
    /// Returns `EmailIdInvalid` or `PhoneNumberInvalid` depending on the variant.
    pub fn validate(&self) -> Result<(), IamError> {
        match self {
            Self::Email(email_id) => validate_email_id(email_id),
            Self::Phone(number) => validate_phone(number),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub verified: bool,
    pub contact: Contact,
}

impl Identity {
    #[must_use]
    pub fn unverified(contact: Contact) -> Self {
        Self {
            verified: false,
            contact,
        }
    }

    #[must_use]
    pub const fn identity_type(&self) -> IdentityType {
        self.contact.identity_type()
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub version: i64,
    pub failed_auth_attempts: i64,
    /// bcrypt hash; empty until a password is set after verification.
    pub password_hash: String,
    pub identities: Vec<Identity>,
}

impl User {
    /// Position and value of the identity of the given type, if any.
    #[must_use]
    pub fn identity(&self, identity_type: IdentityType) -> Option<(usize, &Identity)> {
        self.identities
            .iter()
            .enumerate()
            .find(|(_, identity)| identity.identity_type() == identity_type)
    }

    #[must_use]
    pub fn has_contact(&self, contact: &Contact) -> bool {
        self.identities
            .iter()
            .any(|identity| &identity.contact == contact)
    }

    /// Hash mismatches and malformed hashes both count as a wrong password.
    #[must_use]
    pub fn equals_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

/// A user as submitted to the store, before it assigns an id.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub role: Role,
    pub name: String,
    pub identities: Vec<Identity>,
}

impl NewUser {
    /// At most one identity per type; later duplicates are dropped.
    #[must_use]
    pub fn new(role: Role, name: String, identities: Vec<Identity>) -> Self {
        let mut unique: Vec<Identity> = Vec::with_capacity(identities.len());
        for identity in identities {
            if !unique
                .iter()
                .any(|existing| existing.identity_type() == identity.identity_type())
            {
                unique.push(identity);
            }
        }
        Self {
            role,
            name,
            identities: unique,
        }
    }
}

/// Invitation payload accepted from a platform administrator.
#[derive(Clone, Debug)]
pub struct Invitation {
    pub name: String,
    pub email_id: String,
    pub phone_number: String,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct Challenge {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub contact: Contact,
    pub otp: String,
    pub failed_verification_count: i64,
}

impl Challenge {
    #[must_use]
    pub const fn identity_type(&self) -> IdentityType {
        self.contact.identity_type()
    }
}

#[derive(Clone, Debug)]
pub struct NewChallenge {
    pub created_at: DateTime<Utc>,
    pub contact: Contact,
    pub otp: String,
}

/// A user snapshot paired with the token minted for it.
#[derive(Clone, Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}
