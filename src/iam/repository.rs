//! Storage capabilities consumed by the identity core.
//!
//! Mutations are described with typed patches naming the semantic field that
//! changes. Each store translates them into its own update syntax, so nothing
//! above this module knows how identities are laid out on disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::error::IamError;
use super::model::{Challenge, Contact, IdentityType, NewChallenge, NewUser, User};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no matching record")]
    NotFound,
    #[error("record conflicts with an existing one")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => Self::Conflict,
            other => Self::Backend(anyhow::Error::new(other)),
        }
    }
}

impl From<RepositoryError> for IamError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict => Self::Conflict,
            RepositoryError::Backend(error) => Self::Internal(error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserField {
    IdentityVerified(IdentityType, bool),
    FailedAuthAttempts(i64),
    Password(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserCounter {
    Version,
    FailedAuthAttempts,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserPatch {
    Set(UserField),
    Increment(UserCounter, i64),
}

impl UserPatch {
    /// Apply the patch to an in-memory copy.
    ///
    /// # Errors
    /// Returns `NotFound` when the patch targets an identity the user does not have.
    pub fn apply(&self, user: &mut User) -> Result<(), RepositoryError> {
        match self {
            Self::Set(UserField::IdentityVerified(identity_type, verified)) => {
                let identity = user
                    .identities
                    .iter_mut()
                    .find(|identity| identity.identity_type() == *identity_type)
                    .ok_or(RepositoryError::NotFound)?;
                identity.verified = *verified;
            }
            Self::Set(UserField::FailedAuthAttempts(value)) => user.failed_auth_attempts = *value,
            Self::Set(UserField::Password(hash)) => user.password_hash.clone_from(hash),
            Self::Increment(UserCounter::Version, delta) => user.version += delta,
            Self::Increment(UserCounter::FailedAuthAttempts, delta) => {
                user.failed_auth_attempts += delta;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeField {
    Otp(String),
    UpdatedAt(DateTime<Utc>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeCounter {
    FailedVerificationCount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengePatch {
    Set(ChallengeField),
    Increment(ChallengeCounter, i64),
}

impl ChallengePatch {
    pub fn apply(&self, challenge: &mut Challenge) {
        match self {
            Self::Set(ChallengeField::Otp(otp)) => challenge.otp.clone_from(otp),
            Self::Set(ChallengeField::UpdatedAt(at)) => challenge.updated_at = *at,
            Self::Increment(ChallengeCounter::FailedVerificationCount, delta) => {
                challenge.failed_verification_count += delta;
            }
        }
    }
}

/// Users, filtered by one of their contacts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn count(&self, filter: &Contact) -> Result<u64, RepositoryError>;

    async fn create(&self, draft: NewUser) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, RepositoryError>;

    async fn find_one(&self, filter: &Contact) -> Result<User, RepositoryError>;

    /// Apply every patch or none of them. Fails with `NotFound` when no user has `id`.
    async fn patch(&self, id: Uuid, patches: &[UserPatch]) -> Result<(), RepositoryError>;

    async fn set_field(&self, id: Uuid, field: UserField) -> Result<(), RepositoryError> {
        self.patch(id, &[UserPatch::Set(field)]).await
    }

    async fn set_fields(&self, id: Uuid, fields: Vec<UserField>) -> Result<(), RepositoryError> {
        let patches: Vec<UserPatch> = fields.into_iter().map(UserPatch::Set).collect();
        self.patch(id, &patches).await
    }

    async fn increment_field(
        &self,
        id: Uuid,
        counter: UserCounter,
        delta: i64,
    ) -> Result<(), RepositoryError> {
        self.patch(id, &[UserPatch::Increment(counter, delta)]).await
    }
}

/// Open challenges; at most one per contact.
#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    /// Fails with `Conflict` when a challenge for the same contact is already open.
    async fn create(&self, draft: NewChallenge) -> Result<Challenge, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Challenge, RepositoryError>;

    async fn find_one(&self, contact: &Contact) -> Result<Challenge, RepositoryError>;

    async fn patch(&self, id: Uuid, patches: &[ChallengePatch]) -> Result<(), RepositoryError>;

    /// Number of challenges removed, zero or one.
    async fn delete(&self, id: Uuid) -> Result<u64, RepositoryError>;

    async fn set_field(&self, id: Uuid, field: ChallengeField) -> Result<(), RepositoryError> {
        self.patch(id, &[ChallengePatch::Set(field)]).await
    }

    async fn set_fields(
        &self,
        id: Uuid,
        fields: Vec<ChallengeField>,
    ) -> Result<(), RepositoryError> {
        let patches: Vec<ChallengePatch> = fields.into_iter().map(ChallengePatch::Set).collect();
        self.patch(id, &patches).await
    }

    async fn increment_field(
        &self,
        id: Uuid,
        counter: ChallengeCounter,
        delta: i64,
    ) -> Result<(), RepositoryError> {
        self.patch(id, &[ChallengePatch::Increment(counter, delta)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::model::{Identity, Role};

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            role: Role::MerchantAdmin,
            name: "Merchant".to_string(),
            version: 2,
            failed_auth_attempts: 3,
            password_hash: String::new(),
            identities: vec![
                Identity::unverified(Contact::Email("m@x.com".to_string())),
                Identity::unverified(Contact::Phone("9876543210".to_string())),
            ],
        }
    }

    #[test]
    fn identity_patch_targets_type_not_position() {
        let mut user = user();
        user.identities.reverse();
        let patch = UserPatch::Set(UserField::IdentityVerified(IdentityType::Email, true));
        assert!(patch.apply(&mut user).is_ok());
        assert!(!user.identities[0].verified);
        assert!(user.identities[1].verified);
    }

    #[test]
    fn identity_patch_on_missing_identity_fails() {
        let mut user = user();
        user.identities.truncate(1);
        let patch = UserPatch::Set(UserField::IdentityVerified(IdentityType::Phone, true));
        assert!(matches!(patch.apply(&mut user), Err(RepositoryError::NotFound)));
    }

    #[test]
    fn counters_and_fields() {
        let mut user = user();
        for patch in [
            UserPatch::Increment(UserCounter::Version, 1),
            UserPatch::Set(UserField::FailedAuthAttempts(0)),
            UserPatch::Set(UserField::Password("hash".to_string())),
        ] {
            assert!(patch.apply(&mut user).is_ok());
        }
        assert_eq!(user.version, 3);
        assert_eq!(user.failed_auth_attempts, 0);
        assert_eq!(user.password_hash, "hash");
    }

    #[test]
    fn repository_errors_map_to_core_kinds() {
        assert!(matches!(
            IamError::from(RepositoryError::NotFound),
            IamError::NotFound
        ));
        assert!(matches!(
            IamError::from(RepositoryError::Conflict),
            IamError::Conflict
        ));
        assert!(matches!(
            IamError::from(RepositoryError::from(sqlx::Error::RowNotFound)),
            IamError::NotFound
        ));
        assert!(matches!(
            IamError::from(RepositoryError::from(sqlx::Error::PoolTimedOut)),
            IamError::Internal(_)
        ));
    }
}
