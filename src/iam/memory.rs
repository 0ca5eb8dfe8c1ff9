//! Process-local store used when no database is configured, and by tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{Challenge, Contact, NewChallenge, NewUser, User};
use super::repository::{
    ChallengePatch, ChallengeRepository, RepositoryError, UserPatch, UserRepository,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
    challenges: RwLock<Vec<Challenge>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn count(&self, filter: &Contact) -> Result<u64, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|user| user.has_contact(filter)).count() as u64)
    }

    async fn create(&self, draft: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let taken = draft.identities.iter().any(|identity| {
            users
                .iter()
                .any(|user| user.has_contact(&identity.contact))
        });
        if taken {
            return Err(RepositoryError::Conflict);
        }

        let user = User {
            id: Uuid::new_v4(),
            role: draft.role,
            name: draft.name,
            version: 0,
            failed_auth_attempts: 0,
            password_hash: String::new(),
            identities: draft.identities,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        let users = self.users.read().await;
        users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_one(&self, filter: &Contact) -> Result<User, RepositoryError> {
        let users = self.users.read().await;
        users
            .iter()
            .find(|user| user.has_contact(filter))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn patch(&self, id: Uuid, patches: &[UserPatch]) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let slot = users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(RepositoryError::NotFound)?;

        // Work on a copy so a failing patch leaves the stored user untouched.
        let mut updated = slot.clone();
        for patch in patches {
            patch.apply(&mut updated)?;
        }
        *slot = updated;
        Ok(())
    }
}

#[async_trait]
impl ChallengeRepository for MemoryStore {
    async fn create(&self, draft: NewChallenge) -> Result<Challenge, RepositoryError> {
        let mut challenges = self.challenges.write().await;
        if challenges
            .iter()
            .any(|challenge| challenge.contact == draft.contact)
        {
            return Err(RepositoryError::Conflict);
        }

        let challenge = Challenge {
            id: Uuid::new_v4(),
            created_at: draft.created_at,
            updated_at: draft.created_at,
            contact: draft.contact,
            otp: draft.otp,
            failed_verification_count: 0,
        };
        challenges.push(challenge.clone());
        Ok(challenge)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Challenge, RepositoryError> {
        let challenges = self.challenges.read().await;
        challenges
            .iter()
            .find(|challenge| challenge.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_one(&self, contact: &Contact) -> Result<Challenge, RepositoryError> {
        let challenges = self.challenges.read().await;
        challenges
            .iter()
            .find(|challenge| &challenge.contact == contact)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn patch(&self, id: Uuid, patches: &[ChallengePatch]) -> Result<(), RepositoryError> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .iter_mut()
            .find(|challenge| challenge.id == id)
            .ok_or(RepositoryError::NotFound)?;
        for patch in patches {
            patch.apply(challenge);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<u64, RepositoryError> {
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges.retain(|challenge| challenge.id != id);
        Ok((before - challenges.len()) as u64)
    }
}
