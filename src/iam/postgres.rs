//! Postgres-backed store.
//!
//! Identities live in their own table keyed by `(user_id, kind)`, so an
//! identity patch addresses the row by type. Compound patches run inside one
//! transaction that first locks the target row.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Challenge, Contact, Identity, IdentityType, NewChallenge, NewUser, Role, User};
use super::repository::{
    ChallengeCounter, ChallengeField, ChallengePatch, ChallengeRepository, RepositoryError,
    UserCounter, UserField, UserPatch, UserRepository,
};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or the schema cannot be applied.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply database schema")?;
        info!("Database schema is up to date");
        Ok(())
    }

    async fn load_user(&self, id: Uuid) -> Result<User, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, role, name, version, failed_auth_attempts, password_hash
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let identities = sqlx::query(
            "SELECT kind, value, verified FROM identities WHERE user_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(identity_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        user_from_row(&row, identities)
    }
}

fn decode_error(message: String) -> RepositoryError {
    RepositoryError::Backend(anyhow!(message))
}

fn contact_from_columns(kind: &str, value: String) -> Result<Contact, RepositoryError> {
    match IdentityType::parse(kind) {
        Ok(IdentityType::Email) => Ok(Contact::Email(value)),
        Ok(IdentityType::Phone) => Ok(Contact::Phone(value)),
        Err(_) => Err(decode_error(format!("invalid identity kind: {kind}"))),
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    Ok(Identity {
        verified: row.try_get("verified")?,
        contact: contact_from_columns(&kind, row.try_get("value")?)?,
    })
}

fn user_from_row(row: &PgRow, identities: Vec<Identity>) -> Result<User, RepositoryError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        role: Role::parse(&role).map_err(|_| decode_error(format!("invalid role: {role}")))?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        failed_auth_attempts: row.try_get("failed_auth_attempts")?,
        password_hash: row.try_get("password_hash")?,
        identities,
    })
}

fn challenge_from_row(row: &PgRow) -> Result<Challenge, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    Ok(Challenge {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        contact: contact_from_columns(&kind, row.try_get("value")?)?,
        otp: row.try_get("otp")?,
        failed_verification_count: row.try_get("failed_verification_count")?,
    })
}

async fn apply_user_patch(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    patch: &UserPatch,
) -> Result<(), RepositoryError> {
    let result = match patch {
        UserPatch::Set(UserField::IdentityVerified(identity_type, verified)) => {
            sqlx::query("UPDATE identities SET verified = $3 WHERE user_id = $1 AND kind = $2")
                .bind(id)
                .bind(identity_type.as_str())
                .bind(*verified)
                .execute(&mut **tx)
                .await?
        }
        UserPatch::Set(UserField::FailedAuthAttempts(value)) => {
            sqlx::query("UPDATE users SET failed_auth_attempts = $2 WHERE id = $1")
                .bind(id)
                .bind(*value)
                .execute(&mut **tx)
                .await?
        }
        UserPatch::Set(UserField::Password(hash)) => {
            sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                .bind(id)
                .bind(hash)
                .execute(&mut **tx)
                .await?
        }
        UserPatch::Increment(UserCounter::Version, delta) => {
            sqlx::query("UPDATE users SET version = version + $2 WHERE id = $1")
                .bind(id)
                .bind(*delta)
                .execute(&mut **tx)
                .await?
        }
        UserPatch::Increment(UserCounter::FailedAuthAttempts, delta) => {
            sqlx::query(
                "UPDATE users SET failed_auth_attempts = failed_auth_attempts + $2 WHERE id = $1",
            )
            .bind(id)
            .bind(*delta)
            .execute(&mut **tx)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

async fn apply_challenge_patch(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    patch: &ChallengePatch,
) -> Result<(), RepositoryError> {
    let result = match patch {
        ChallengePatch::Set(ChallengeField::Otp(otp)) => {
            sqlx::query("UPDATE challenges SET otp = $2 WHERE id = $1")
                .bind(id)
                .bind(otp)
                .execute(&mut **tx)
                .await?
        }
        ChallengePatch::Set(ChallengeField::UpdatedAt(at)) => {
            sqlx::query("UPDATE challenges SET updated_at = $2 WHERE id = $1")
                .bind(id)
                .bind(*at)
                .execute(&mut **tx)
                .await?
        }
        ChallengePatch::Increment(ChallengeCounter::FailedVerificationCount, delta) => {
            sqlx::query(
                r"
                UPDATE challenges
                SET failed_verification_count = failed_verification_count + $2
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(*delta)
            .execute(&mut **tx)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl UserRepository for PgStore {
    async fn count(&self, filter: &Contact) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM identities WHERE kind = $1 AND value = $2")
                .bind(filter.identity_type().as_str())
                .bind(filter.value())
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn create(&self, draft: NewUser) -> Result<User, RepositoryError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (id, role, name) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(draft.role.as_str())
            .bind(&draft.name)
            .execute(&mut *tx)
            .await?;

        for (position, identity) in (0_i32..).zip(draft.identities.iter()) {
            sqlx::query(
                r"
                INSERT INTO identities (user_id, kind, value, verified, position)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(id)
            .bind(identity.identity_type().as_str())
            .bind(identity.contact.value())
            .bind(identity.verified)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(user_id = %id, "Created user");

        Ok(User {
            id,
            role: draft.role,
            name: draft.name,
            version: 0,
            failed_auth_attempts: 0,
            password_hash: String::new(),
            identities: draft.identities,
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        self.load_user(id).await
    }

    async fn find_one(&self, filter: &Contact) -> Result<User, RepositoryError> {
        let user_id: Uuid =
            sqlx::query_scalar("SELECT user_id FROM identities WHERE kind = $1 AND value = $2")
                .bind(filter.identity_type().as_str())
                .bind(filter.value())
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepositoryError::NotFound)?;
        self.load_user(user_id).await
    }

    async fn patch(&self, id: Uuid, patches: &[UserPatch]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        // Dropping `tx` on error rolls back the patches applied so far.
        for patch in patches {
            apply_user_patch(&mut tx, id, patch).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeRepository for PgStore {
    async fn create(&self, draft: NewChallenge) -> Result<Challenge, RepositoryError> {
        let challenge = Challenge {
            id: Uuid::new_v4(),
            created_at: draft.created_at,
            updated_at: draft.created_at,
            contact: draft.contact,
            otp: draft.otp,
            failed_verification_count: 0,
        };

        sqlx::query(
            r"
            INSERT INTO challenges (id, kind, value, otp, failed_verification_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $5)
            ",
        )
        .bind(challenge.id)
        .bind(challenge.identity_type().as_str())
        .bind(challenge.contact.value())
        .bind(&challenge.otp)
        .bind(challenge.created_at)
        .execute(&self.pool)
        .await?;

        Ok(challenge)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Challenge, RepositoryError> {
        let row = sqlx::query("SELECT * FROM challenges WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        challenge_from_row(&row)
    }

    async fn find_one(&self, contact: &Contact) -> Result<Challenge, RepositoryError> {
        let row = sqlx::query("SELECT * FROM challenges WHERE kind = $1 AND value = $2")
            .bind(contact.identity_type().as_str())
            .bind(contact.value())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        challenge_from_row(&row)
    }

    async fn patch(&self, id: Uuid, patches: &[ChallengePatch]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for patch in patches {
            apply_challenge_patch(&mut tx, id, patch).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM challenges WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
