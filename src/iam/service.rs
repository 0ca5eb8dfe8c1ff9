//! Challenge issuance, OTP verification, password login and the user
//! mutations gated by session tokens.
//!
//! All cross-request state lives in the repositories. Failed attempts are
//! recorded before the failure is returned, so a caller never sees a domain
//! error for an attempt the store did not count.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::config::IamConfig;
use super::error::IamError;
use super::model::{
    Challenge, Contact, Identity, Invitation, NewChallenge, NewUser, Role, Session, User,
};
use super::notification::NotificationGateway;
use super::otp::{OtpGenerator, RandomOtp};
use super::principal::Principal;
use super::repository::{
    ChallengeCounter, ChallengeField, ChallengeRepository, RepositoryError, UserCounter,
    UserField, UserPatch, UserRepository,
};
use super::token::TokenIssuer;

/// Wrong OTPs tolerated before a challenge is discarded.
pub const MAX_FAILED_VERIFICATIONS: i64 = 3;
/// Wrong passwords tolerated before login is locked.
pub const MAX_FAILED_LOGINS: i64 = 3;

const SEED_USER_NAME: &str = "Root administrator";

fn or_not_found(error: RepositoryError, not_found: IamError) -> IamError {
    match error {
        RepositoryError::NotFound => not_found,
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    challenges: Arc<dyn ChallengeRepository>,
    notifier: Arc<dyn NotificationGateway>,
    otp: Arc<dyn OtpGenerator>,
    clock: Arc<dyn Clock>,
    tokens: TokenIssuer,
    config: IamConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        challenges: Arc<dyn ChallengeRepository>,
        notifier: Arc<dyn NotificationGateway>,
        config: IamConfig,
    ) -> Self {
        let tokens = TokenIssuer::new(config.token_secret(), config.token_ttl());
        Self {
            users,
            challenges,
            notifier,
            otp: Arc::new(RandomOtp),
            clock: Arc::new(SystemClock),
            tokens,
            config,
        }
    }

    #[must_use]
    pub fn with_otp_generator(mut self, otp: Arc<dyn OtpGenerator>) -> Self {
        self.otp = otp;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IamConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Start (or restart) an OTP challenge for a contact and deliver the code.
    ///
    /// # Errors
    /// `EmailIdInvalid`/`PhoneNumberInvalid` for malformed contacts,
    /// `TooManyChallengeRequests` inside the resend window, internal errors
    /// for store or delivery failures.
    #[instrument(skip_all, fields(identity_type = contact.identity_type().as_str()))]
    pub async fn challenge(&self, contact: Contact) -> Result<Challenge, IamError> {
        contact.validate()?;

        match self.challenges.find_one(&contact).await {
            Ok(existing) => self.reissue(existing).await,
            Err(RepositoryError::NotFound) => self.open_challenge(contact).await,
            Err(err) => Err(anyhow::Error::new(err)
                .context("could not look up the open challenge")
                .into()),
        }
    }

    /// Re-send the code of an open challenge, subject to the same resend window.
    ///
    /// # Errors
    /// `ChallengeNotFound` when no challenge has `challenge_id`.
    #[instrument(skip(self))]
    pub async fn resend(&self, challenge_id: Uuid) -> Result<Challenge, IamError> {
        let existing = self
            .challenges
            .find_by_id(challenge_id)
            .await
            .map_err(|err| or_not_found(err, IamError::ChallengeNotFound))?;
        self.reissue(existing).await
    }

    async fn open_challenge(&self, contact: Contact) -> Result<Challenge, IamError> {
        let otp = self.otp.generate(self.config.otp_length())?;
        let challenge = self
            .challenges
            .create(NewChallenge {
                created_at: self.clock.now(),
                contact,
                otp: otp.clone(),
            })
            .await
            .map_err(|err| match err {
                // Another request opened it between our lookup and insert.
                RepositoryError::Conflict => IamError::TooManyChallengeRequests,
                other => anyhow::Error::new(other)
                    .context("could not save the challenge")
                    .into(),
            })?;

        self.deliver(&challenge.contact, &otp).await?;
        info!(challenge_id = %challenge.id, "Challenge opened");
        Ok(challenge)
    }

    async fn reissue(&self, mut challenge: Challenge) -> Result<Challenge, IamError> {
        let now = self.clock.now();
        if now - challenge.updated_at < self.config.challenge_ttl() {
            warn!(challenge_id = %challenge.id, "Challenge requested again inside the resend window");
            return Err(IamError::TooManyChallengeRequests);
        }

        let otp = self.otp.generate(self.config.otp_length())?;
        self.challenges
            .set_fields(
                challenge.id,
                vec![
                    ChallengeField::Otp(otp.clone()),
                    ChallengeField::UpdatedAt(now),
                ],
            )
            .await
            .context("could not store the new challenge code")?;
        challenge.otp.clone_from(&otp);
        challenge.updated_at = now;

        self.deliver(&challenge.contact, &otp).await?;
        info!(challenge_id = %challenge.id, "Challenge code re-issued");
        Ok(challenge)
    }

    /// The stored challenge keeps its new code even when delivery fails.
    async fn deliver(&self, contact: &Contact, otp: &str) -> Result<(), IamError> {
        self.notifier.send_otp(contact, otp).await.map_err(|err| {
            error!(error = %err, "OTP delivery failed");
            IamError::Internal(err)
        })
    }

    /// Exchange the code of an open challenge for a verified session.
    ///
    /// # Errors
    /// `ChallengeNotFound`, `FailedVerificationLimitExceeded`,
    /// `VerificationFailed` or `UserNotRegistered`.
    #[instrument(skip_all, fields(identity_type = contact.identity_type().as_str()))]
    pub async fn verify(&self, contact: Contact, otp: &str) -> Result<Session, IamError> {
        let challenge = self
            .challenges
            .find_one(&contact)
            .await
            .map_err(|err| or_not_found(err, IamError::ChallengeNotFound))?;

        if challenge.failed_verification_count >= MAX_FAILED_VERIFICATIONS {
            self.challenges
                .delete(challenge.id)
                .await
                .context("could not discard the exhausted challenge")?;
            warn!(challenge_id = %challenge.id, "Challenge discarded after too many failures");
            return Err(IamError::FailedVerificationLimitExceeded);
        }

        if challenge.otp != otp {
            self.challenges
                .increment_field(challenge.id, ChallengeCounter::FailedVerificationCount, 1)
                .await
                .context("could not record the failed verification")?;
            return Err(IamError::VerificationFailed);
        }

        let mut user = self
            .users
            .find_one(&contact)
            .await
            .map_err(|err| or_not_found(err, IamError::UserNotRegistered))?;

        let patches = [
            UserPatch::Set(UserField::IdentityVerified(contact.identity_type(), true)),
            UserPatch::Set(UserField::FailedAuthAttempts(0)),
            UserPatch::Increment(UserCounter::Version, 1),
        ];
        for patch in &patches {
            patch.apply(&mut user)?;
        }
        let token = self.tokens.issue(&user, true)?;

        self.users
            .patch(user.id, &patches)
            .await
            .context("could not update the user")?;

        self.challenges
            .delete(challenge.id)
            .await
            .context("could not delete the used challenge")?;

        info!(user_id = %user.id, version = user.version, "Identity verified");
        Ok(Session { user, token })
    }

    /// Password login. The session it returns is never marked verified.
    ///
    /// # Errors
    /// `UserNotFound`, `FailedLoginLimitExceeded`, `UserVerificationIncomplete`
    /// or `CredentialsInvalid`.
    #[instrument(skip_all, fields(identity_type = contact.identity_type().as_str()))]
    pub async fn login(&self, contact: Contact, password: &str) -> Result<Session, IamError> {
        let mut user = self
            .users
            .find_one(&contact)
            .await
            .map_err(|err| or_not_found(err, IamError::UserNotFound))?;

        if user.failed_auth_attempts >= MAX_FAILED_LOGINS {
            return Err(IamError::FailedLoginLimitExceeded);
        }

        if user.password_hash.is_empty() {
            return Err(IamError::UserVerificationIncomplete);
        }

        if !check_password(&user, password).await? {
            self.users
                .increment_field(user.id, UserCounter::FailedAuthAttempts, 1)
                .await
                .context("could not record the failed login")?;
            warn!(user_id = %user.id, "Invalid credentials");
            return Err(IamError::CredentialsInvalid);
        }

        if user.failed_auth_attempts > 0 {
            self.users
                .set_field(user.id, UserField::FailedAuthAttempts(0))
                .await
                .context("could not reset the failed login count")?;
            user.failed_auth_attempts = 0;
        }

        let token = self.tokens.issue(&user, false)?;
        info!(user_id = %user.id, "Logged in");
        Ok(Session { user, token })
    }

    /// Set a new password using a token from a fresh OTP verification.
    ///
    /// # Errors
    /// `Unauthorised` for missing, stale or unverified tokens, `UserNotFound`,
    /// `Forbidden` when the token belongs to another user.
    #[instrument(skip(self, principal, password))]
    pub async fn update_password(
        &self,
        principal: &Principal,
        user_id: Uuid,
        password: &str,
    ) -> Result<bool, IamError> {
        let claims = principal.verify_action_token()?;

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(|err| or_not_found(err, IamError::UserNotFound))?;

        if claims.user_version != user.version || !claims.verified {
            return Err(IamError::Unauthorised);
        }

        if claims.user_id != user.id.to_string() {
            return Err(IamError::Forbidden);
        }

        let hash = hash_password(password, self.config.password_hash_cost()).await?;
        self.users
            .patch(
                user.id,
                &[
                    UserPatch::Set(UserField::Password(hash)),
                    UserPatch::Increment(UserCounter::Version, 1),
                ],
            )
            .await
            .context("could not store the new password")?;

        info!(user_id = %user.id, "Password updated");
        Ok(true)
    }

    /// Create an unverified user with both contacts attached.
    ///
    /// # Errors
    /// `Forbidden` unless the caller is a platform admin, `*Invalid` for bad
    /// contacts, `UserAlreadyExists` when either contact is taken.
    #[instrument(skip_all, fields(role = invitation.role.as_str()))]
    pub async fn invite(
        &self,
        principal: &Principal,
        invitation: Invitation,
    ) -> Result<User, IamError> {
        principal.verify_session(&[Role::PlatformAdmin])?;

        let email = Contact::Email(invitation.email_id.trim().to_string());
        let phone = Contact::Phone(invitation.phone_number.trim().to_string());
        email.validate()?;
        phone.validate()?;

        if self.does_phone_number_exist(phone.value()).await?
            || self.does_email_id_exist(email.value()).await?
        {
            return Err(IamError::UserAlreadyExists);
        }

        let draft = NewUser::new(
            invitation.role,
            invitation.name,
            vec![Identity::unverified(email), Identity::unverified(phone)],
        );
        let user = self.users.create(draft).await.map_err(|err| match err {
            RepositoryError::Conflict => IamError::UserAlreadyExists,
            other => anyhow::Error::new(other)
                .context("could not save the invited user")
                .into(),
        })?;

        info!(user_id = %user.id, "User invited");
        Ok(user)
    }

    /// Create the bootstrap administrator unless a user already owns the seed email.
    ///
    /// # Errors
    /// Invalid seed contacts or store failures.
    #[instrument(skip(self))]
    pub async fn verify_seed_user(&self) -> Result<(), IamError> {
        let email = Contact::Email(self.config.seed_email_id().to_string());
        let phone = Contact::Phone(self.config.seed_phone_number().to_string());
        email.validate()?;
        phone.validate()?;

        if self.does_email_id_exist(email.value()).await? {
            return Ok(());
        }

        let draft = NewUser::new(
            Role::PlatformAdmin,
            SEED_USER_NAME.to_string(),
            vec![Identity::unverified(email), Identity::unverified(phone)],
        );
        let user = self
            .users
            .create(draft)
            .await
            .context("could not create the seed user")?;
        info!(user_id = %user.id, "Seed user created");
        Ok(())
    }

    /// # Errors
    /// `Unauthorised` for anonymous callers, `UserNotFound` if the caller no longer exists.
    #[instrument(skip_all)]
    pub async fn find_me(&self, principal: &Principal) -> Result<User, IamError> {
        let claims = principal
            .claims()
            .filter(|claims| !claims.user_id.is_empty())
            .ok_or(IamError::Unauthorised)?;
        let id = Uuid::parse_str(&claims.user_id).map_err(|_| IamError::UserNotFound)?;

        self.users
            .find_by_id(id)
            .await
            .map_err(|err| or_not_found(err, IamError::UserNotFound))
    }

    /// # Errors
    /// `Unauthorised`/`Forbidden` from the session check, `UserNotFound`.
    #[instrument(skip(self, principal))]
    pub async fn find_user(&self, principal: &Principal, id: Uuid) -> Result<User, IamError> {
        principal.verify_session(&[Role::PlatformAdmin, Role::MerchantAdmin])?;

        self.users
            .find_by_id(id)
            .await
            .map_err(|err| or_not_found(err, IamError::UserNotFound))
    }

    /// # Errors
    /// `NotFound` when no user has the contact.
    pub async fn find_user_by_identity(&self, contact: &Contact) -> Result<User, IamError> {
        Ok(self.users.find_one(contact).await?)
    }

    /// # Errors
    /// `NotFound` when no challenge is open for the contact.
    pub async fn find_challenge_by_identity(
        &self,
        contact: &Contact,
    ) -> Result<Challenge, IamError> {
        Ok(self.challenges.find_one(contact).await?)
    }

    /// # Errors
    /// Store failures.
    pub async fn does_phone_number_exist(&self, phone_number: &str) -> Result<bool, IamError> {
        let count = self
            .users
            .count(&Contact::Phone(phone_number.to_string()))
            .await
            .context("could not count the users with the given phone number")?;
        Ok(count > 0)
    }

    /// # Errors
    /// Store failures.
    pub async fn does_email_id_exist(&self, email_id: &str) -> Result<bool, IamError> {
        let count = self
            .users
            .count(&Contact::Email(email_id.to_string()))
            .await
            .context("could not count the users with the given email ID")?;
        Ok(count > 0)
    }
}

async fn check_password(user: &User, password: &str) -> Result<bool, IamError> {
    let user = user.clone();
    let password = password.to_string();
    let matches = tokio::task::spawn_blocking(move || user.equals_password(&password))
        .await
        .context("password check task failed")?;
    Ok(matches)
}

async fn hash_password(password: &str, cost: u32) -> Result<String, IamError> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("could not hash the password")?;
    Ok(hash)
}
