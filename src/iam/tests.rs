use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use super::clock::Clock;
use super::memory::MemoryStore;
use super::model::{IdentityType, Invitation, Role, Session};
use super::notification::NotificationGateway;
use super::otp::OtpGenerator;
use super::repository::{UserField, UserRepository};
use super::{AuthService, Contact, IamConfig, IamError, Principal};

const SEED_EMAIL: &str = "admin@x.com";
const SEED_PHONE: &str = "9876543210";

/// Hands out queued codes, then falls back to `123456`.
#[derive(Default)]
struct FixedOtp {
    codes: Mutex<VecDeque<String>>,
}

impl FixedOtp {
    fn push(&self, code: &str) {
        self.codes.lock().unwrap().push_back(code.to_string());
    }
}

impl OtpGenerator for FixedOtp {
    fn generate(&self, _length: usize) -> Result<String> {
        Ok(self
            .codes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "123456".to_string()))
    }
}

struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        }
    }

    fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(Contact, String)>>,
    fail: AtomicBool,
}

impl RecordingGateway {
    fn sent(&self) -> Vec<(Contact, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, contact: Contact, otp: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("provider unavailable");
        }
        self.sent.lock().unwrap().push((contact, otp.to_string()));
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_email_otp(&self, email_id: &str, otp: &str) -> Result<()> {
        self.record(Contact::Email(email_id.to_string()), otp)
    }

    async fn send_sms_otp(&self, phone_number: &str, otp: &str) -> Result<()> {
        self.record(Contact::Phone(phone_number.to_string()), otp)
    }
}

struct Harness {
    service: AuthService,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    gateway: Arc<RecordingGateway>,
    otp: Arc<FixedOtp>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(
            IamConfig::new(
                SEED_EMAIL.to_string(),
                SEED_PHONE.to_string(),
                SecretString::from("test-secret"),
            )
            .with_password_hash_cost(4),
        )
    }

    fn with_config(config: IamConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new());
        let gateway = Arc::new(RecordingGateway::default());
        let otp = Arc::new(FixedOtp::default());

        let service = AuthService::new(store.clone(), store.clone(), gateway.clone(), config)
            .with_otp_generator(otp.clone())
            .with_clock(clock.clone());

        Self {
            service,
            store,
            clock,
            gateway,
            otp,
        }
    }

    async fn seeded() -> Result<Self> {
        let harness = Self::new();
        harness.service.verify_seed_user().await?;
        Ok(harness)
    }

    fn principal(&self, session: &Session) -> Principal {
        self.service
            .tokens()
            .verify(&session.token)
            .map(Principal::Authenticated)
            .unwrap_or_default()
    }

    /// Run a full challenge/verify round for a contact.
    async fn verified_session(&self, contact: Contact, code: &str) -> Result<Session> {
        self.otp.push(code);
        self.service.challenge(contact.clone()).await?;
        Ok(self.service.verify(contact, code).await?)
    }

    async fn set_password(&self, contact: &Contact, password: &str) -> Result<Uuid> {
        let user = self.service.find_user_by_identity(contact).await?;
        let hash = bcrypt::hash(password, 4)?;
        UserRepository::set_field(&*self.store, user.id, UserField::Password(hash)).await?;
        Ok(user.id)
    }
}

fn email(value: &str) -> Contact {
    Contact::Email(value.to_string())
}

fn phone(value: &str) -> Contact {
    Contact::Phone(value.to_string())
}

#[tokio::test]
async fn seed_admin_challenge_and_verify() -> Result<()> {
    let h = Harness::seeded().await?;

    let challenge = h.service.challenge(email(SEED_EMAIL)).await?;
    assert_eq!(challenge.otp, "123456");
    assert_eq!(challenge.created_at, challenge.updated_at);
    assert_eq!(h.gateway.sent(), vec![(email(SEED_EMAIL), "123456".to_string())]);

    let session = h.service.verify(email(SEED_EMAIL), "123456").await?;
    assert_eq!(session.user.version, 1);
    assert_eq!(session.user.role, Role::PlatformAdmin);
    assert_eq!(session.user.name, "Root administrator");

    let claims = h.service.tokens().verify(&session.token)?;
    assert!(claims.verified);
    assert_eq!(claims.user_version, 1);
    assert_eq!(claims.user_id, session.user.id.to_string());

    let again = h.service.verify(email(SEED_EMAIL), "123456").await;
    assert!(matches!(again, Err(IamError::ChallengeNotFound)));
    Ok(())
}

#[tokio::test]
async fn oversized_ttls_still_issue_sessions() -> Result<()> {
    let config = IamConfig::new(
        SEED_EMAIL.to_string(),
        SEED_PHONE.to_string(),
        SecretString::from("test-secret"),
    )
    .with_password_hash_cost(4)
    .with_token_ttl_seconds(9_000_000_000_000)
    .with_challenge_ttl_seconds(i64::MAX);
    let h = Harness::with_config(config);
    h.service.verify_seed_user().await?;

    let session = h.verified_session(email(SEED_EMAIL), "424242").await?;
    assert_eq!(session.user.version, 1);

    let claims = h.service.tokens().verify(&session.token)?;
    let limit = (Utc::now() + Duration::days(366)).timestamp();
    assert!(claims.exp <= limit);

    // resend window is capped at one day
    h.service.challenge(phone(SEED_PHONE)).await?;
    h.clock.advance(Duration::hours(23));
    let throttled = h.service.challenge(phone(SEED_PHONE)).await;
    assert!(matches!(throttled, Err(IamError::TooManyChallengeRequests)));
    h.clock.advance(Duration::hours(1));
    h.service.challenge(phone(SEED_PHONE)).await?;
    Ok(())
}

#[tokio::test]
async fn seed_user_is_created_once() -> Result<()> {
    let h = Harness::seeded().await?;
    h.service.verify_seed_user().await?;

    assert_eq!(h.store.count(&email(SEED_EMAIL)).await?, 1);
    let seed = h.service.find_user_by_identity(&phone(SEED_PHONE)).await?;
    let types: Vec<IdentityType> = seed
        .identities
        .iter()
        .map(|identity| identity.identity_type())
        .collect();
    assert_eq!(types, vec![IdentityType::Email, IdentityType::Phone]);
    assert!(seed.identities.iter().all(|identity| !identity.verified));
    assert!(seed.password_hash.is_empty());
    Ok(())
}

#[tokio::test]
async fn resend_inside_window_is_throttled() -> Result<()> {
    let h = Harness::seeded().await?;
    h.otp.push("111111");
    h.otp.push("222222");

    h.service.challenge(email(SEED_EMAIL)).await?;
    h.clock.advance(Duration::seconds(30));
    let second = h.service.challenge(email(SEED_EMAIL)).await;
    assert!(matches!(second, Err(IamError::TooManyChallengeRequests)));
    assert_eq!(h.gateway.sent().len(), 1);

    h.clock.advance(Duration::seconds(31));
    let reissued = h.service.challenge(email(SEED_EMAIL)).await?;
    assert_eq!(reissued.otp, "222222");
    assert_eq!(reissued.updated_at, h.clock.now());
    assert_ne!(reissued.created_at, reissued.updated_at);

    let stale = h.service.verify(email(SEED_EMAIL), "111111").await;
    assert!(matches!(stale, Err(IamError::VerificationFailed)));
    h.service.verify(email(SEED_EMAIL), "222222").await?;
    Ok(())
}

#[tokio::test]
async fn resend_by_id_reissues_the_code() -> Result<()> {
    let h = Harness::seeded().await?;
    h.otp.push("111111");
    h.otp.push("333333");

    let challenge = h.service.challenge(phone(SEED_PHONE)).await?;
    let early = h.service.resend(challenge.id).await;
    assert!(matches!(early, Err(IamError::TooManyChallengeRequests)));

    h.clock.advance(Duration::seconds(60));
    let resent = h.service.resend(challenge.id).await?;
    assert_eq!(resent.id, challenge.id);
    assert_eq!(resent.otp, "333333");
    assert_eq!(h.gateway.sent().last(), Some(&(phone(SEED_PHONE), "333333".to_string())));

    let missing = h.service.resend(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(IamError::ChallengeNotFound)));
    Ok(())
}

#[tokio::test]
async fn invalid_contact_is_rejected_before_anything_is_stored() -> Result<()> {
    let h = Harness::new();

    let bad_phone = h.service.challenge(phone("5123456789")).await;
    assert!(matches!(bad_phone, Err(IamError::PhoneNumberInvalid)));
    let bad_email = h.service.challenge(email("not-an-email")).await;
    assert!(matches!(bad_email, Err(IamError::EmailIdInvalid)));

    assert!(h.gateway.sent().is_empty());
    let lookup = h.service.find_challenge_by_identity(&phone("5123456789")).await;
    assert!(matches!(lookup, Err(IamError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn three_wrong_codes_burn_the_challenge() -> Result<()> {
    let h = Harness::seeded().await?;
    h.service.challenge(email(SEED_EMAIL)).await?;

    for _ in 0..3 {
        let result = h.service.verify(email(SEED_EMAIL), "000000").await;
        assert!(matches!(result, Err(IamError::VerificationFailed)));
    }
    let challenge = h.service.find_challenge_by_identity(&email(SEED_EMAIL)).await?;
    assert_eq!(challenge.failed_verification_count, 3);

    let fourth = h.service.verify(email(SEED_EMAIL), "123456").await;
    assert!(matches!(fourth, Err(IamError::FailedVerificationLimitExceeded)));

    let after = h.service.verify(email(SEED_EMAIL), "123456").await;
    assert!(matches!(after, Err(IamError::ChallengeNotFound)));
    Ok(())
}

#[tokio::test]
async fn verify_flips_only_the_matching_identity() -> Result<()> {
    let h = Harness::seeded().await?;
    let user_id = h.set_password(&email(SEED_EMAIL), "correct horse").await?;
    UserRepository::set_field(&*h.store, user_id, UserField::FailedAuthAttempts(2)).await?;

    let session = h.verified_session(phone(SEED_PHONE), "654321").await?;
    assert_eq!(session.user.version, 1);
    assert_eq!(session.user.failed_auth_attempts, 0);

    let stored = h.service.find_user_by_identity(&phone(SEED_PHONE)).await?;
    assert_eq!(stored.version, 1);
    assert_eq!(stored.failed_auth_attempts, 0);
    let verified: Vec<(IdentityType, bool)> = stored
        .identities
        .iter()
        .map(|identity| (identity.identity_type(), identity.verified))
        .collect();
    assert_eq!(
        verified,
        vec![(IdentityType::Email, false), (IdentityType::Phone, true)]
    );

    let lookup = h.service.find_challenge_by_identity(&phone(SEED_PHONE)).await;
    assert!(matches!(lookup, Err(IamError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn verify_never_creates_users() -> Result<()> {
    let h = Harness::new();
    h.service.challenge(email("stranger@x.com")).await?;
    let result = h.service.verify(email("stranger@x.com"), "123456").await;
    assert!(matches!(result, Err(IamError::UserNotRegistered)));
    Ok(())
}

#[tokio::test]
async fn delivery_failure_keeps_the_challenge() -> Result<()> {
    let h = Harness::seeded().await?;
    h.gateway.fail.store(true, Ordering::SeqCst);

    let result = h.service.challenge(email(SEED_EMAIL)).await;
    assert!(matches!(result, Err(IamError::Internal(_))));

    let challenge = h.service.find_challenge_by_identity(&email(SEED_EMAIL)).await?;
    assert_eq!(challenge.otp, "123456");
    Ok(())
}

#[tokio::test]
async fn login_locks_after_three_failures() -> Result<()> {
    let h = Harness::seeded().await?;
    h.set_password(&email(SEED_EMAIL), "correct horse").await?;

    for _ in 0..3 {
        let result = h.service.login(email(SEED_EMAIL), "wrong").await;
        assert!(matches!(result, Err(IamError::CredentialsInvalid)));
    }
    let user = h.service.find_user_by_identity(&email(SEED_EMAIL)).await?;
    assert_eq!(user.failed_auth_attempts, 3);

    let locked = h.service.login(email(SEED_EMAIL), "correct horse").await;
    assert!(matches!(locked, Err(IamError::FailedLoginLimitExceeded)));

    // only a fresh OTP verification lifts the lock
    let verified = h.verified_session(email(SEED_EMAIL), "111111").await?;
    assert_eq!(verified.user.failed_auth_attempts, 0);
    let session = h.service.login(email(SEED_EMAIL), "correct horse").await?;
    assert_eq!(session.user.version, verified.user.version);
    Ok(())
}

#[tokio::test]
async fn successful_login_resets_failures() -> Result<()> {
    let h = Harness::seeded().await?;
    h.set_password(&phone(SEED_PHONE), "correct horse").await?;

    for _ in 0..2 {
        let result = h.service.login(phone(SEED_PHONE), "wrong").await;
        assert!(matches!(result, Err(IamError::CredentialsInvalid)));
    }

    let session = h.service.login(phone(SEED_PHONE), "correct horse").await?;
    assert_eq!(session.user.failed_auth_attempts, 0);
    let stored = h.service.find_user_by_identity(&phone(SEED_PHONE)).await?;
    assert_eq!(stored.failed_auth_attempts, 0);

    let claims = h.service.tokens().verify(&session.token)?;
    assert!(!claims.verified);
    assert_eq!(claims.role, Some(Role::PlatformAdmin));
    Ok(())
}

#[tokio::test]
async fn login_requires_a_known_verified_user() -> Result<()> {
    let h = Harness::seeded().await?;

    let unknown = h.service.login(email("nobody@x.com"), "secret").await;
    assert!(matches!(unknown, Err(IamError::UserNotFound)));

    let incomplete = h.service.login(email(SEED_EMAIL), "secret").await;
    assert!(matches!(incomplete, Err(IamError::UserVerificationIncomplete)));
    Ok(())
}

#[tokio::test]
async fn password_update_after_fresh_verification() -> Result<()> {
    let h = Harness::seeded().await?;
    let session = h.verified_session(email(SEED_EMAIL), "123456").await?;
    let principal = h.principal(&session);

    let updated = h
        .service
        .update_password(&principal, session.user.id, "new password")
        .await?;
    assert!(updated);

    let stored = h.service.find_user_by_identity(&email(SEED_EMAIL)).await?;
    assert_eq!(stored.version, 2);

    let login = h.service.login(email(SEED_EMAIL), "new password").await?;
    assert_eq!(login.user.id, session.user.id);

    // The same token is now one version behind.
    let replay = h
        .service
        .update_password(&principal, session.user.id, "another")
        .await;
    assert!(matches!(replay, Err(IamError::Unauthorised)));
    Ok(())
}

#[tokio::test]
async fn password_update_rejects_stale_and_unverified_tokens() -> Result<()> {
    let h = Harness::seeded().await?;
    let session = h.verified_session(email(SEED_EMAIL), "123456").await?;

    // A second verification bumps the version behind the first token's back.
    h.verified_session(phone(SEED_PHONE), "654321").await?;
    let stale = h
        .service
        .update_password(&h.principal(&session), session.user.id, "new password")
        .await;
    assert!(matches!(stale, Err(IamError::Unauthorised)));

    h.set_password(&email(SEED_EMAIL), "correct horse").await?;
    let login = h.service.login(email(SEED_EMAIL), "correct horse").await?;
    let unverified = h
        .service
        .update_password(&h.principal(&login), login.user.id, "new password")
        .await;
    assert!(matches!(unverified, Err(IamError::Unauthorised)));

    let anonymous = h
        .service
        .update_password(&Principal::Anonymous, login.user.id, "new password")
        .await;
    assert!(matches!(anonymous, Err(IamError::Unauthorised)));
    Ok(())
}

#[tokio::test]
async fn password_update_for_another_user_is_forbidden() -> Result<()> {
    let h = Harness::seeded().await?;
    let admin = h.verified_session(email(SEED_EMAIL), "123456").await?;
    let admin_principal = h.principal(&admin);

    let merchant = h
        .service
        .invite(
            &admin_principal,
            Invitation {
                name: "Merchant".to_string(),
                email_id: "merchant@x.com".to_string(),
                phone_number: "9123456789".to_string(),
                role: Role::MerchantAdmin,
            },
        )
        .await?;
    h.verified_session(email("merchant@x.com"), "777777").await?;

    // Both users are at version 1, so only the ownership check can fail.
    let result = h
        .service
        .update_password(&admin_principal, merchant.id, "takeover")
        .await;
    assert!(matches!(result, Err(IamError::Forbidden)));

    let missing = h
        .service
        .update_password(&admin_principal, Uuid::new_v4(), "takeover")
        .await;
    assert!(matches!(missing, Err(IamError::UserNotFound)));
    Ok(())
}

#[tokio::test]
async fn invite_requires_platform_admin() -> Result<()> {
    let h = Harness::seeded().await?;
    let invitation = Invitation {
        name: "Merchant".to_string(),
        email_id: "merchant@x.com".to_string(),
        phone_number: "9123456789".to_string(),
        role: Role::MerchantAdmin,
    };

    let anonymous = h
        .service
        .invite(&Principal::Anonymous, invitation.clone())
        .await;
    assert!(matches!(anonymous, Err(IamError::Unauthorised)));

    let admin = h.verified_session(email(SEED_EMAIL), "123456").await?;
    let admin_principal = h.principal(&admin);
    let merchant = h.service.invite(&admin_principal, invitation.clone()).await?;
    assert_eq!(merchant.role, Role::MerchantAdmin);
    assert_eq!(merchant.version, 0);
    assert!(merchant.password_hash.is_empty());
    assert_eq!(merchant.identities.len(), 2);

    let merchant_session = h.verified_session(phone("9123456789"), "888888").await?;
    let forbidden = h
        .service
        .invite(
            &h.principal(&merchant_session),
            Invitation {
                email_id: "other@x.com".to_string(),
                phone_number: "9000000001".to_string(),
                ..invitation
            },
        )
        .await;
    assert!(matches!(forbidden, Err(IamError::Forbidden)));
    Ok(())
}

#[tokio::test]
async fn invite_rejects_taken_or_invalid_contacts() -> Result<()> {
    let h = Harness::seeded().await?;
    let admin = h.verified_session(email(SEED_EMAIL), "123456").await?;
    let principal = h.principal(&admin);
    let invitation = |email_id: &str, phone_number: &str| Invitation {
        name: "Merchant".to_string(),
        email_id: email_id.to_string(),
        phone_number: phone_number.to_string(),
        role: Role::MerchantAdmin,
    };

    let taken_phone = h
        .service
        .invite(&principal, invitation("fresh@x.com", SEED_PHONE))
        .await;
    assert!(matches!(taken_phone, Err(IamError::UserAlreadyExists)));

    let taken_email = h
        .service
        .invite(&principal, invitation(SEED_EMAIL, "9123456789"))
        .await;
    assert!(matches!(taken_email, Err(IamError::UserAlreadyExists)));

    let bad_phone = h
        .service
        .invite(&principal, invitation("fresh@x.com", "12345"))
        .await;
    assert!(matches!(bad_phone, Err(IamError::PhoneNumberInvalid)));

    let bad_email = h
        .service
        .invite(&principal, invitation("fresh@", "9123456789"))
        .await;
    assert!(matches!(bad_email, Err(IamError::EmailIdInvalid)));

    assert!(!h.service.does_phone_number_exist("9123456789").await?);
    assert!(h.service.does_phone_number_exist(SEED_PHONE).await?);
    assert!(h.service.does_email_id_exist(SEED_EMAIL).await?);
    Ok(())
}

#[tokio::test]
async fn find_me_and_find_user() -> Result<()> {
    let h = Harness::seeded().await?;

    let anonymous = h.service.find_me(&Principal::Anonymous).await;
    assert!(matches!(anonymous, Err(IamError::Unauthorised)));

    let session = h.verified_session(email(SEED_EMAIL), "123456").await?;
    let principal = h.principal(&session);
    let me = h.service.find_me(&principal).await?;
    assert_eq!(me.id, session.user.id);

    let found = h.service.find_user(&principal, session.user.id).await?;
    assert_eq!(found.name, "Root administrator");

    let missing = h.service.find_user(&principal, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(IamError::UserNotFound)));

    let anonymous = h
        .service
        .find_user(&Principal::Anonymous, session.user.id)
        .await;
    assert!(matches!(anonymous, Err(IamError::Unauthorised)));
    Ok(())
}
