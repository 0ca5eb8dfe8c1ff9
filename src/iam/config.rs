//! Settings consumed by the identity core.

use chrono::Duration;
use secrecy::SecretString;

use super::otp::DEFAULT_OTP_LENGTH;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 60;
const DEFAULT_PASSWORD_HASH_COST: u32 = 14;

/// Upper bound for session token lifetime: one year.
pub const MAX_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
/// Upper bound for the challenge resend window: one day.
pub const MAX_CHALLENGE_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct IamConfig {
    seed_email_id: String,
    seed_phone_number: String,
    token_secret: SecretString,
    token_ttl_seconds: i64,
    challenge_ttl_seconds: i64,
    password_hash_cost: u32,
    otp_length: usize,
}

impl IamConfig {
    #[must_use]
    pub fn new(seed_email_id: String, seed_phone_number: String, token_secret: SecretString) -> Self {
        Self {
            seed_email_id,
            seed_phone_number,
            token_secret,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            password_hash_cost: DEFAULT_PASSWORD_HASH_COST,
            otp_length: DEFAULT_OTP_LENGTH,
        }
    }

    /// Clamped to `1..=MAX_TOKEN_TTL_SECONDS`.
    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds.clamp(1, MAX_TOKEN_TTL_SECONDS);
        self
    }

    /// Clamped to `0..=MAX_CHALLENGE_TTL_SECONDS`.
    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds.clamp(0, MAX_CHALLENGE_TTL_SECONDS);
        self
    }

    /// bcrypt cost; clamped to the range bcrypt accepts.
    #[must_use]
    pub fn with_password_hash_cost(mut self, cost: u32) -> Self {
        self.password_hash_cost = cost.clamp(4, 31);
        self
    }

    #[must_use]
    pub fn with_otp_length(mut self, length: usize) -> Self {
        self.otp_length = length.max(1);
        self
    }

    #[must_use]
    pub fn seed_email_id(&self) -> &str {
        &self.seed_email_id
    }

    #[must_use]
    pub fn seed_phone_number(&self) -> &str {
        &self.seed_phone_number
    }

    #[must_use]
    pub fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::try_seconds(self.token_ttl_seconds).unwrap_or_else(Duration::zero)
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> Duration {
        Duration::try_seconds(self.challenge_ttl_seconds).unwrap_or_else(Duration::zero)
    }

    #[must_use]
    pub fn password_hash_cost(&self) -> u32 {
        self.password_hash_cost
    }

    #[must_use]
    pub fn otp_length(&self) -> usize {
        self.otp_length
    }
}
