//! One-time passcode generation.

use anyhow::{ensure, Result};
use rand::{rngs::OsRng, Rng};

pub const DEFAULT_OTP_LENGTH: usize = 6;

/// Source of OTP codes, injected so tests can pin the value.
pub trait OtpGenerator: Send + Sync {
    /// # Errors
    /// Returns an error if a code of the requested length cannot be produced.
    fn generate(&self, length: usize) -> Result<String>;
}

/// Numeric codes with every digit drawn uniformly from the OS RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomOtp;

impl OtpGenerator for RandomOtp {
    fn generate(&self, length: usize) -> Result<String> {
        ensure!(length > 0, "OTP length must be positive");
        let mut rng = OsRng;
        Ok((0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect())
    }
}
