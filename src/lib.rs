//! # Warden
//!
//! `warden` is a small identity service. Users are registered by invitation
//! and own one email ID and one phone number. A contact is proven by
//! answering a one-time code (OTP) delivered by email or SMS; a verified
//! user can then set a password and log in with it.
//!
//! ## Sessions
//!
//! Every successful verification or login returns a signed HS256 token. The
//! token carries the user's id, role and `version`. Both a verification and a
//! password change bump the version, so older tokens stop being accepted for
//! password updates. Only tokens from a verification are marked verified.
//!
//! ## Limits
//!
//! - A contact may request a new code once per challenge window.
//! - Three wrong codes lock the challenge.
//! - Three wrong passwords lock password login. A locked account cannot log
//!   in at all, so only a successful OTP verification clears the lock.

pub mod cli;
pub mod iam;
pub mod warden;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
