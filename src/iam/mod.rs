//! Identity core: OTP challenges, password login and signed sessions.
//!
//! [`service::AuthService`] orchestrates everything; it reads and writes
//! through the [`repository`] traits and hands codes to a
//! [`notification::NotificationGateway`]. Callers are represented by a typed
//! [`principal::Principal`] decoded from the bearer token.

pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod notification;
pub mod otp;
pub mod postgres;
pub mod principal;
pub mod repository;
pub mod service;
pub mod token;
pub mod validation;

#[cfg(test)]
mod tests;

pub use config::IamConfig;
pub use error::IamError;
pub use model::{Challenge, Contact, IdentityType, Invitation, Role, Session, User};
pub use principal::Principal;
pub use service::AuthService;
