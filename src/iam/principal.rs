//! The caller on whose behalf an operation runs.

use super::error::IamError;
use super::model::Role;
use super::token::Claims;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Principal {
    /// No bearer token was presented.
    #[default]
    Anonymous,
    Authenticated(Claims),
}

impl Principal {
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(claims) => Some(claims),
        }
    }

    /// Require a session whose role is one of `roles`.
    ///
    /// # Errors
    /// `Unauthorised` without claims or with an empty user id, `Forbidden` for any other role.
    pub fn verify_session(&self, roles: &[Role]) -> Result<&Claims, IamError> {
        let claims = self
            .claims()
            .filter(|claims| !claims.user_id.is_empty())
            .ok_or(IamError::Unauthorised)?;

        match claims.role {
            Some(role) if roles.contains(&role) => Ok(claims),
            _ => Err(IamError::Forbidden),
        }
    }

    /// Require claims naming both a user and a role, whatever the role is.
    ///
    /// # Errors
    /// `Unauthorised` otherwise.
    pub fn verify_action_token(&self) -> Result<&Claims, IamError> {
        self.claims()
            .filter(|claims| !claims.user_id.is_empty() && claims.role.is_some())
            .ok_or(IamError::Unauthorised)
    }
}
