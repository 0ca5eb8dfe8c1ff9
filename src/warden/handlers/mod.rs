pub mod health;
pub use self::health::health;

pub mod identity;
pub mod users;

use uuid::Uuid;

use super::error::ApiError;
use super::middleware::RequestId;
use crate::iam::IamError;

/// Path ids must be UUIDs; anything else is `IdInvalid`.
fn parse_id(value: &str, request_id: &RequestId) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::new(IamError::IdInvalid, request_id))
}
