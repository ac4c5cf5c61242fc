use super::{DeviceId, UserId};
use serde::{Deserialize, Serialize};

/// Claims carried by an RS256 access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    pub jti: String,
    pub device: DeviceId,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}
