use super::AuthError;
use jsonwebtoken::DecodingKey;
use std::sync::Arc;

/// Supplies the public key access tokens are checked against.
#[async_trait::async_trait]
pub trait VerificationKeySource: Send + Sync {
    async fn verification_key(&self) -> Result<Arc<DecodingKey>, AuthError>;

    /// A token failed signature verification against the current key.
    fn signature_rejected(&self) {}
}
