use super::authenticated_cipher::{AuthenticatedCipher, CipherError};
use super::token_issuer::TOKEN_SEPARATOR;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies RS256 access tokens against whatever key `key_source` trusts.
pub struct AccessTokenValidator {
    key_source: Arc<dyn VerificationKeySource>,
    validation: Validation,
}

impl AccessTokenValidator {
    pub fn new(
        key_source: Arc<dyn VerificationKeySource>,
        issuer: &str,
        audience: &str,
    ) -> Self {
        // Only RS256 is accepted; a token whose header names any other
        // algorithm is rejected before its signature is looked at.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        Self {
            key_source,
            validation,
        }
    }

    pub async fn validate(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let key = self.key_source.verification_key().await?;
        match decode::<AccessClaims>(token, &key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => Err(match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => {
                    warn!("access token signature rejected by current key");
                    self.key_source.signature_rejected();
                    AuthError::SignatureInvalid
                }
                kind => {
                    debug!(?kind, "access token rejected");
                    AuthError::TokenInvalid
                }
            }),
        }
    }
}

/// A refresh token that decrypted cleanly and matches its live store record.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub key: SessionKey,
    /// The presented ciphertext, URL-unescaped; equal to the stored record.
    pub token: String,
}

pub struct TokenValidator {
    access: Arc<AccessTokenValidator>,
    cipher: Arc<AuthenticatedCipher>,
    session_store: Arc<dyn SessionStore>,
}

impl TokenValidator {
    pub fn new(
        access: Arc<AccessTokenValidator>,
        cipher: Arc<AuthenticatedCipher>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            access,
            cipher,
            session_store,
        }
    }

    pub fn access(&self) -> &Arc<AccessTokenValidator> {
        &self.access
    }

    pub async fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.access.validate(token).await
    }

    /// Decrypt a refresh token and check it is still the live record for its
    /// device. A token that was rotated away or revoked fails here even
    /// though it is cryptographically sound.
    pub async fn validate_and_decrypt_refresh_token(
        &self,
        ciphertext: &str,
    ) -> Result<RefreshSession, AuthError> {
        const BAD_FORMAT: AuthError = AuthError::SecurityToken("invalid token format");

        let token = urlencoding::decode(ciphertext)
            .map_err(|_| BAD_FORMAT)?
            .into_owned();

        let plain = self.cipher.decrypt(&token).map_err(|e| match e {
            CipherError::InvalidState | CipherError::KeyLength => AuthError::from(e),
            e => {
                warn!(error = %e, "refresh token failed decryption");
                BAD_FORMAT
            }
        })?;

        let parts: Vec<&str> = plain.split(TOKEN_SEPARATOR).collect();
        let [secret, user_id, device_id] = parts.as_slice() else {
            warn!("refresh token payload has wrong shape");
            return Err(BAD_FORMAT);
        };
        if secret.is_empty() {
            return Err(BAD_FORMAT);
        }
        let user_id: UserId = user_id.parse().map_err(|_| BAD_FORMAT)?;
        let device_id: DeviceId = device_id.parse().map_err(|_| BAD_FORMAT)?;

        let key = SessionKey::refresh(user_id, device_id);
        match self.session_store.get(&key).await? {
            Some(stored) if stored == token => Ok(RefreshSession {
                user_id,
                device_id,
                key,
                token,
            }),
            _ => {
                warn!(%user_id, %device_id, "refresh token invalid or expired");
                Err(AuthError::SecurityToken("invalid or expired"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::SigningKeyProvider;
    use crate::application_impl::test_support::*;
    use base64::Engine;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use chrono::Utc;
    use jsonwebtoken::{DecodingKey, EncodingKey, Header, encode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn claims(exp_offset_secs: i64) -> AccessClaims {
        let now = Utc::now().timestamp();
        AccessClaims {
            sub: UserId::new_random(),
            jti: "jti".to_string(),
            device: DeviceId::new_random(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now,
            exp: now + exp_offset_secs,
        }
    }

    fn sign(claims: &AccessClaims) -> String {
        let keys = signing_keys();
        encode(
            &Header::new(Algorithm::RS256),
            claims,
            &keys.encoding_key().unwrap(),
        )
        .unwrap()
    }

    struct CountingKeySource {
        inner: Arc<SigningKeyProvider>,
        rejections: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VerificationKeySource for CountingKeySource {
        async fn verification_key(&self) -> Result<Arc<DecodingKey>, AuthError> {
            self.inner.verification_key().await
        }

        fn signature_rejected(&self) {
            self.rejections.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn accepts_well_formed_token() {
        let h = harness();
        let claims = claims(60);
        let validated = h.validator.validate_access_token(&sign(&claims)).await.unwrap();
        assert_eq!(validated, claims);
    }

    #[tokio::test]
    async fn expired_token_fails_despite_valid_signature() {
        let h = harness();
        let result = h.validator.validate_access_token(&sign(&claims(-5))).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn wrong_issuer_or_audience_is_rejected() {
        let h = harness();
        let mut c = claims(60);
        c.iss = "someone-else".to_string();
        assert!(matches!(
            h.validator.validate_access_token(&sign(&c)).await,
            Err(AuthError::TokenInvalid)
        ));
        let mut c = claims(60);
        c.aud = "other-audience".to_string();
        assert!(matches!(
            h.validator.validate_access_token(&sign(&c)).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn hmac_substitution_with_public_key_is_rejected() {
        let h = harness();
        let public_pem = read_fixture("rsa_public.pem");
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims(60),
            &EncodingKey::from_secret(public_pem.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            h.validator.validate_access_token(&forged).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn unsigned_token_is_rejected() {
        let h = harness();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(60)).unwrap());
        let token = format!("{header}.{body}.");
        assert!(h.validator.validate_access_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn foreign_signature_notifies_key_source() {
        let source = Arc::new(CountingKeySource {
            inner: signing_keys(),
            rejections: AtomicUsize::new(0),
        });
        let validator = AccessTokenValidator::new(source.clone(), ISSUER, AUDIENCE);
        let other = SigningKeyProvider::from_pem(
            &read_fixture("rsa_private_other.pem"),
            &read_fixture("rsa_public_other.pem"),
            "other",
        )
        .unwrap();
        let token = encode(
            &Header::new(Algorithm::RS256),
            &claims(60),
            &other.encoding_key().unwrap(),
        )
        .unwrap();

        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::SignatureInvalid)
        ));
        assert_eq!(source.rejections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_token_resolves_to_its_session() {
        let h = harness();
        let user = UserId::new_random();
        let tokens = h.issuer.generate_tokens(user, None).await.unwrap();
        let session = h
            .validator
            .validate_and_decrypt_refresh_token(&tokens.refresh_token.0)
            .await
            .unwrap();
        assert_eq!(session.user_id, user);
        assert_eq!(session.device_id, tokens.device_id);
    }

    #[tokio::test]
    async fn url_escaped_refresh_token_is_accepted() {
        let h = harness();
        let tokens = h.issuer.generate_tokens(UserId::new_random(), None).await.unwrap();
        let escaped = urlencoding::encode(&tokens.refresh_token.0).into_owned();
        assert!(
            h.validator
                .validate_and_decrypt_refresh_token(&escaped)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn corrupted_refresh_token_never_resolves() {
        let h = harness();
        let tokens = h.issuer.generate_tokens(UserId::new_random(), None).await.unwrap();
        let mut raw = STANDARD.decode(&tokens.refresh_token.0).unwrap();
        raw[20] ^= 0x01;
        let corrupted = STANDARD.encode(raw);
        assert!(matches!(
            h.validator.validate_and_decrypt_refresh_token(&corrupted).await,
            Err(AuthError::SecurityToken("invalid token format"))
        ));
    }

    #[tokio::test]
    async fn payload_with_wrong_shape_is_rejected() {
        let h = harness();
        let sealed = h.cipher.encrypt("only|two").unwrap();
        assert!(matches!(
            h.validator.validate_and_decrypt_refresh_token(&sealed).await,
            Err(AuthError::SecurityToken("invalid token format"))
        ));
        let sealed = h.cipher.encrypt("s|not-a-uuid|also-not").unwrap();
        assert!(matches!(
            h.validator.validate_and_decrypt_refresh_token(&sealed).await,
            Err(AuthError::SecurityToken("invalid token format"))
        ));
    }

    #[tokio::test]
    async fn replaced_record_invalidates_older_token() {
        let h = harness();
        let user = UserId::new_random();
        let first = h.issuer.generate_tokens(user, None).await.unwrap();
        let second = h
            .issuer
            .generate_tokens(user, Some(first.device_id))
            .await
            .unwrap();

        assert!(matches!(
            h.validator
                .validate_and_decrypt_refresh_token(&first.refresh_token.0)
                .await,
            Err(AuthError::SecurityToken("invalid or expired"))
        ));
        assert!(
            h.validator
                .validate_and_decrypt_refresh_token(&second.refresh_token.0)
                .await
                .is_ok()
        );
    }
}
