use super::*;
use crate::infra_memory::InMemorySessionStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ISSUER: &str = "tokensmith.test";
pub const AUDIENCE: &str = "tokensmith-clients";

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).unwrap()
}

pub fn signing_keys() -> Arc<SigningKeyProvider> {
    Arc::new(
        SigningKeyProvider::from_pem(
            &read_fixture("rsa_private.pem"),
            &read_fixture("rsa_public.pem"),
            "test-key",
        )
        .unwrap(),
    )
}

pub fn cipher() -> Arc<AuthenticatedCipher> {
    Arc::new(AuthenticatedCipher::new(&[11u8; 32], &[22u8; 32]).unwrap())
}

pub struct Harness {
    pub keys: Arc<SigningKeyProvider>,
    pub cipher: Arc<AuthenticatedCipher>,
    pub store: Arc<InMemorySessionStore>,
    pub validator: Arc<TokenValidator>,
    pub issuer: TokenIssuer,
}

pub fn harness() -> Harness {
    let keys = signing_keys();
    let cipher = cipher();
    let store = Arc::new(InMemorySessionStore::new());
    let validator = Arc::new(TokenValidator::new(
        Arc::new(AccessTokenValidator::new(keys.clone(), ISSUER, AUDIENCE)),
        cipher.clone(),
        store.clone(),
    ));
    let issuer = TokenIssuer::new(
        TokenIssuerConfig {
            issuer: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        },
        keys.clone(),
        cipher.clone(),
        store.clone(),
        validator.clone(),
    );
    Harness {
        keys,
        cipher,
        store,
        validator,
        issuer,
    }
}
