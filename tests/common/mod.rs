#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokensmith::application_impl::Argon2PasswordHasher;
use tokensmith::application_port::CredentialHasher;
use tokensmith::server::*;
use tokensmith::settings::*;
use warp::http::HeaderMap;
use warp::http::header::{AUTHORIZATION, SET_COOKIE};

pub const USER_ID: &str = "6b1d3a52-0f7e-4c8a-9d21-7a3e5c9b0f14";
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "correct horse battery staple";
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// An issuer on in-memory backends, configured the way `main` would load it.
pub struct TestIssuer {
    pub server: Arc<IssuerServer>,
    _dir: TempDir,
}

pub async fn issuer() -> TestIssuer {
    let dir = tempfile::tempdir().unwrap();
    let password_hash = Argon2PasswordHasher.hash_password(PASSWORD).await.unwrap();
    let toml = format!(
        r#"
[http]
address = "127.0.0.1:0"

[log]
filter = "warn"

[jwt]
issuer = "tokensmith.test"
audience = "tokensmith-tests"
access_token_minutes = 5
refresh_token_days = 1
rsa_private_key_path = "{private}"
rsa_public_key_path = "{public}"
key_id = "test-1"
key_type = "RSA"
public_key_use = "sig"
algorithm = "RS256"

[encryption]
key = "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyA="
hmac_key = "ICEiIyQlJicoKSorLC0uLzAxMjM0NTY3ODk6Ozw9Pj8="

[session]
backend = "memory"

[credentials]
backend = "memory"

[[credentials.users]]
user_id = "{USER_ID}"
username = "{USERNAME}"
email = "alice@example.com"
password_hash = "{password_hash}"

[lockout]
max_failed_attempts = {MAX_FAILED_ATTEMPTS}
lockout_minutes = 1
"#,
        private = fixture("rsa_private.pem").display(),
        public = fixture("rsa_public.pem").display(),
    );
    let path = dir.path().join("issuer.toml");
    std::fs::write(&path, toml).unwrap();

    let settings = parse_settings(path.to_str()).unwrap();
    let server = IssuerServer::try_new(&settings).await.unwrap();
    TestIssuer {
        server: Arc::new(server),
        _dir: dir,
    }
}

pub fn verifier_settings(dir: &Path, key_service_url: &str) -> VerifierSettings {
    let toml = format!(
        r#"
[http]
address = "127.0.0.1:0"

[log]
filter = "warn"

[jwt]
issuer = "tokensmith.test"
audience = "tokensmith-tests"

[key_consumer]
key_service_url = "{key_service_url}"
local_key_path = "{local}"
refresh_hours = 6
retry_initial_secs = 1
retry_max_secs = 5
fetch_timeout_secs = 2
"#,
        local = dir.join("cache").join("issuer_public.pem").display(),
    );
    let path = dir.join("verifier.toml");
    std::fs::write(&path, toml).unwrap();
    parse_verifier_settings(path.to_str()).unwrap()
}

pub fn bearer(headers: &HeaderMap) -> String {
    headers
        .get(AUTHORIZATION)
        .expect("access token header")
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` of the `Set-Cookie` header, ready to send back.
pub fn cookie_pair(headers: &HeaderMap) -> String {
    let set_cookie = headers
        .get(SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub fn body_json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}
