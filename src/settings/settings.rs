use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs;

const ENV_PREFIX: &str = "TOKENSMITH";
const ENV_SEPARATOR: &str = "__";

/// Settings of the issuing service.
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub jwt: Jwt,
    pub encryption: Encryption,
    pub session: Session,
    pub credentials: Credentials,
    pub lockout: Lockout,
}

/// Settings of the verifying service.
#[derive(Debug, Deserialize)]
pub struct VerifierSettings {
    pub http: Http,
    pub log: Log,
    pub jwt: VerifierJwt,
    pub key_consumer: KeyConsumer,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    /// Both paths set: serve over TLS.
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Deserialize)]
pub struct Jwt {
    pub issuer: String,
    pub audience: String,
    pub access_token_minutes: u64,
    pub refresh_token_days: u64,
    pub rsa_private_key_path: String,
    pub rsa_public_key_path: String,
    pub key_id: String,
    pub key_type: String,
    pub public_key_use: String,
    pub algorithm: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifierJwt {
    pub issuer: String,
    pub audience: String,
}

/// Base64 of two 32-byte keys.
#[derive(Debug, Deserialize)]
pub struct Encryption {
    pub key: Secret,
    pub hmac_key: Secret,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub backend: String, // "redis" or "memory"
    pub redis_url: Option<Secret>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub backend: String, // "mysql" or "memory"
    pub mysql_url: Option<Secret>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct Lockout {
    pub max_failed_attempts: u32,
    pub lockout_minutes: u64,
}

#[derive(Debug, Deserialize)]
pub struct KeyConsumer {
    pub key_service_url: String,
    pub local_key_path: String,
    pub refresh_hours: u64,
    pub retry_initial_secs: u64,
    pub retry_max_secs: u64,
    pub fetch_timeout_secs: u64,
}

/// A setting that must never reach the logs.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Certificate and key paths when TLS is configured. Setting only one of
/// them, or pointing at something that is not a regular file, is an error.
pub fn tls_paths(http: &Http) -> Result<Option<(String, String)>> {
    match (&http.cert_path, &http.key_path) {
        (None, None) => Ok(None),
        (Some(cert_path), Some(key_path)) => {
            for path in [cert_path, key_path] {
                if !fs::metadata(path)?.is_file() {
                    return Err(anyhow!("TLS file is not a regular file: {:?}", path));
                }
            }
            Ok(Some((cert_path.clone(), key_path.clone())))
        }
        _ => Err(anyhow!("http.cert_path and http.key_path must be set together")),
    }
}

#[cfg(debug_assertions)]
pub const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
pub const SETTINGS_PATH: &str = "settings/release.toml";

#[cfg(debug_assertions)]
pub const VERIFIER_SETTINGS_PATH: &str = "settings/verifier.dev.toml";
#[cfg(not(debug_assertions))]
pub const VERIFIER_SETTINGS_PATH: &str = "settings/verifier.release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    load(path.unwrap_or(SETTINGS_PATH), env_source())
}

pub fn parse_verifier_settings(path: Option<&str>) -> Result<VerifierSettings> {
    load(path.unwrap_or(VERIFIER_SETTINGS_PATH), env_source())
}

/// `TOKENSMITH__ENCRYPTION__KEY=...` overrides `encryption.key`.
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn load<T: DeserializeOwned>(path: &str, env: Environment) -> Result<T> {
    let settings: T = Config::builder()
        .add_source(File::with_name(path))
        .add_source(env)
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
