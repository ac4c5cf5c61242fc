//! Bootstraps key material for a deployment: an RSA signing keypair, the two
//! symmetric refresh-token keys and, optionally, a password hash for seeding
//! credentials.

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokensmith::application_impl::{Argon2PasswordHasher, KEY_LEN};
use tokensmith::application_port::CredentialHasher;
use tokensmith::logger::*;
use tokensmith::settings::LogFormat;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
struct KeygenCli {
    /// Directory receiving `issuer_private.pem` and `issuer_public.pem`.
    #[arg(long, default_value = "keys")]
    out_dir: PathBuf,
    #[arg(long, default_value_t = 2048)]
    bits: usize,
    /// Replace existing key files.
    #[arg(long)]
    force: bool,
    /// Also print the Argon2 hash of this password.
    #[arg(long)]
    hash_password: Option<String>,
}

fn write_pem(path: &Path, pem: &str, private: bool, force: bool) -> anyhow::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options
        .open(path)
        .with_context(|| format!("cannot create {path:?} (use --force to overwrite)"))?;
    file.write_all(pem.as_bytes())?;
    Ok(())
}

fn symmetric_key() -> String {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    STANDARD.encode(key.as_ref())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = KeygenCli::parse();
    let _logger = Logger::new_bootstrap(LogFormat::Text);

    std::fs::create_dir_all(&cli.out_dir)?;

    info!(bits = cli.bits, "generating RSA keypair");
    let bits = cli.bits;
    let private_key = tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut OsRng, bits))
        .await??;
    let private_pem = private_key.to_pkcs8_pem(LineEnding::LF)?;
    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)?;

    let private_path = cli.out_dir.join("issuer_private.pem");
    let public_path = cli.out_dir.join("issuer_public.pem");
    write_pem(&private_path, private_pem.as_str(), true, cli.force)?;
    write_pem(&public_path, &public_pem, false, cli.force)?;
    info!(?private_path, ?public_path, "keypair written");

    println!("encryption.key      = \"{}\"", symmetric_key());
    println!("encryption.hmac_key = \"{}\"", symmetric_key());

    if let Some(password) = cli.hash_password {
        let password = Zeroizing::new(password);
        let hash = Argon2PasswordHasher.hash_password(&password).await?;
        println!("password_hash       = \"{hash}\"");
    }

    Ok(())
}
