use crate::application_port::AuthError;
use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use zeroize::{Zeroize, Zeroizing};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("argument error: {0}")]
    Argument(&'static str),
    #[error("integrity check failed")]
    Integrity,
    #[error("cipher used after disposal")]
    InvalidState,
    #[error("keys must be exactly {KEY_LEN} bytes")]
    KeyLength,
}

impl From<CipherError> for AuthError {
    fn from(error: CipherError) -> Self {
        match error {
            CipherError::Argument(e) => AuthError::Validation(e.to_string()),
            CipherError::Integrity => AuthError::Integrity,
            e => AuthError::InternalError(e.to_string()),
        }
    }
}

/// One immutable generation of key material. Zeroed when the last holder drops it.
struct CipherKeys {
    aes_key: [u8; KEY_LEN],
    hmac_key: [u8; KEY_LEN],
}

impl CipherKeys {
    fn from_slices(aes_key: &[u8], hmac_key: &[u8]) -> Result<Self, CipherError> {
        if aes_key.len() != KEY_LEN || hmac_key.len() != KEY_LEN {
            return Err(CipherError::KeyLength);
        }
        let mut keys = CipherKeys {
            aes_key: [0u8; KEY_LEN],
            hmac_key: [0u8; KEY_LEN],
        };
        keys.aes_key.copy_from_slice(aes_key);
        keys.hmac_key.copy_from_slice(hmac_key);
        Ok(keys)
    }

    fn from_base64(aes_key: &str, hmac_key: &str) -> Result<Self, CipherError> {
        let aes_key = Zeroizing::new(
            STANDARD
                .decode(aes_key.trim())
                .map_err(|_| CipherError::Argument("encryption key is not valid base64"))?,
        );
        let hmac_key = Zeroizing::new(
            STANDARD
                .decode(hmac_key.trim())
                .map_err(|_| CipherError::Argument("hmac key is not valid base64"))?,
        );
        Self::from_slices(&aes_key, &hmac_key)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, CipherError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hmac_key)
            .map_err(|_| CipherError::KeyLength)?;
        mac.update(data);
        Ok(mac)
    }
}

impl Drop for CipherKeys {
    fn drop(&mut self) {
        self.aes_key.zeroize();
        self.hmac_key.zeroize();
    }
}

/// AES-256-CBC + HMAC-SHA256 (encrypt-then-MAC) for refresh-token payloads.
///
/// Output layout, base64 encoded: `IV (16) || ciphertext || HMAC (32)`, the
/// HMAC covering `IV || ciphertext`.
///
/// The key pair is an immutable generation behind a swappable handle: every
/// operation takes a snapshot of one generation under the lock and works on
/// it, so a rotation can never hand an operation half-old/half-new keys.
/// Retired key material is zeroed as soon as no in-flight operation holds it.
pub struct AuthenticatedCipher {
    keys: Mutex<Option<Arc<CipherKeys>>>,
}

impl AuthenticatedCipher {
    pub fn new(aes_key: &[u8], hmac_key: &[u8]) -> Result<Self, CipherError> {
        let keys = CipherKeys::from_slices(aes_key, hmac_key)?;
        Ok(Self {
            keys: Mutex::new(Some(Arc::new(keys))),
        })
    }

    pub fn from_base64(aes_key: &str, hmac_key: &str) -> Result<Self, CipherError> {
        let keys = CipherKeys::from_base64(aes_key, hmac_key)?;
        Ok(Self {
            keys: Mutex::new(Some(Arc::new(keys))),
        })
    }

    fn snapshot(&self) -> Result<Arc<CipherKeys>, CipherError> {
        let guard = self.keys.lock().map_err(|_| CipherError::InvalidState)?;
        guard.as_ref().cloned().ok_or(CipherError::InvalidState)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Err(CipherError::Argument("plaintext is empty"));
        }
        let keys = self.snapshot()?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let encrypted = Aes256CbcEnc::new_from_slices(&keys.aes_key, &iv)
            .map_err(|_| CipherError::KeyLength)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(IV_LEN + encrypted.len() + MAC_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&encrypted);
        let tag = keys.mac(&out)?.finalize().into_bytes();
        out.extend_from_slice(&tag);

        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        if ciphertext.is_empty() {
            return Err(CipherError::Argument("ciphertext is empty"));
        }
        let keys = self.snapshot()?;

        let full = STANDARD
            .decode(ciphertext)
            .map_err(|_| CipherError::Integrity)?;
        if full.len() < IV_LEN + MAC_LEN {
            return Err(CipherError::Integrity);
        }

        let (iv_and_data, received_tag) = full.split_at(full.len() - MAC_LEN);
        keys.mac(iv_and_data)?
            .verify_slice(received_tag)
            .map_err(|_| CipherError::Integrity)?;

        let (iv, data) = iv_and_data.split_at(IV_LEN);
        let plain = Aes256CbcDec::new_from_slices(&keys.aes_key, iv)
            .map_err(|_| CipherError::KeyLength)?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| CipherError::Integrity)?;

        String::from_utf8(plain).map_err(|_| CipherError::Integrity)
    }

    /// Swap in a new key pair. Tokens sealed under the old pair become
    /// permanently undecryptable.
    pub fn rotate_keys(&self, aes_key: &[u8], hmac_key: &[u8]) -> Result<(), CipherError> {
        let new_keys = Arc::new(CipherKeys::from_slices(aes_key, hmac_key)?);
        self.swap(new_keys)
    }

    pub fn rotate_keys_base64(&self, aes_key: &str, hmac_key: &str) -> Result<(), CipherError> {
        let new_keys = Arc::new(CipherKeys::from_base64(aes_key, hmac_key)?);
        self.swap(new_keys)
    }

    fn swap(&self, new_keys: Arc<CipherKeys>) -> Result<(), CipherError> {
        let mut guard = self.keys.lock().map_err(|_| CipherError::InvalidState)?;
        if guard.is_none() {
            return Err(CipherError::InvalidState);
        }
        let retired = guard.replace(new_keys);
        drop(retired);
        Ok(())
    }

    /// Release the key material. Every later call fails with `InvalidState`.
    pub fn dispose(&self) {
        if let Ok(mut guard) = self.keys.lock() {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cipher() -> AuthenticatedCipher {
        AuthenticatedCipher::new(&[7u8; KEY_LEN], &[9u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = cipher();
        let long = "x".repeat(1000);
        for plain in ["a", "secret|user|device", "юникод ✓", long.as_str()] {
            let sealed = cipher.encrypt(plain).unwrap();
            assert_eq!(cipher.decrypt(&sealed).unwrap(), plain);
        }
    }

    #[test]
    fn fresh_iv_per_call() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn every_bit_flip_is_detected() {
        let cipher = cipher();
        let sealed = STANDARD.decode(cipher.encrypt("refresh payload").unwrap()).unwrap();
        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                let result = cipher.decrypt(&STANDARD.encode(&tampered));
                assert_eq!(result, Err(CipherError::Integrity), "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn short_and_malformed_input_fail_closed() {
        let cipher = cipher();
        assert_eq!(
            cipher.decrypt(&STANDARD.encode([0u8; IV_LEN + MAC_LEN - 1])),
            Err(CipherError::Integrity)
        );
        assert_eq!(cipher.decrypt("not base64!!"), Err(CipherError::Integrity));
        assert_eq!(cipher.decrypt(""), Err(CipherError::Argument("ciphertext is empty")));
        assert_eq!(cipher.encrypt(""), Err(CipherError::Argument("plaintext is empty")));
    }

    #[test]
    fn rotation_retires_old_tokens() {
        let cipher = cipher();
        let sealed = cipher.encrypt("before").unwrap();
        cipher.rotate_keys(&[1u8; KEY_LEN], &[2u8; KEY_LEN]).unwrap();
        assert_eq!(cipher.decrypt(&sealed), Err(CipherError::Integrity));
        let resealed = cipher.encrypt("after").unwrap();
        assert_eq!(cipher.decrypt(&resealed).unwrap(), "after");
    }

    #[test]
    fn rotation_rejects_bad_lengths_and_keeps_current_keys() {
        let cipher = cipher();
        let sealed = cipher.encrypt("kept").unwrap();
        assert_eq!(
            cipher.rotate_keys(&[1u8; 16], &[2u8; KEY_LEN]),
            Err(CipherError::KeyLength)
        );
        assert_eq!(
            cipher.rotate_keys_base64("AAAA", "AAAA"),
            Err(CipherError::KeyLength)
        );
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "kept");
    }

    #[test]
    fn base64_constructor_validates_length() {
        let key = STANDARD.encode([3u8; KEY_LEN]);
        assert!(AuthenticatedCipher::from_base64(&key, &key).is_ok());
        let short = STANDARD.encode([3u8; 31]);
        assert_eq!(
            AuthenticatedCipher::from_base64(&key, &short).err(),
            Some(CipherError::KeyLength)
        );
    }

    #[test]
    fn disposed_cipher_refuses_work() {
        let cipher = cipher();
        let sealed = cipher.encrypt("x").unwrap();
        cipher.dispose();
        assert_eq!(cipher.encrypt("x"), Err(CipherError::InvalidState));
        assert_eq!(cipher.decrypt(&sealed), Err(CipherError::InvalidState));
        assert_eq!(
            cipher.rotate_keys(&[1u8; KEY_LEN], &[1u8; KEY_LEN]),
            Err(CipherError::InvalidState)
        );
    }

    #[test]
    fn concurrent_rotation_never_mixes_generations() {
        let cipher = Arc::new(cipher());
        let old = AuthenticatedCipher::new(&[7u8; KEY_LEN], &[9u8; KEY_LEN]).unwrap();
        let new = AuthenticatedCipher::new(&[1u8; KEY_LEN], &[2u8; KEY_LEN]).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let cipher = cipher.clone();
                thread::spawn(move || {
                    (0..200)
                        .map(|i| cipher.encrypt(&format!("payload-{i}")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        cipher.rotate_keys(&[1u8; KEY_LEN], &[2u8; KEY_LEN]).unwrap();

        for worker in workers {
            for sealed in worker.join().unwrap() {
                assert!(old.decrypt(&sealed).is_ok() || new.decrypt(&sealed).is_ok());
            }
        }
    }
}
