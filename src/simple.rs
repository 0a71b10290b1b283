//! Simple single-layer engine: PBKDF2-HMAC-SHA256 + AES-256-GCM
//!
//! Used for every text payload and as the fallback when the layered pipeline
//! cannot encrypt a file.

use bson::Document;
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::armor;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::kdf;
use crate::layers::layer_a;
use crate::package::{SIMPLE_VERSION, SimplePackage, Variant};
use crate::primitives::Primitives;
use crate::{AEAD_NONCE_LEN, SALT_LEN, TAG_LEN};

const STAGE: &str = "simple engine (AES-256-GCM)";

pub fn encrypt(
    ready: &Primitives,
    payload: &[u8],
    password: &[u8],
    rounds: u32,
    options: Option<Document>,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; AEAD_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_deterministic(ready, payload, password, rounds, options, &salt, &nonce, cancel)
}

/// Encrypt with caller-provided salt and nonce.
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which generates random salt/nonce.
#[allow(clippy::too_many_arguments)]
pub fn encrypt_deterministic(
    _ready: &Primitives,
    payload: &[u8],
    password: &[u8],
    rounds: u32,
    options: Option<Document>,
    salt: &[u8; SALT_LEN],
    nonce: &[u8; AEAD_NONCE_LEN],
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    cancel.checkpoint()?;
    let key = kdf::derive_simple_key(password, salt, rounds)?;
    cancel.checkpoint()?;

    let (ciphertext, tag) = layer_a::seal_detached(STAGE, payload, &key, nonce)?;

    SimplePackage {
        version: SIMPLE_VERSION.to_string(),
        salt: armor::wrap(salt),
        iv: armor::wrap(nonce),
        auth_tag: armor::wrap(&tag),
        encrypted: armor::wrap(&ciphertext),
        id: Some(Uuid::new_v4().to_string()),
        algorithm: Some(Variant::Simple.as_str().to_string()),
        timestamp: Some(chrono::Utc::now().timestamp_millis()),
        options,
    }
    .to_bytes()
}

/// Decrypt a simple package. The version is checked before the key is derived.
pub fn decrypt(
    _ready: &Primitives,
    bytes: &[u8],
    password: &[u8],
    rounds: u32,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let package = SimplePackage::from_bytes(bytes)?;

    let salt: [u8; SALT_LEN] = armor::unwrap_field("salt", &package.salt)?;
    let nonce: [u8; AEAD_NONCE_LEN] = armor::unwrap_field("iv", &package.iv)?;
    let tag: [u8; TAG_LEN] = armor::unwrap_field("authTag", &package.auth_tag)?;
    let ciphertext = armor::unwrap(&package.encrypted)
        .map_err(|e| e.with_context("invalid field 'encrypted'"))?;

    cancel.checkpoint()?;
    let key = kdf::derive_simple_key(password, &salt, rounds)?;
    cancel.checkpoint()?;

    layer_a::open_detached(STAGE, &ciphertext, &tag, &key, &nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ROUNDS: u32 = 1000;

    fn ready() -> Primitives {
        Primitives::init().unwrap()
    }

    fn seal(payload: &[u8], password: &[u8]) -> Vec<u8> {
        encrypt(&ready(), payload, password, ROUNDS, None, &CancelToken::new()).unwrap()
    }

    fn open(bytes: &[u8], password: &[u8]) -> Result<Vec<u8>> {
        decrypt(&ready(), bytes, password, ROUNDS, &CancelToken::new())
    }

    #[test]
    fn test_roundtrip() {
        let bytes = seal(b"hello world", b"correct-horse");
        assert_eq!(open(&bytes, b"correct-horse").unwrap(), b"hello world");
    }

    #[test]
    fn test_empty_payload() {
        let bytes = seal(b"", b"pw");
        assert_eq!(open(&bytes, b"pw").unwrap(), b"");
    }

    #[test]
    fn test_package_fields() {
        let package = SimplePackage::from_bytes(&seal(b"abc", b"pw")).unwrap();
        assert_eq!(package.version, SIMPLE_VERSION);
        assert_eq!(package.algorithm.as_deref(), Some("simple"));
        assert_eq!(armor::unwrap(&package.salt).unwrap().len(), SALT_LEN);
        assert_eq!(armor::unwrap(&package.iv).unwrap().len(), AEAD_NONCE_LEN);
        assert_eq!(armor::unwrap(&package.auth_tag).unwrap().len(), TAG_LEN);
        assert_eq!(armor::unwrap(&package.encrypted).unwrap().len(), 3);
        assert_eq!(package.options, None);
    }

    #[test]
    fn test_options_carried() {
        let options = bson::doc! { "origin": "fallback" };
        let bytes = encrypt(
            &ready(),
            b"abc",
            b"pw",
            ROUNDS,
            Some(options.clone()),
            &CancelToken::new(),
        )
        .unwrap();
        let package = SimplePackage::from_bytes(&bytes).unwrap();
        assert_eq!(package.options, Some(options));
        assert_eq!(open(&bytes, b"pw").unwrap(), b"abc");
    }

    #[test]
    fn test_deterministic_encryption() {
        let salt = [1u8; SALT_LEN];
        let nonce = [2u8; AEAD_NONCE_LEN];
        let run = || {
            let bytes = encrypt_deterministic(
                &ready(),
                b"hello world",
                b"test",
                ROUNDS,
                None,
                &salt,
                &nonce,
                &CancelToken::new(),
            )
            .unwrap();
            SimplePackage::from_bytes(&bytes).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.encrypted, b.encrypted);
        assert_eq!(a.auth_tag, b.auth_tag);
    }

    #[test]
    fn test_wrong_password() {
        let bytes = seal(b"secret data", b"correct");
        let err = open(&bytes, b"wrong").expect_err("wrong password");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_rounds_must_match() {
        let bytes = seal(b"secret data", b"pw");
        let err = decrypt(&ready(), &bytes, b"pw", ROUNDS + 1, &CancelToken::new())
            .expect_err("different rounds");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_malformed_fields() {
        let mut package = SimplePackage::from_bytes(&seal(b"abc", b"pw")).unwrap();
        package.iv = armor::wrap(&[0u8; 16]);
        let err = open(&package.to_bytes().unwrap(), b"pw").expect_err("wrong iv length");
        assert_eq!(err.kind, Some(ErrorKind::PackageFormat));

        let mut package = SimplePackage::from_bytes(&seal(b"abc", b"pw")).unwrap();
        package.auth_tag = "***".to_string();
        let err = open(&package.to_bytes().unwrap(), b"pw").expect_err("bad base64");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringDecode));
    }

    #[test]
    fn test_rejects_layered_version() {
        let mut package = SimplePackage::from_bytes(&seal(b"abc", b"pw")).unwrap();
        package.version = "1.0.0".to_string();
        let err = open(&package.to_bytes().unwrap(), b"pw").expect_err("layered version");
        assert_eq!(err.kind, Some(ErrorKind::VersionMismatch));
    }
}
