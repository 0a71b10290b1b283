//! Layer A: AES-256-GCM with a detached tag

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use crate::kdf::Subkey;
use crate::primitives::Primitives;
use crate::{AEAD_NONCE_LEN, TAG_LEN};

const STAGE: &str = "layer A (AES-256-GCM)";

/// Encrypt `plaintext`, returning the ciphertext and its 16-byte tag.
pub fn seal(
    _ready: &Primitives,
    plaintext: &[u8],
    key: &Subkey,
    nonce: &[u8; AEAD_NONCE_LEN],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    seal_detached(STAGE, plaintext, key, nonce)
}

/// Decrypt and verify. Nothing is returned unless the tag verifies.
pub fn open(
    _ready: &Primitives,
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    key: &Subkey,
    nonce: &[u8; AEAD_NONCE_LEN],
) -> Result<Vec<u8>> {
    open_detached(STAGE, ciphertext, tag, key, nonce)
}

/// AES-256-GCM with detached tag, shared with the simple engine.
pub(crate) fn seal_detached(
    stage: &str,
    plaintext: &[u8],
    key: &Subkey,
    nonce: &[u8; AEAD_NONCE_LEN],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer)
        .map_err(|e| {
            StoopError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::PrimitiveUnavailable,
                format!("{stage}: encryption failed: {e}"),
            )
        })?;
    Ok((buffer, tag.into()))
}

pub(crate) fn open_detached(
    stage: &str,
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    key: &Subkey,
    nonce: &[u8; AEAD_NONCE_LEN],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| StoopError::authentication(stage))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Primitives {
        Primitives::init().unwrap()
    }

    #[test]
    fn test_seal_open() {
        let key = Subkey::from_bytes([1u8; 32]);
        let nonce = [2u8; AEAD_NONCE_LEN];

        let (ct, tag) = seal(&ready(), b"hello world", &key, &nonce).unwrap();
        assert_eq!(ct.len(), b"hello world".len());
        assert_ne!(ct.as_slice(), b"hello world");

        let pt = open(&ready(), &ct, &tag, &key, &nonce).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn test_empty_plaintext() {
        let key = Subkey::from_bytes([1u8; 32]);
        let nonce = [2u8; AEAD_NONCE_LEN];

        let (ct, tag) = seal(&ready(), b"", &key, &nonce).unwrap();
        assert!(ct.is_empty());
        assert_eq!(open(&ready(), &ct, &tag, &key, &nonce).unwrap(), b"");
    }

    #[test]
    fn test_tag_mismatch_fails_closed() {
        let key = Subkey::from_bytes([1u8; 32]);
        let nonce = [2u8; AEAD_NONCE_LEN];
        let (ct, mut tag) = seal(&ready(), b"payload", &key, &nonce).unwrap();
        tag[0] ^= 0x01;

        let err = open(&ready(), &ct, &tag, &key, &nonce).expect_err("tampered tag");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(err.to_string().contains("layer A"));
    }

    #[test]
    fn test_wrong_key_or_nonce_fails() {
        let key = Subkey::from_bytes([1u8; 32]);
        let nonce = [2u8; AEAD_NONCE_LEN];
        let (ct, tag) = seal(&ready(), b"payload", &key, &nonce).unwrap();

        let other_key = Subkey::from_bytes([9u8; 32]);
        assert!(open(&ready(), &ct, &tag, &other_key, &nonce).is_err());
        assert!(open(&ready(), &ct, &tag, &key, &[3u8; AEAD_NONCE_LEN]).is_err());
    }
}
