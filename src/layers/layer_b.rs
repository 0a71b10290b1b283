//! Layer B: ChaCha20-Poly1305 with an AES-256-GCM substitute
//!
//! Both schemes produce `[ciphertext][16-byte tag]`, and the package does not
//! record which one sealed the data, so `open` tries ChaCha20-Poly1305 first
//! (when available) and then the substitute.
//!
//! Key and nonce lengths are normalized before use:
//! - [`normalize_key`]: a key that is not 32 bytes is replaced by its SHA-256.
//! - [`normalize_seal_nonce`]: a nonce that is not 12 bytes is replaced by a
//!   fresh random one. The nonce actually used is returned to the caller.
//! - [`normalize_open_nonce`]: a longer nonce is truncated to 12 bytes.
//!
//! Replacement on seal and truncation on open do not agree with each other:
//! data sealed under a replaced nonce only opens with the nonce reported in
//! [`LayerBSealed::nonce`], never with the caller's original one.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use crate::primitives::Primitives;
use crate::{AEAD_NONCE_LEN, KEY_LEN, TAG_LEN};

const STAGE: &str = "layer B";

/// Which AEAD actually processed layer B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerBScheme {
    ChaCha20Poly1305,
    /// AES-256-GCM keyed with the same normalized key and nonce.
    Aes256GcmSubstitute,
}

impl LayerBScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerBScheme::ChaCha20Poly1305 => "chacha20-poly1305",
            LayerBScheme::Aes256GcmSubstitute => "aes-256-gcm",
        }
    }
}

#[derive(Debug)]
pub struct LayerBSealed {
    /// Ciphertext with the tag appended.
    pub ciphertext: Vec<u8>,
    /// The nonce that was used, after normalization.
    pub nonce: [u8; AEAD_NONCE_LEN],
    pub scheme: LayerBScheme,
}

#[derive(Debug)]
pub struct LayerBOpened {
    pub plaintext: Vec<u8>,
    pub scheme: LayerBScheme,
}

/// Use a 32-byte key as is; hash any other length down to 32 bytes.
pub fn normalize_key(key: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    match <[u8; KEY_LEN]>::try_from(key) {
        Ok(exact) => Zeroizing::new(exact),
        Err(_) => Zeroizing::new(Sha256::digest(key).into()),
    }
}

/// Use a 12-byte nonce as is; replace any other length with a fresh random nonce.
pub fn normalize_seal_nonce(nonce: &[u8]) -> [u8; AEAD_NONCE_LEN] {
    match <[u8; AEAD_NONCE_LEN]>::try_from(nonce) {
        Ok(exact) => exact,
        Err(_) => {
            let mut fresh = [0u8; AEAD_NONCE_LEN];
            OsRng.fill_bytes(&mut fresh);
            fresh
        }
    }
}

/// Use the first 12 bytes of the nonce. Shorter nonces cannot be repaired.
pub fn normalize_open_nonce(nonce: &[u8]) -> Result<[u8; AEAD_NONCE_LEN]> {
    nonce
        .get(..AEAD_NONCE_LEN)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or_else(|| {
            StoopError::package_format(format!(
                "{STAGE}: nonce must be at least {AEAD_NONCE_LEN} bytes, got {}",
                nonce.len()
            ))
        })
}

/// Seal with ChaCha20-Poly1305, or with the AES-256-GCM substitute when the
/// primary primitive is unavailable or fails.
pub fn seal(ready: &Primitives, plaintext: &[u8], key: &[u8], nonce: &[u8]) -> Result<LayerBSealed> {
    let key = normalize_key(key);
    let nonce = normalize_seal_nonce(nonce);

    if ready.chacha20poly1305_available() {
        match seal_chacha(plaintext, &key, &nonce) {
            Ok(ciphertext) => {
                debug!(scheme = LayerBScheme::ChaCha20Poly1305.as_str(), "layer B sealed");
                return Ok(LayerBSealed {
                    ciphertext,
                    nonce,
                    scheme: LayerBScheme::ChaCha20Poly1305,
                });
            }
            Err(e) => warn!("ChaCha20-Poly1305 seal failed, using AES-256-GCM: {e}"),
        }
    }

    let ciphertext = seal_substitute(plaintext, &key, &nonce)?;
    debug!(scheme = LayerBScheme::Aes256GcmSubstitute.as_str(), "layer B sealed");
    Ok(LayerBSealed {
        ciphertext,
        nonce,
        scheme: LayerBScheme::Aes256GcmSubstitute,
    })
}

/// Open data sealed by [`seal`], trying the primary scheme first.
pub fn open(ready: &Primitives, ciphertext: &[u8], key: &[u8], nonce: &[u8]) -> Result<LayerBOpened> {
    let key = normalize_key(key);
    let nonce = normalize_open_nonce(nonce)?;

    if ciphertext.len() < TAG_LEN {
        return Err(StoopError::authentication(STAGE));
    }

    if ready.chacha20poly1305_available() {
        if let Ok(plaintext) = open_chacha(ciphertext, &key, &nonce) {
            return Ok(LayerBOpened {
                plaintext,
                scheme: LayerBScheme::ChaCha20Poly1305,
            });
        }
        debug!("ChaCha20-Poly1305 open failed, trying AES-256-GCM");
    }

    let plaintext =
        open_substitute(ciphertext, &key, &nonce).map_err(|_| StoopError::authentication(STAGE))?;
    Ok(LayerBOpened {
        plaintext,
        scheme: LayerBScheme::Aes256GcmSubstitute,
    })
}

fn seal_chacha(plaintext: &[u8], key: &[u8; KEY_LEN], nonce: &[u8; AEAD_NONCE_LEN]) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(key.into())
        .encrypt(nonce.into(), plaintext)
        .map_err(|e| primitive_failure("ChaCha20-Poly1305", e))
}

fn open_chacha(ciphertext: &[u8], key: &[u8; KEY_LEN], nonce: &[u8; AEAD_NONCE_LEN]) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(key.into())
        .decrypt(nonce.into(), ciphertext)
        .map_err(|_| StoopError::authentication(STAGE))
}

// aes-gcm's combined output is `[ciphertext][tag]`, which is exactly the
// appended-tag layout of the substitute.
fn seal_substitute(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8; AEAD_NONCE_LEN],
) -> Result<Vec<u8>> {
    Aes256Gcm::new(key.into())
        .encrypt(nonce.into(), plaintext)
        .map_err(|e| primitive_failure("AES-256-GCM", e))
}

fn open_substitute(
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8; AEAD_NONCE_LEN],
) -> Result<Vec<u8>> {
    Aes256Gcm::new(key.into())
        .decrypt(nonce.into(), ciphertext)
        .map_err(|_| StoopError::authentication(STAGE))
}

fn primitive_failure(name: &str, e: aes_gcm::aead::Error) -> StoopError {
    StoopError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::PrimitiveUnavailable,
        format!("{STAGE}: {name} encryption failed: {e}"),
    )
}
