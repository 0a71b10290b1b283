//! Layered pipeline: Argon2id → A (AES-256-GCM) → B (ChaCha20-Poly1305) → C (AES-256-CBC)
//!
//! Decryption re-derives the subkeys from the stored salt and runs C → B → A.
//! Every stage fails closed; no plaintext leaves this module unless layer A's
//! tag verified.

use bson::Document;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;
use uuid::Uuid;

use crate::armor;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::kdf::{self, LayerKeys};
use crate::layers::{LayerBScheme, layer_a, layer_b, layer_c};
use crate::package::{LAYERED_VERSION, LayerNonces, LayeredPackage, Variant};
use crate::primitives::Primitives;
use crate::{AEAD_NONCE_LEN, CBC_IV_LEN, SALT_LEN, TAG_LEN};

/// Result of a layered encryption.
#[derive(Debug)]
pub struct LayeredSealed {
    pub package: LayeredPackage,
    pub bytes: Vec<u8>,
    pub layer_b: LayerBScheme,
}

/// Result of a layered decryption.
#[derive(Debug)]
pub struct LayeredOpened {
    pub plaintext: Vec<u8>,
    pub layer_b: LayerBScheme,
}

/// Fresh salt and nonces for one encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Randomness {
    pub salt: [u8; SALT_LEN],
    pub nonce_a: [u8; AEAD_NONCE_LEN],
    pub nonce_b: [u8; AEAD_NONCE_LEN],
    pub iv_c: [u8; CBC_IV_LEN],
}

impl Randomness {
    pub fn generate() -> Self {
        let mut r = Self {
            salt: [0u8; SALT_LEN],
            nonce_a: [0u8; AEAD_NONCE_LEN],
            nonce_b: [0u8; AEAD_NONCE_LEN],
            iv_c: [0u8; CBC_IV_LEN],
        };
        OsRng.fill_bytes(&mut r.salt);
        OsRng.fill_bytes(&mut r.nonce_a);
        OsRng.fill_bytes(&mut r.nonce_b);
        OsRng.fill_bytes(&mut r.iv_c);
        r
    }
}

pub fn encrypt(
    ready: &Primitives,
    config: &EngineConfig,
    payload: &[u8],
    password: &[u8],
    options: Document,
    cancel: &CancelToken,
) -> Result<LayeredSealed> {
    encrypt_deterministic(
        ready,
        config,
        payload,
        password,
        options,
        &Randomness::generate(),
        cancel,
    )
}

/// Encrypt with caller-provided salt and nonces.
///
/// This function is ONLY for testing purposes to generate reproducible layer
/// output. NEVER use this in production - always use `encrypt()` which
/// generates fresh randomness.
pub fn encrypt_deterministic(
    ready: &Primitives,
    config: &EngineConfig,
    payload: &[u8],
    password: &[u8],
    options: Document,
    randomness: &Randomness,
    cancel: &CancelToken,
) -> Result<LayeredSealed> {
    cancel.checkpoint()?;
    let master = kdf::derive_master(password, &randomness.salt, &config.argon2)
        .map_err(|e| e.with_context("key derivation failed"))?;
    let keys = LayerKeys::derive(&master);
    drop(master);
    cancel.checkpoint()?;

    let (ct_a, tag_a) = layer_a::seal(ready, payload, &keys.a, &randomness.nonce_a)?;
    debug!(len = ct_a.len(), "layer A sealed");
    cancel.checkpoint()?;

    let sealed_b = layer_b::seal(ready, &ct_a, keys.b.as_bytes(), &randomness.nonce_b)?;
    cancel.checkpoint()?;

    let ct_c = layer_c::seal(ready, &sealed_b.ciphertext, &keys.c, &randomness.iv_c)?;
    debug!(len = ct_c.len(), "layer C sealed");

    let package = LayeredPackage {
        version: LAYERED_VERSION.to_string(),
        id: Uuid::new_v4().to_string(),
        salt: armor::wrap(&randomness.salt),
        ivs: LayerNonces {
            aes: armor::wrap(&randomness.nonce_a),
            chacha: armor::wrap(&sealed_b.nonce),
            cbc: armor::wrap(&randomness.iv_c),
        },
        auth_tag: armor::wrap(&tag_a),
        encrypted: armor::wrap(&ct_c),
        algorithm: Variant::Layered.as_str().to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        options,
    };
    let bytes = package.to_bytes()?;

    Ok(LayeredSealed {
        package,
        bytes,
        layer_b: sealed_b.scheme,
    })
}

/// Decrypt a layered package. The version is checked before any key
/// derivation or cipher work happens.
pub fn decrypt(
    ready: &Primitives,
    config: &EngineConfig,
    bytes: &[u8],
    password: &[u8],
    cancel: &CancelToken,
) -> Result<LayeredOpened> {
    let package = LayeredPackage::from_bytes(bytes)?;
    decrypt_package(ready, config, &package, password, cancel)
}

pub fn decrypt_package(
    ready: &Primitives,
    config: &EngineConfig,
    package: &LayeredPackage,
    password: &[u8],
    cancel: &CancelToken,
) -> Result<LayeredOpened> {
    let salt: [u8; SALT_LEN] = armor::unwrap_field("salt", &package.salt)?;
    let nonce_a: [u8; AEAD_NONCE_LEN] = armor::unwrap_field("ivs.aes", &package.ivs.aes)?;
    // Layer B normalizes its own nonce.
    let nonce_b = armor::unwrap(&package.ivs.chacha)
        .map_err(|e| e.with_context("invalid field 'ivs.chacha'"))?;
    let iv_c: [u8; CBC_IV_LEN] = armor::unwrap_field("ivs.cbc", &package.ivs.cbc)?;
    let tag_a: [u8; TAG_LEN] = armor::unwrap_field("authTag", &package.auth_tag)?;
    let ct_c =
        armor::unwrap(&package.encrypted).map_err(|e| e.with_context("invalid field 'encrypted'"))?;

    cancel.checkpoint()?;
    let master = kdf::derive_master(password, &salt, &config.argon2)
        .map_err(|e| e.with_context("key derivation failed"))?;
    let keys = LayerKeys::derive(&master);
    drop(master);
    cancel.checkpoint()?;

    let ct_b = layer_c::open(ready, &ct_c, &keys.c, &iv_c)?;
    cancel.checkpoint()?;

    let opened_b = layer_b::open(ready, &ct_b, keys.b.as_bytes(), &nonce_b)?;
    debug!(scheme = opened_b.scheme.as_str(), "layer B opened");
    cancel.checkpoint()?;

    let plaintext = layer_a::open(ready, &opened_b.plaintext, &tag_a, &keys.a, &nonce_a)?;

    Ok(LayeredOpened {
        plaintext,
        layer_b: opened_b.scheme,
    })
}
