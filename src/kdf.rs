//! Key derivation: password → master secret → per-layer subkeys
//!
//! ```text
//! password, salt ──Argon2id──▶ master secret (64 bytes)
//!                                 ├── SHA-256(master ‖ "layer1") ─▶ layer A subkey
//!                                 ├── SHA-256(master ‖ "layer2") ─▶ layer B subkey
//!                                 └── SHA-256(master ‖ "layer3") ─▶ layer C subkey
//!
//! password, salt ──PBKDF2-HMAC-SHA256──▶ simple key (32 bytes)
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use crate::{KEY_LEN, SALT_LEN};

/// Length of the Argon2id output.
pub const MASTER_SECRET_LEN: usize = 64;

/// PBKDF2 rounds used by the simple engine.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Subkey labels, one per layer.
pub const LAYER_A_LABEL: &[u8] = b"layer1";
pub const LAYER_B_LABEL: &[u8] = b"layer2";
pub const LAYER_C_LABEL: &[u8] = b"layer3";

/// Argon2id cost parameters.
///
/// These are part of the package format: a package can only be opened with the
/// parameters it was sealed with, and they are not stored in the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            time_cost: 4,
            parallelism: 4,
        }
    }
}

/// The Argon2id output. Zeroized on drop.
pub struct MasterSecret {
    bytes: Zeroizing<[u8; MASTER_SECRET_LEN]>,
}

impl MasterSecret {
    pub fn as_bytes(&self) -> &[u8; MASTER_SECRET_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit key. Zeroized on drop.
#[derive(Clone)]
pub struct Subkey {
    bytes: [u8; KEY_LEN],
}

impl Subkey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for Subkey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Subkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subkey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The three layer subkeys fanned out from one master secret.
#[derive(Debug)]
pub struct LayerKeys {
    pub a: Subkey,
    pub b: Subkey,
    pub c: Subkey,
}

impl LayerKeys {
    pub fn derive(master: &MasterSecret) -> Self {
        Self {
            a: expand(master, LAYER_A_LABEL),
            b: expand(master, LAYER_B_LABEL),
            c: expand(master, LAYER_C_LABEL),
        }
    }
}

/// Derive the master secret from a password and salt using Argon2id.
///
/// Any password is accepted, including the empty one.
pub fn derive_master(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    params: &Argon2Params,
) -> Result<MasterSecret> {
    let argon2_params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(MASTER_SECRET_LEN),
    )
    .map_err(|e| {
        StoopError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Derivation,
            format!("invalid Argon2id parameters: {e}"),
        )
    })?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut bytes = Zeroizing::new([0u8; MASTER_SECRET_LEN]);
    argon2
        .hash_password_into(password, salt, &mut bytes[..])
        .map_err(|e| {
            StoopError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Derivation,
                format!("Argon2id key derivation failed: {e}"),
            )
        })?;

    Ok(MasterSecret { bytes })
}

/// Derive a label-bound subkey: SHA-256(master ‖ label).
pub fn expand(master: &MasterSecret, label: &[u8]) -> Subkey {
    let digest = Sha256::new()
        .chain_update(master.as_bytes())
        .chain_update(label)
        .finalize();
    Subkey::from_bytes(digest.into())
}

/// Derive the single simple-engine key with PBKDF2-HMAC-SHA256.
pub fn derive_simple_key(password: &[u8], salt: &[u8; SALT_LEN], rounds: u32) -> Result<Subkey> {
    if rounds == 0 {
        return Err(StoopError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Derivation,
            "PBKDF2 round count must be positive",
        ));
    }
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut key);
    let subkey = Subkey::from_bytes(key);
    key.zeroize();
    Ok(subkey)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap parameters so unit tests do not pay for 64 MiB per derivation.
    pub(crate) fn fast_params() -> Argon2Params {
        Argon2Params {
            memory_kib: 64,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_master_deterministic() {
        let salt = [1u8; SALT_LEN];
        let m1 = derive_master(b"correct-horse", &salt, &fast_params()).unwrap();
        let m2 = derive_master(b"correct-horse", &salt, &fast_params()).unwrap();
        assert_eq!(m1.as_bytes(), m2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_master_depends_on_password_salt_and_params() {
        let salt = [1u8; SALT_LEN];
        let base = derive_master(b"correct-horse", &salt, &fast_params()).unwrap();

        let other_password = derive_master(b"wrong-horse", &salt, &fast_params()).unwrap();
        assert_ne!(base.as_bytes(), other_password.as_bytes());

        let other_salt = derive_master(b"correct-horse", &[2u8; SALT_LEN], &fast_params()).unwrap();
        assert_ne!(base.as_bytes(), other_salt.as_bytes());

        let mut params = fast_params();
        params.time_cost = 2;
        let other_params = derive_master(b"correct-horse", &salt, &params).unwrap();
        assert_ne!(base.as_bytes(), other_params.as_bytes());
    }

    #[test]
    fn test_empty_password_accepted() {
        let master = derive_master(b"", &[0u8; SALT_LEN], &fast_params()).unwrap();
        assert_ne!(master.as_bytes(), &[0u8; MASTER_SECRET_LEN]);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = Argon2Params {
            memory_kib: 1,
            time_cost: 1,
            parallelism: 4,
        };
        let err = derive_master(b"pw", &[0u8; SALT_LEN], &params).expect_err("invalid params");
        assert_eq!(err.kind, Some(ErrorKind::Derivation));
    }

    #[test]
    fn test_expand_matches_hash_of_master_and_label() {
        let master = derive_master(b"pw", &[3u8; SALT_LEN], &fast_params()).unwrap();
        let subkey = expand(&master, b"layer1");

        let mut input = master.as_bytes().to_vec();
        input.extend_from_slice(b"layer1");
        let expected: [u8; KEY_LEN] = Sha256::digest(&input).into();
        assert_eq!(subkey.as_bytes(), &expected);
    }

    #[test]
    fn test_layer_keys_are_distinct() {
        let master = derive_master(b"pw", &[3u8; SALT_LEN], &fast_params()).unwrap();
        let keys = LayerKeys::derive(&master);
        assert_ne!(keys.a.as_bytes(), keys.b.as_bytes());
        assert_ne!(keys.b.as_bytes(), keys.c.as_bytes());
        assert_ne!(keys.a.as_bytes(), keys.c.as_bytes());
    }

    #[test]
    fn test_simple_key() {
        let salt = [9u8; SALT_LEN];
        let k1 = derive_simple_key(b"pw", &salt, 1000).unwrap();
        let k2 = derive_simple_key(b"pw", &salt, 1000).unwrap();
        let k3 = derive_simple_key(b"pw2", &salt, 1000).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());

        let err = derive_simple_key(b"pw", &salt, 0).expect_err("zero rounds");
        assert_eq!(err.kind, Some(ErrorKind::Derivation));
    }

    #[test]
    fn test_debug_redacts() {
        let key = Subkey::from_bytes([0xAB; KEY_LEN]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
