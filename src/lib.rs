//! Stoop - password-based layered file and text encryption
//!
//! Files are sealed by three nested layers keyed from one Argon2id master
//! secret: AES-256-GCM, then ChaCha20-Poly1305 (or an AES-256-GCM substitute),
//! then AES-256-CBC. The result is stored as a BSON package. When the layered
//! pipeline cannot run, files fall back to a single PBKDF2 + AES-256-GCM layer,
//! which is also what text is always encrypted with.
//!
//! ```no_run
//! use stoop::{Engine, EngineConfig};
//!
//! # fn main() -> stoop::Result<()> {
//! let engine = Engine::init(EngineConfig::default())?;
//! let sealed = engine.encrypt(b"hello world", b"correct-horse", bson::Document::new())?;
//! assert_eq!(engine.decrypt(&sealed.package, b"correct-horse")?, b"hello world");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod armor;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod layers;
pub mod package;
pub mod passphrase;
pub mod pipeline;
pub mod primitives;
pub mod simple;
pub mod worker;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use engine::{DecryptOutcome, EncryptOutcome, Engine};
pub use error::{ErrorCategory, ErrorKind, Result, StoopError};
pub use layers::LayerBScheme;
pub use package::Variant;
pub use primitives::Primitives;

/// Length of the Argon2id and PBKDF2 salts.
pub const SALT_LEN: usize = 32;

/// Length of every cipher key.
pub const KEY_LEN: usize = 32;

/// Nonce length of AES-256-GCM and ChaCha20-Poly1305.
pub const AEAD_NONCE_LEN: usize = 12;

/// IV length of the AES-256-CBC outer layer.
pub const CBC_IV_LEN: usize = 16;

/// Length of an AEAD authentication tag.
pub const TAG_LEN: usize = 16;
