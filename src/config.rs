//! Engine configuration

use crate::kdf::{Argon2Params, PBKDF2_ROUNDS};

/// Key derivation costs used by an [`Engine`](crate::engine::Engine).
///
/// Neither value is stored in packages. The defaults are the values every
/// stoop package is sealed with; anything else produces packages that only an
/// engine with the same configuration can open, which is useful for tests and
/// nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub argon2: Argon2Params,
    pub pbkdf2_rounds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            argon2: Argon2Params::default(),
            pbkdf2_rounds: PBKDF2_ROUNDS,
        }
    }
}
