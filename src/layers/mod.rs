//! The three cipher layers of the layered pipeline
//!
//! | layer | cipher             | nonce | integrity                         |
//! |-------|--------------------|-------|-----------------------------------|
//! | A     | AES-256-GCM        | 12    | detached 16-byte tag              |
//! | B     | ChaCha20-Poly1305  | 12    | tag appended to the ciphertext    |
//! | C     | AES-256-CBC/PKCS#7 | 16    | none                              |
//!
//! Layer C is a confidentiality-only outer wrap. Tampering with its output is
//! caught one step later, when layer B's tag no longer verifies, and layer A's
//! tag covers the original payload. Adding a tag at layer C would only
//! authenticate bytes that are already authenticated underneath.

pub mod layer_a;
pub mod layer_b;
pub mod layer_c;

pub use layer_b::{LayerBOpened, LayerBScheme, LayerBSealed};
