//! Engine: the boundary every caller goes through
//!
//! Fallbacks happen in exactly two places. Layer B may substitute AES-256-GCM
//! for ChaCha20-Poly1305 (see [`crate::layers::layer_b`]). And [`Engine::encrypt`]
//! falls back to the simple engine when the layered pipeline fails. Both are
//! reported in the returned outcome and logged.
//!
//! Decryption does not look at the package to pick a branch. It tries
//! [`Engine::decrypt_layered`], then [`Engine::decrypt_simple`], and reports a
//! combined failure when neither opens the package.

use bson::Document;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::armor;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use crate::layers::LayerBScheme;
use crate::package::Variant;
use crate::pipeline::{self, LayeredOpened, LayeredSealed};
use crate::primitives::Primitives;
use crate::simple;

/// What [`Engine::encrypt`] produced.
#[derive(Debug)]
pub struct EncryptOutcome {
    /// The serialized package.
    pub package: Vec<u8>,
    pub variant: Variant,
    /// Layer B scheme, for layered packages.
    pub layer_b: Option<LayerBScheme>,
    /// Why the layered pipeline was abandoned, if it was.
    pub fallback_reason: Option<String>,
}

/// What [`Engine::decrypt_with_cancel`] recovered.
#[derive(Debug)]
pub struct DecryptOutcome {
    pub plaintext: Vec<u8>,
    pub variant: Variant,
    pub layer_b: Option<LayerBScheme>,
}

/// A ready-to-use encryption engine.
///
/// Holds no secrets and no per-call state, so one engine can be cloned or
/// shared across threads freely.
#[derive(Debug, Clone)]
pub struct Engine {
    ready: Primitives,
    config: EngineConfig,
}

impl Engine {
    /// Self-test the cipher primitives and build an engine.
    pub fn init(config: EngineConfig) -> Result<Self> {
        Ok(Self::with_primitives(Primitives::init()?, config))
    }

    pub fn with_primitives(ready: Primitives, config: EngineConfig) -> Self {
        Self { ready, config }
    }

    pub fn primitives(&self) -> &Primitives {
        &self.ready
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encrypt a file payload, falling back to the simple engine if the
    /// layered pipeline fails.
    pub fn encrypt(&self, payload: &[u8], password: &[u8], options: Document) -> Result<EncryptOutcome> {
        self.encrypt_with_cancel(payload, password, options, &CancelToken::new())
    }

    pub fn encrypt_with_cancel(
        &self,
        payload: &[u8],
        password: &[u8],
        options: Document,
        cancel: &CancelToken,
    ) -> Result<EncryptOutcome> {
        match self.encrypt_layered(payload, password, options.clone(), cancel) {
            Ok(sealed) => {
                info!(
                    id = %sealed.package.id,
                    variant = Variant::Layered.as_str(),
                    layer_b = sealed.layer_b.as_str(),
                    len = payload.len(),
                    "encrypted"
                );
                Ok(EncryptOutcome {
                    package: sealed.bytes,
                    variant: Variant::Layered,
                    layer_b: Some(sealed.layer_b),
                    fallback_reason: None,
                })
            }
            Err(e) if e.is(ErrorKind::Cancelled) => Err(e),
            Err(e) => {
                warn!("layered encryption failed, falling back to simple encryption: {e}");
                let package = simple::encrypt(
                    &self.ready,
                    payload,
                    password,
                    self.config.pbkdf2_rounds,
                    Some(options),
                    cancel,
                )
                .map_err(|e| e.with_context("simple encryption failed"))?;
                info!(variant = Variant::Simple.as_str(), len = payload.len(), "encrypted");
                Ok(EncryptOutcome {
                    package,
                    variant: Variant::Simple,
                    layer_b: None,
                    fallback_reason: Some(e.to_string()),
                })
            }
        }
    }

    /// The layered pipeline alone, without the simple fallback.
    pub fn encrypt_layered(
        &self,
        payload: &[u8],
        password: &[u8],
        options: Document,
        cancel: &CancelToken,
    ) -> Result<LayeredSealed> {
        pipeline::encrypt(&self.ready, &self.config, payload, password, options, cancel)
            .map_err(|e| e.with_context("layered encryption failed"))
    }

    /// Decrypt a package of either variant.
    pub fn decrypt(&self, package: &[u8], password: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_cancel(package, password, &CancelToken::new())
            .map(|outcome| outcome.plaintext)
    }

    pub fn decrypt_with_cancel(
        &self,
        package: &[u8],
        password: &[u8],
        cancel: &CancelToken,
    ) -> Result<DecryptOutcome> {
        let layered_err = match self.decrypt_layered(package, password, cancel) {
            Ok(opened) => {
                info!(
                    variant = Variant::Layered.as_str(),
                    layer_b = opened.layer_b.as_str(),
                    "decrypted"
                );
                return Ok(DecryptOutcome {
                    plaintext: opened.plaintext,
                    variant: Variant::Layered,
                    layer_b: Some(opened.layer_b),
                });
            }
            Err(e) if e.is(ErrorKind::Cancelled) => return Err(e),
            Err(e) => e,
        };
        debug!("layered decryption failed, trying simple: {layered_err}");

        let simple_err = match self.decrypt_simple(package, password, cancel) {
            Ok(plaintext) => {
                info!(variant = Variant::Simple.as_str(), "decrypted");
                return Ok(DecryptOutcome {
                    plaintext,
                    variant: Variant::Simple,
                    layer_b: None,
                });
            }
            Err(e) if e.is(ErrorKind::Cancelled) => return Err(e),
            Err(e) => e,
        };

        Err(combine(layered_err, simple_err))
    }

    /// Decrypt branch for layered packages only.
    pub fn decrypt_layered(
        &self,
        package: &[u8],
        password: &[u8],
        cancel: &CancelToken,
    ) -> Result<LayeredOpened> {
        pipeline::decrypt(&self.ready, &self.config, package, password, cancel)
            .map_err(|e| e.with_context("layered decryption failed"))
    }

    /// Decrypt branch for simple packages only.
    pub fn decrypt_simple(
        &self,
        package: &[u8],
        password: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        simple::decrypt(&self.ready, package, password, self.config.pbkdf2_rounds, cancel)
            .map_err(|e| e.with_context("simple decryption failed"))
    }

    /// Encrypt text with the simple engine, returning the package as base64 text.
    pub fn encrypt_text(&self, text: &str, password: &[u8]) -> Result<String> {
        let package = simple::encrypt(
            &self.ready,
            text.as_bytes(),
            password,
            self.config.pbkdf2_rounds,
            None,
            &CancelToken::new(),
        )
        .map_err(|e| e.with_context("text encryption failed"))?;
        Ok(armor::wrap(&package))
    }

    /// Reverse [`Engine::encrypt_text`].
    pub fn decrypt_text(&self, encoded: &str, password: &[u8]) -> Result<String> {
        let package = armor::unwrap(encoded).map_err(|e| e.with_context("text decryption failed"))?;
        let plaintext = Zeroizing::new(
            self.decrypt_simple(&package, password, &CancelToken::new())
                .map_err(|e| e.with_context("text decryption failed"))?,
        );
        std::str::from_utf8(&plaintext)
            .map(str::to_owned)
            .map_err(|e| {
                StoopError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::TextEncoding,
                    "decrypted text is not valid UTF-8",
                    e,
                )
            })
    }
}

fn combine(layered_err: StoopError, simple_err: StoopError) -> StoopError {
    if layered_err.is(ErrorKind::VersionMismatch) && simple_err.is(ErrorKind::VersionMismatch) {
        return StoopError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::VersionMismatch,
            "incompatible encryption version",
            layered_err,
        );
    }
    StoopError::with_kind_and_source(
        ErrorCategory::User,
        ErrorKind::CombinedDecryption,
        format!(
            "failed to decrypt with any method ({layered_err}: {}; {simple_err}: {})",
            root_message(&layered_err),
            root_message(&simple_err)
        ),
        layered_err,
    )
}

/// Message of the innermost stoop error in a context chain.
fn root_message(err: &StoopError) -> &str {
    let mut current = err;
    while let Some(inner) = std::error::Error::source(current)
        .and_then(|source| source.downcast_ref::<StoopError>())
    {
        current = inner;
    }
    current.message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::Argon2Params;
    use crate::kdf::tests::fast_params;
    use crate::package::{LayeredPackage, SimplePackage};
    use bson::doc;

    fn config() -> EngineConfig {
        EngineConfig {
            argon2: fast_params(),
            pbkdf2_rounds: 1000,
        }
    }

    fn engine() -> Engine {
        Engine::init(config()).unwrap()
    }

    /// An engine whose layered pipeline always fails key derivation.
    fn broken_layered_engine() -> Engine {
        Engine::init(EngineConfig {
            argon2: Argon2Params {
                memory_kib: 1,
                time_cost: 1,
                parallelism: 4,
            },
            pbkdf2_rounds: 1000,
        })
        .unwrap()
    }

    #[test]
    fn test_encrypt_uses_layered() {
        let outcome = engine().encrypt(b"hello world", b"correct-horse", Document::new()).unwrap();
        assert_eq!(outcome.variant, Variant::Layered);
        assert_eq!(outcome.layer_b, Some(LayerBScheme::ChaCha20Poly1305));
        assert_eq!(outcome.fallback_reason, None);

        let opened = engine()
            .decrypt_with_cancel(&outcome.package, b"correct-horse", &CancelToken::new())
            .unwrap();
        assert_eq!(opened.plaintext, b"hello world");
        assert_eq!(opened.variant, Variant::Layered);
    }

    #[test]
    fn test_outer_fallback_to_simple() {
        let broken = broken_layered_engine();
        let options = doc! { "filename": "a.txt" };
        let outcome = broken.encrypt(b"payload", b"pw", options.clone()).unwrap();

        assert_eq!(outcome.variant, Variant::Simple);
        assert_eq!(outcome.layer_b, None);
        let reason = outcome.fallback_reason.expect("fallback reason recorded");
        assert!(reason.contains("layered encryption failed"));

        let package = SimplePackage::from_bytes(&outcome.package).unwrap();
        assert_eq!(package.options, Some(options));

        // Any engine with the same PBKDF2 rounds opens it via the simple branch.
        let opened = engine()
            .decrypt_with_cancel(&outcome.package, b"pw", &CancelToken::new())
            .unwrap();
        assert_eq!(opened.plaintext, b"payload");
        assert_eq!(opened.variant, Variant::Simple);
    }

    #[test]
    fn test_cancel_does_not_fall_back() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = engine()
            .encrypt_with_cancel(b"payload", b"pw", Document::new(), &cancel)
            .expect_err("cancelled");
        assert_eq!(err.kind, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_branches_individually() {
        let e = engine();
        let layered = e.encrypt(b"layered", b"pw", Document::new()).unwrap().package;
        let simple = armor::unwrap(&e.encrypt_text("simple", b"pw").unwrap()).unwrap();

        assert_eq!(
            e.decrypt_layered(&layered, b"pw", &CancelToken::new()).unwrap().plaintext,
            b"layered"
        );
        assert_eq!(e.decrypt_simple(&simple, b"pw", &CancelToken::new()).unwrap(), b"simple");

        let err = e
            .decrypt_layered(&simple, b"pw", &CancelToken::new())
            .expect_err("simple package in layered branch");
        assert_eq!(err.kind, Some(ErrorKind::VersionMismatch));

        let err = e
            .decrypt_simple(&layered, b"pw", &CancelToken::new())
            .expect_err("layered package in simple branch");
        assert_eq!(err.kind, Some(ErrorKind::VersionMismatch));
    }

    #[test]
    fn test_wrong_password_is_combined_failure() {
        let e = engine();
        let package = e.encrypt(b"secret", b"correct-horse", Document::new()).unwrap().package;
        let err = e.decrypt(&package, b"wrong-horse").expect_err("wrong password");
        assert_eq!(err.kind, Some(ErrorKind::CombinedDecryption));

        let msg = err.to_string();
        assert!(msg.contains("layered decryption failed"));
        assert!(msg.contains("simple decryption failed"));
        assert!(!msg.contains("wrong-horse"));
        assert!(!msg.contains("correct-horse"));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let e = engine();
        let package = e.encrypt(b"secret", b"pw", Document::new()).unwrap().package;
        let mut parsed = LayeredPackage::from_bytes(&package).unwrap();
        parsed.version = "2.0.0".to_string();

        let err = e.decrypt(&parsed.to_bytes().unwrap(), b"pw").expect_err("unknown version");
        assert_eq!(err.kind, Some(ErrorKind::VersionMismatch));
    }

    #[test]
    fn test_text_roundtrip() {
        let e = engine();
        let encoded = e.encrypt_text("grüße, world", b"pw").unwrap();
        assert!(armor::unwrap(&encoded).is_ok());
        assert_eq!(e.decrypt_text(&encoded, b"pw").unwrap(), "grüße, world");
        assert_eq!(e.decrypt_text(&e.encrypt_text("", b"pw").unwrap(), b"pw").unwrap(), "");
    }

    #[test]
    fn test_text_wrong_password_and_garbage() {
        let e = engine();
        let encoded = e.encrypt_text("text", b"pw").unwrap();

        let err = e.decrypt_text(&encoded, b"other").expect_err("wrong password");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));

        let err = e.decrypt_text("not base64!", b"pw").expect_err("garbage");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringDecode));
    }

    #[test]
    fn test_text_invalid_utf8() {
        let e = engine();
        let package = simple::encrypt(
            e.primitives(),
            &[0xff, 0xfe],
            b"pw",
            e.config().pbkdf2_rounds,
            None,
            &CancelToken::new(),
        )
        .unwrap();
        let err = e.decrypt_text(&armor::wrap(&package), b"pw").expect_err("not UTF-8");
        assert_eq!(err.kind, Some(ErrorKind::TextEncoding));
    }

    #[test]
    fn test_root_message() {
        let err = StoopError::authentication("layer A (AES-256-GCM)")
            .with_context("layered decryption failed")
            .with_context("outer");
        assert!(root_message(&err).starts_with("layer A"));
    }
}
