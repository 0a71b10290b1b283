use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee the error is not caused by the
    /// user (a wrong password looks exactly like a corrupted package), merely
    /// that it cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Key derivation rejected its inputs (invalid Argon2 parameters, unusable
    /// salt, PBKDF2 misuse).
    Derivation,
    /// An integrity check failed: AEAD tag mismatch in any layer, or invalid
    /// CBC padding in the outer layer. Caused by a wrong password, tampering
    /// or corruption.
    AuthenticationFailed,
    /// The package carries a version this implementation does not handle.
    VersionMismatch,
    /// A cipher primitive could not be invoked with the given inputs, or failed
    /// its readiness self-test.
    PrimitiveUnavailable,
    /// Both the layered and the simple decryption branch failed.
    CombinedDecryption,
    /// The package document is not valid BSON or lacks/mangles a field.
    PackageFormat,
    /// Base64 decoding of a transported package or package field failed.
    ArmoringDecode,
    /// Decrypted text is not valid UTF-8.
    TextEncoding,
    /// The caller cancelled the operation.
    Cancelled,
    /// The password could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// Unexpected state reached within stoop logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct StoopError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl StoopError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for a tag/padding failure in a named stage.
    pub(crate) fn authentication(stage: &str) -> Self {
        Self::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            format!("{stage}: corrupt input, tampered-with data, or bad password"),
        )
    }

    /// Shorthand for a malformed package document or field.
    pub(crate) fn package_format(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::PackageFormat, msg)
    }

    pub(crate) fn cancelled() -> Self {
        Self::with_kind(
            ErrorCategory::User,
            ErrorKind::Cancelled,
            "operation cancelled",
        )
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns true if the error carries the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StoopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_preserves_kind_and_chain() {
        let inner = StoopError::authentication("layer A (AES-256-GCM)");
        let outer = inner.with_context("layered decryption failed");

        assert_eq!(outer.kind, Some(ErrorKind::AuthenticationFailed));
        assert_eq!(outer.category, ErrorCategory::User);
        assert_eq!(outer.message(), "layered decryption failed");

        let source = outer.source().expect("context must keep the source");
        assert!(source.to_string().contains("layer A"));
    }

    #[test]
    fn test_is() {
        let err = StoopError::cancelled();
        assert!(err.is(ErrorKind::Cancelled));
        assert!(!err.is(ErrorKind::Io));

        let untagged = StoopError::new(ErrorCategory::Internal, "untagged");
        assert!(!untagged.is(ErrorKind::Io));
    }
}
