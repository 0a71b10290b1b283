//! Base64 text encoding for binary data
//!
//! Used in two places: binary fields inside a package document are stored as
//! standard base64 text, and packages produced for text flows travel as
//! standard base64 of the whole BSON document so they survive a text field.

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use base64::{Engine, engine::general_purpose::STANDARD};

/// Encode bytes as standard (padded) base64 text.
pub fn wrap(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Decode standard base64 text, ignoring surrounding whitespace.
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    STANDARD.decode(armored.trim()).map_err(|e| {
        StoopError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::ArmoringDecode,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })
}

/// Decode a named base64 package field that must have an exact length.
pub(crate) fn unwrap_field<const N: usize>(field: &str, armored: &str) -> Result<[u8; N]> {
    let bytes = unwrap(armored).map_err(|e| e.with_context(format!("invalid field '{field}'")))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        StoopError::package_format(format!(
            "field '{field}' must be {N} bytes, got {len}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes() {
        let armored = wrap(b"");
        assert_eq!(armored, "");
        assert_eq!(unwrap(&armored).unwrap(), b"");
    }

    #[test]
    fn test_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();
        let armored = wrap(&bytes);

        assert!(armored.starts_with("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8g"));
        assert!(armored.ends_with("8PHy8/T19vf4+fr7/P3+/w=="));
        assert_eq!(unwrap(&armored).unwrap(), bytes);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let armored = format!("  {}\n", wrap(b"hello"));
        assert_eq!(unwrap(&armored).unwrap(), b"hello");
    }

    #[test]
    fn test_bad_base64() {
        let err = unwrap("bad$$").expect_err("expected base64 decode error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringDecode));
    }

    #[test]
    fn test_unwrap_field_length() {
        let nonce: [u8; 12] = unwrap_field("iv", &wrap(&[7u8; 12])).unwrap();
        assert_eq!(nonce, [7u8; 12]);

        let err = unwrap_field::<12>("iv", &wrap(&[7u8; 11])).expect_err("short field");
        assert_eq!(err.kind, Some(ErrorKind::PackageFormat));
        assert!(err.to_string().contains("'iv'"));

        let err = unwrap_field::<12>("iv", "%%").expect_err("bad base64 field");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringDecode));
    }
}
