//! Encrypted package documents
//!
//! A package is a single BSON document; binary values are stored as standard
//! base64 strings. The two variants are told apart by their `version` field,
//! which is always checked before any other field is interpreted.
//!
//! Layered:
//! ```text
//! { version: "1.0.0", id, salt, ivs: { aes, chacha, cbc }, authTag,
//!   encrypted, algorithm: "layered", timestamp, options: { ... } }
//! ```
//!
//! `timestamp` is written as int64 but read from int32, int64 or double, since
//! JavaScript encoders store `Date.now()` as a double. `algorithm` is
//! informational and never checked on read.
//!
//! Simple:
//! ```text
//! { version: "1.0.0-simple", salt, iv, authTag, encrypted,
//!   id?, algorithm?: "simple", timestamp?, options? }
//! ```

use bson::{Bson, Document};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};

/// Version tag of layered packages.
pub const LAYERED_VERSION: &str = "1.0.0";

/// Version tag of simple packages.
pub const SIMPLE_VERSION: &str = "1.0.0-simple";

/// Which pipeline produced a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Layered,
    Simple,
}

impl Variant {
    /// The discriminator stored in the `algorithm` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Layered => "layered",
            Variant::Simple => "simple",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Variant::Layered => LAYERED_VERSION,
            Variant::Simple => SIMPLE_VERSION,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-layer nonces of a layered package, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerNonces {
    pub aes: String,
    pub chacha: String,
    pub cbc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayeredPackage {
    pub version: String,
    pub id: String,
    pub salt: String,
    pub ivs: LayerNonces,
    /// Layer A tag.
    pub auth_tag: String,
    /// Layer C output.
    pub encrypted: String,
    pub algorithm: String,
    /// Milliseconds since the Unix epoch.
    #[serde(deserialize_with = "timestamp_from_number")]
    pub timestamp: i64,
    /// Caller metadata; carried verbatim and not authenticated.
    #[serde(default)]
    pub options: Document,
}

impl LayeredPackage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Parse a layered package, rejecting other versions before anything else.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        parse(bytes, Variant::Layered)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplePackage {
    pub version: String,
    pub salt: String,
    pub iv: String,
    pub auth_tag: String,
    pub encrypted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_timestamp_from_number"
    )]
    pub timestamp: Option<i64>,
    /// Set when a file payload fell back to the simple engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Document>,
}

impl SimplePackage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Parse a simple package, rejecting other versions before anything else.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        parse(bytes, Variant::Simple)
    }
}

/// Read just enough of a document to report its version tag.
pub fn peek_version(bytes: &[u8]) -> Result<String> {
    let doc = read_document(bytes)?;
    version_of(&doc).map(str::to_owned)
}

/// The caller's option bag of either variant; empty when the package has none.
pub fn peek_options(bytes: &[u8]) -> Result<Document> {
    let doc = read_document(bytes)?;
    Ok(doc.get_document("options").cloned().unwrap_or_default())
}

fn timestamp_from_number<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    timestamp_of(Bson::deserialize(deserializer)?)
}

fn optional_timestamp_from_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Bson>::deserialize(deserializer)? {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => timestamp_of(value).map(Some),
    }
}

fn timestamp_of<E: de::Error>(value: Bson) -> std::result::Result<i64, E> {
    match value {
        Bson::Int64(v) => Ok(v),
        Bson::Int32(v) => Ok(i64::from(v)),
        // Saturating; fractional milliseconds are dropped.
        Bson::Double(v) if v.is_finite() => Ok(v as i64),
        other => Err(E::custom(format!(
            "timestamp must be a number, got {:?}",
            other.element_type()
        ))),
    }
}

fn serialize<T: Serialize>(package: &T) -> Result<Vec<u8>> {
    bson::to_vec(package).map_err(|e| {
        StoopError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to serialize package",
            e,
        )
    })
}

fn parse<T: DeserializeOwned>(bytes: &[u8], variant: Variant) -> Result<T> {
    let doc = read_document(bytes)?;
    let version = version_of(&doc)?;
    if version != variant.version() {
        return Err(StoopError::with_kind(
            ErrorCategory::User,
            ErrorKind::VersionMismatch,
            format!(
                "incompatible package version '{version}' (expected '{}' for a {variant} package)",
                variant.version()
            ),
        ));
    }
    bson::from_document(doc).map_err(|e| {
        StoopError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::PackageFormat,
            format!("malformed {variant} package"),
            e,
        )
    })
}

fn read_document(bytes: &[u8]) -> Result<Document> {
    Document::from_reader(&mut &bytes[..]).map_err(|e| {
        StoopError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::PackageFormat,
            "input is not a package document",
            e,
        )
    })
}

fn version_of(doc: &Document) -> Result<&str> {
    doc.get_str("version")
        .map_err(|_| StoopError::package_format("package has no version field"))
}
