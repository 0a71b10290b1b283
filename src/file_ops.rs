//! File encryption/decryption operations
//!
//! A stoop file is a single serialized package with nothing around it.
//! Outputs are written with mode 0o600 on Unix systems.

use crate::cancel::CancelToken;
use crate::engine::{EncryptOutcome, Engine};
use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use crate::package;
use crate::passphrase::PasswordReader;
use bson::Document;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// File name suffix of encrypted files.
pub const ENCRYPTED_SUFFIX: &str = ".stoop";

/// Suffix appended to the name of a decrypted file.
pub const DECRYPTED_SUFFIX: &str = "_decrypted";

/// Result of [`encrypt_file`].
#[derive(Debug)]
pub struct EncryptedFile {
    pub path: PathBuf,
    pub outcome: EncryptOutcome,
}

/// `notes.txt` becomes `notes.txt.stoop`.
pub fn default_encrypted_path(input_path: &Path) -> PathBuf {
    let mut name = OsString::from(input_path.as_os_str());
    name.push(ENCRYPTED_SUFFIX);
    PathBuf::from(name)
}

/// `notes.txt.stoop` becomes `notes.txt_decrypted`; a name without the
/// `.stoop` suffix just gets `_decrypted` appended.
pub fn default_decrypted_path(input_path: &Path) -> PathBuf {
    let base = if input_path.extension().is_some_and(|ext| ext == "stoop") {
        input_path.with_extension("")
    } else {
        input_path.to_path_buf()
    };
    let mut name = base.into_os_string();
    name.push(DECRYPTED_SUFFIX);
    PathBuf::from(name)
}

/// Encrypt a file with a password
///
/// Reads plaintext from `input_path`, encrypts it with `engine` and writes the
/// package to `output_path`, or to [`default_encrypted_path`] when none is given.
pub fn encrypt_file(
    engine: &Engine,
    input_path: &Path,
    output_path: Option<&Path>,
    password_reader: &mut dyn PasswordReader,
    options: Document,
    cancel: &CancelToken,
) -> Result<EncryptedFile> {
    let output_path = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_encrypted_path(input_path));

    let plaintext = Zeroizing::new(fs::read(input_path).map_err(|e| read_error(input_path, e))?);
    let password = password_reader.read_password()?;
    let outcome = engine
        .encrypt_with_cancel(&plaintext, &password, options, cancel)
        .map_err(|e| e.with_context("encryption failed"))?;
    write_file_secure(&output_path, &outcome.package)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    debug!(
        output = %output_path.display(),
        variant = outcome.variant.as_str(),
        "wrote encrypted file"
    );
    Ok(EncryptedFile {
        path: output_path,
        outcome,
    })
}

/// Decrypt a file with a password
///
/// Reads a package from `input_path`, decrypts it and writes the plaintext to
/// `output_path`, or to [`default_decrypted_path`] when none is given.
pub fn decrypt_file(
    engine: &Engine,
    input_path: &Path,
    output_path: Option<&Path>,
    password_reader: &mut dyn PasswordReader,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    let output_path = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_decrypted_path(input_path));

    let package = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let password = password_reader.read_password()?;
    let outcome = engine
        .decrypt_with_cancel(&package, &password, cancel)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    let plaintext = Zeroizing::new(outcome.plaintext);
    write_file_secure(&output_path, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    debug!(
        output = %output_path.display(),
        variant = outcome.variant.as_str(),
        "wrote decrypted file"
    );
    Ok(output_path)
}

/// Update an encrypted file with new plaintext using the same password
///
/// This function:
/// 1. Decrypts the existing package at `crypt_path` to validate the password
/// 2. Reads new plaintext from `plain_path`
/// 3. Encrypts it with the validated password and the existing option bag
/// 4. Atomically writes to `crypt_path` (tempfile + fsync + rename)
///
/// Either the old package or the new one is on disk afterwards, never a
/// partial file.
pub fn update_file(
    engine: &Engine,
    plain_path: &Path,
    crypt_path: &Path,
    password_reader: &mut dyn PasswordReader,
    cancel: &CancelToken,
) -> Result<EncryptOutcome> {
    let existing = fs::read(crypt_path).map_err(|e| read_error(crypt_path, e))?;
    let password = password_reader.read_password()?;

    // Validate password by decrypting existing file (discard plaintext)
    let previous = engine
        .decrypt_with_cancel(&existing, &password, cancel)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    drop(Zeroizing::new(previous.plaintext));
    let options = package::peek_options(&existing)?;

    let crypt_dir = match crypt_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => {
            return Err(StoopError::with_kind(
                ErrorCategory::User,
                ErrorKind::Io,
                "crypt_path has no parent directory",
            ));
        }
    };
    let new_plaintext =
        Zeroizing::new(fs::read(plain_path).map_err(|e| read_error(plain_path, e))?);
    let outcome = engine
        .encrypt_with_cancel(&new_plaintext, &password, options, cancel)
        .map_err(|e| e.with_context("failed to encrypt"))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(crypt_dir)
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to create tempfile", e))?;
    temp_file
        .write_all(&outcome.package)
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error(ErrorCategory::Internal, "failed to set tempfile permissions", e))?;
    }
    temp_file.persist(crypt_path).map_err(|e| {
        io_error(
            ErrorCategory::Internal,
            format!("failed to rename to target file {}", crypt_path.display()),
            e.error,
        )
    })?;

    debug!(
        output = %crypt_path.display(),
        variant = outcome.variant.as_str(),
        "replaced encrypted file"
    );
    Ok(outcome)
}

/// Write file with secure permissions (0o600 on Unix)
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| io_error(ErrorCategory::User, format!("failed to open {}", path.display()), e))?;

        file.write_all(contents).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                format!("failed to write {}", path.display()),
                e,
            )
        })
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .map_err(|e| io_error(ErrorCategory::User, format!("failed to write {}", path.display()), e))
    }
}

/// Read the text for `encrypt-text` from `input_path`, or from `fallback`
/// when no path is given. One trailing line ending is dropped.
pub fn read_text(input_path: Option<&Path>, fallback: &mut dyn Read) -> Result<String> {
    let mut raw = match input_path {
        Some(path) => fs::read(path).map_err(|e| read_error(path, e))?,
        None => {
            let mut raw = Vec::new();
            fallback
                .read_to_end(&mut raw)
                .map_err(|e| io_error(ErrorCategory::Internal, "failed to read text from stdin", e))?;
            raw
        }
    };
    if raw.ends_with(b"\n") {
        raw.pop();
        if raw.ends_with(b"\r") {
            raw.pop();
        }
    }
    String::from_utf8(raw).map_err(|e| {
        StoopError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::TextEncoding,
            "text to encrypt is not valid UTF-8",
            e,
        )
    })
}

fn io_error(category: ErrorCategory, msg: impl Into<String>, err: io::Error) -> StoopError {
    StoopError::with_kind_and_source(category, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> StoopError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    io_error(category, format!("failed to read from {}", path.display()), err)
}
