//! Password sources

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passwords from various sources
pub trait PasswordReader {
    /// Read a password as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed password (for testing and embedding)
pub struct ConstantPasswordReader {
    password: Zeroizing<Vec<u8>>,
}

impl ConstantPasswordReader {
    pub fn new(password: Vec<u8>) -> Self {
        Self {
            password: Zeroizing::new(password),
        }
    }
}

impl PasswordReader for ConstantPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new((*self.password).clone()))
    }
}

/// Reads the password from any io::Read source until EOF.
///
/// One trailing line ending (`\n` or `\r\n`) is dropped so that
/// `echo secret | stoop ...` and a typed password agree.
pub struct StreamPasswordReader {
    reader: Box<dyn Read + Send>,
}

impl StreamPasswordReader {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self { reader }
    }
}

impl PasswordReader for StreamPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            StoopError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading password: {}", e),
                e,
            )
        })?;
        if data.ends_with(b"\n") {
            data.pop();
            if data.ends_with(b"\r") {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Reads the password from the terminal with no echo
pub struct TerminalPasswordReader {
    confirm: bool,
}

impl TerminalPasswordReader {
    pub fn new() -> Self {
        Self { confirm: false }
    }

    /// Prompt twice and require both entries to match. Used when a typo would
    /// lock the user out of what is about to be encrypted.
    pub fn confirming() -> Self {
        Self { confirm: true }
    }

    fn prompt(label: &str) -> Result<Zeroizing<Vec<u8>>> {
        io::stderr().write_all(label.as_bytes()).map_err(|e| {
            StoopError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })?;
        io::stderr().flush().map_err(|e| {
            StoopError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // Note: rpassword returns String (UTF-8 only), not zeroized
        let password = rpassword::read_password().map_err(|e| {
            StoopError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(password.into_bytes()))
    }
}

impl Default for TerminalPasswordReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordReader for TerminalPasswordReader {
    /// Read password from terminal.
    ///
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    /// For non-UTF-8 passwords, use --passphrase-stdin instead.
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(StoopError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        let password = Self::prompt("Password (stoop): ")?;
        if self.confirm {
            let again = Self::prompt("Confirm password (stoop): ")?;
            if *again != *password {
                return Err(StoopError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PassphraseUnavailable,
                    "passwords do not match",
                ));
            }
        }
        Ok(password)
    }
}
