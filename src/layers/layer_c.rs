//! Layer C: AES-256-CBC with PKCS#7 padding, outer wrap without integrity

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};
use crate::kdf::Subkey;
use crate::primitives::Primitives;
use crate::CBC_IV_LEN;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const STAGE: &str = "layer C (AES-256-CBC)";

pub fn seal(
    _ready: &Primitives,
    plaintext: &[u8],
    key: &Subkey,
    iv: &[u8; CBC_IV_LEN],
) -> Result<Vec<u8>> {
    let enc = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv).map_err(|e| {
        StoopError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::PrimitiveUnavailable,
            format!("{STAGE}: {e}"),
        )
    })?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt and strip padding. Bad padding or a ragged length is reported as an
/// authentication failure since the usual cause is a wrong key.
pub fn open(
    _ready: &Primitives,
    ciphertext: &[u8],
    key: &Subkey,
    iv: &[u8; CBC_IV_LEN],
) -> Result<Vec<u8>> {
    let dec = Aes256CbcDec::new_from_slices(key.as_bytes(), iv).map_err(|e| {
        StoopError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::PrimitiveUnavailable,
            format!("{STAGE}: {e}"),
        )
    })?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| StoopError::authentication(STAGE))
}
