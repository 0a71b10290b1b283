//! Cipher readiness handle
//!
//! Every cipher operation takes a [`Primitives`] handle, and the only way to
//! obtain one is to run the start-up self-test. AES-256-GCM and AES-256-CBC
//! are mandatory: if either fails its self-test no handle is produced.
//! ChaCha20-Poly1305 is optional; when it is unavailable layer B runs on its
//! AES-256-GCM substitute.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use tracing::{debug, warn};

use crate::error::{ErrorCategory, ErrorKind, Result, StoopError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SELF_TEST_KEY: [u8; 32] = [0x5a; 32];
const SELF_TEST_NONCE: [u8; 12] = [0xa5; 12];
const SELF_TEST_IV: [u8; 16] = [0x3c; 16];
const SELF_TEST_MESSAGE: &[u8] = b"stoop primitive self-test";

/// Proof that the cipher primitives passed their self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitives {
    chacha20poly1305: bool,
}

impl Primitives {
    /// Run the self-test for every primitive.
    pub fn init() -> Result<Self> {
        Self::self_test_mandatory()?;
        let chacha20poly1305 = self_test_chacha20poly1305();
        if !chacha20poly1305 {
            warn!("ChaCha20-Poly1305 self-test failed; layer B will use AES-256-GCM");
        }
        debug!(chacha20poly1305, "cipher primitives ready");
        Ok(Self { chacha20poly1305 })
    }

    /// Like [`Primitives::init`], but treats ChaCha20-Poly1305 as unavailable
    /// so layer B always takes its AES-256-GCM substitute.
    pub fn init_without_chacha20poly1305() -> Result<Self> {
        Self::self_test_mandatory()?;
        debug!("cipher primitives ready; ChaCha20-Poly1305 disabled");
        Ok(Self {
            chacha20poly1305: false,
        })
    }

    pub fn chacha20poly1305_available(&self) -> bool {
        self.chacha20poly1305
    }

    fn self_test_mandatory() -> Result<()> {
        if !self_test_aes_gcm() {
            return Err(unavailable("AES-256-GCM"));
        }
        if !self_test_aes_cbc() {
            return Err(unavailable("AES-256-CBC"));
        }
        Ok(())
    }
}

fn unavailable(name: &str) -> StoopError {
    StoopError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::PrimitiveUnavailable,
        format!("{name} failed its self-test"),
    )
}

fn self_test_aes_gcm() -> bool {
    let cipher = Aes256Gcm::new(&SELF_TEST_KEY.into());
    let nonce = SELF_TEST_NONCE.into();
    cipher
        .encrypt(&nonce, SELF_TEST_MESSAGE)
        .ok()
        .filter(|sealed| sealed.len() == SELF_TEST_MESSAGE.len() + crate::TAG_LEN)
        .and_then(|sealed| cipher.decrypt(&nonce, sealed.as_slice()).ok())
        .is_some_and(|opened| opened == SELF_TEST_MESSAGE)
}

fn self_test_chacha20poly1305() -> bool {
    let cipher = ChaCha20Poly1305::new(&SELF_TEST_KEY.into());
    let nonce = SELF_TEST_NONCE.into();
    cipher
        .encrypt(&nonce, SELF_TEST_MESSAGE)
        .ok()
        .filter(|sealed| sealed.len() == SELF_TEST_MESSAGE.len() + crate::TAG_LEN)
        .and_then(|sealed| cipher.decrypt(&nonce, sealed.as_slice()).ok())
        .is_some_and(|opened| opened == SELF_TEST_MESSAGE)
}

fn self_test_aes_cbc() -> bool {
    let Ok(enc) = Aes256CbcEnc::new_from_slices(&SELF_TEST_KEY, &SELF_TEST_IV) else {
        return false;
    };
    let sealed = enc.encrypt_padded_vec_mut::<Pkcs7>(SELF_TEST_MESSAGE);
    if sealed.len() % 16 != 0 || sealed.as_slice() == SELF_TEST_MESSAGE {
        return false;
    }
    let Ok(dec) = Aes256CbcDec::new_from_slices(&SELF_TEST_KEY, &SELF_TEST_IV) else {
        return false;
    };
    dec.decrypt_padded_vec_mut::<Pkcs7>(&sealed)
        .is_ok_and(|opened| opened == SELF_TEST_MESSAGE)
}
