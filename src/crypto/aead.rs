use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::crypto::random::random_array;
use crate::error::Error;

/// Length of an XChaCha20-Poly1305 key.
pub const KEY_LEN: usize = 32;
/// Length of an XChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 24;
/// Length of the Poly1305 authentication tag appended to ciphertexts.
pub const TAG_LEN: usize = 16;

/// A fresh 24-byte random nonce.
///
/// The 192-bit nonce space makes birthday collisions negligible; nonces are
/// never reused under the same key.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], Error> {
    random_array::<NONCE_LEN>()
}

/// Encrypts with XChaCha20-Poly1305; the 16-byte tag is appended.
pub fn encrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Protocol("encryption failed".to_string()))
}

/// Decrypts with XChaCha20-Poly1305.
///
/// Any mismatch of key, nonce, ciphertext, tag, or AAD yields
/// [`Error::Authentication`].
pub fn decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::Authentication)
}

/// Non-failing variant of [`decrypt`]: `None` instead of an error.
pub fn try_decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Option<Vec<u8>> {
    decrypt(key, nonce, ciphertext, aad).ok()
}
