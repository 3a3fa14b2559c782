//! AES-256-GCM with detached tags.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use zeroize::Zeroize;

use crate::Error;

/// The JOSE content encryption algorithm identifier.
pub const LABEL: &str = "A256GCM";

/// The length of a key in bytes.
pub const KEY_LEN: usize = 32;

/// The length of an IV in bytes.
pub const IV_LEN: usize = 12;

/// The length of an authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypts `plaintext` and returns the ciphertext and its detached tag.
///
/// # Errors
///
/// Returns [`Error::MessageTooLong`] if `plaintext` exceeds the GCM length limit.
pub fn seal(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN]), Error> {
    let aes = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut ciphertext = plaintext.to_vec();
    let tag = aes
        .encrypt_in_place_detached(Nonce::from_slice(iv), aad, &mut ciphertext)
        .map_err(|_| Error::MessageTooLong)?;
    Ok((ciphertext, tag.into()))
}

/// Decrypts `ciphertext` iff `tag` authenticates it and `aad` under `key` and `iv`.
///
/// # Errors
///
/// Returns [`Error::AuthenticationFailed`] if the tag does not verify. No plaintext is released in
/// that case.
pub fn open(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let aes = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut plaintext = ciphertext.to_vec();
    match aes.decrypt_in_place_detached(
        Nonce::from_slice(iv),
        aad,
        &mut plaintext,
        Tag::from_slice(tag),
    ) {
        Ok(()) => Ok(plaintext),
        Err(_) => {
            plaintext.zeroize();
            Err(Error::AuthenticationFailed)
        }
    }
}
