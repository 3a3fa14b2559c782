//! Covert-carrying ECDH-ES encryption.

use rand::{CryptoRng, Rng};
use tracing::trace;

use crate::aead::{self, IV_LEN};
use crate::ecc::{Point, Scalar};
use crate::keys::PublicKey;
use crate::token::{Header, Token};
use crate::{kdf, Error};

/// Returns the ephemeral scalar `r = t + cm mod n`.
///
/// # Errors
///
/// Returns [`Error::InvalidCovertValue`] if `r` is zero.
pub fn ephemeral_scalar(t: &Scalar, cm: u64) -> Result<Scalar, Error> {
    let r = *t + Scalar::from_u64(cm);
    if r.is_zero() {
        return Err(Error::InvalidCovertValue);
    }
    Ok(r)
}

/// Encrypts `plaintext` for `recipient` under the ephemeral scalar `t + cm`, with a random IV.
///
/// # Errors
///
/// Returns [`Error::InvalidCovertValue`] if `t + cm` is zero mod `n`, or
/// [`Error::MessageTooLong`] if the plaintext is too long to encrypt.
pub fn encrypt(
    mut rng: impl CryptoRng + Rng,
    recipient: &PublicKey,
    t: &Scalar,
    cm: u64,
    plaintext: &[u8],
) -> Result<Token, Error> {
    encrypt_with_iv(recipient, t, cm, rng.gen(), plaintext)
}

pub(crate) fn encrypt_with_iv(
    recipient: &PublicKey,
    t: &Scalar,
    cm: u64,
    iv: [u8; IV_LEN],
    plaintext: &[u8],
) -> Result<Token, Error> {
    let r = ephemeral_scalar(t, cm)?;
    let epk = PublicKey::from_point(Point::mul_gen(&r))?;

    // Z = r·Q_d, which the recipient recomputes as d·R.
    let z = kdf::shared_point(&r, &recipient.point())?;
    let cek = kdf::derive_cek(&z)?;

    let token =
        Token::seal(Header::ecdh_es(&epk), iv, |aad| aead::seal(&cek, &iv, plaintext, aad))?;
    trace!(plaintext_len = plaintext.len(), aad_len = token.aad().len(), "sealed token");
    Ok(token)
}
