//! ECDH-ES key agreement and the concatenation KDF.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::aead;
use crate::ecc::{Point, Scalar};
use crate::Error;

/// The JOSE key management algorithm identifier for direct ECDH-ES key agreement.
pub const ALGORITHM: &str = "ECDH-ES";

/// Calculates the ECDH shared point `[d]Q`.
///
/// # Errors
///
/// Returns [`Error::InvalidPoint`] if `q` or the shared point is the identity.
pub fn shared_point(d: &Scalar, q: &Point) -> Result<Point, Error> {
    if q.is_identity() {
        return Err(Error::InvalidPoint);
    }
    let z = *q * *d;
    if z.is_identity() {
        return Err(Error::InvalidPoint);
    }
    Ok(z)
}

/// Fills `out` using the single-step concatenation KDF with SHA-256, as profiled for JOSE: each
/// round hashes `counter || Z || OtherInfo`, where `OtherInfo` is the length-prefixed algorithm
/// ID, empty PartyUInfo and PartyVInfo, and the output length in bits.
///
/// # Panics
///
/// Panics if `algorithm_id` is 4 GiB or longer, or if `out` is 512 MiB or longer, since their
/// lengths are encoded as 32-bit integers.
pub fn concat_kdf(z: &[u8], algorithm_id: &[u8], out: &mut [u8]) {
    let alg_len = u32::try_from(algorithm_id.len()).expect("algorithm ID should be < 4 GiB");
    let key_data_len = u32::try_from(out.len() * 8).expect("output should be < 512 MiB");

    for (counter, chunk) in (1u32..).zip(out.chunks_mut(32)) {
        let block = Sha256::new()
            .chain_update(counter.to_be_bytes())
            .chain_update(z)
            .chain_update(alg_len.to_be_bytes())
            .chain_update(algorithm_id)
            .chain_update(0u32.to_be_bytes())
            .chain_update(0u32.to_be_bytes())
            .chain_update(key_data_len.to_be_bytes())
            .finalize();
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}

/// Derives the content encryption key from an ECDH shared point.
///
/// # Errors
///
/// Returns [`Error::InvalidPoint`] if the shared point is the identity.
pub fn derive_cek(shared: &Point) -> Result<Zeroizing<[u8; aead::KEY_LEN]>, Error> {
    let (x, _) = shared.coordinates().ok_or(Error::InvalidPoint)?;
    let x = Zeroizing::new(x);
    let mut cek = Zeroizing::new([0u8; aead::KEY_LEN]);
    concat_kdf(x.as_slice(), aead::LABEL.as_bytes(), cek.as_mut_slice());
    Ok(cek)
}
