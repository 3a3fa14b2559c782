//! ECDH-ES decryption of the cover plaintext.

use tracing::trace;

use crate::ecc::{Point, Scalar};
use crate::keys::PublicKey;
use crate::token::Token;
use crate::{aead, kdf, Error};

/// Decrypts the token's cover plaintext with the recipient's private scalar `d`.
///
/// # Errors
///
/// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid, or
/// [`Error::AuthenticationFailed`] if the tag does not verify.
pub fn decrypt(d: &Scalar, token: &Token) -> Result<Vec<u8>, Error> {
    let epk = token.ephemeral_key()?;
    let z = kdf::shared_point(d, &epk)?;
    open(&z, token)
}

/// Decrypts the token's cover plaintext with its ephemeral scalar `r` and the recipient's public
/// key.
///
/// # Errors
///
/// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid, or
/// [`Error::AuthenticationFailed`] if `r` is not the token's ephemeral scalar or the tag does not
/// verify.
pub fn decrypt_ephemeral(
    r: &Scalar,
    recipient: &PublicKey,
    token: &Token,
) -> Result<Vec<u8>, Error> {
    let epk = token.ephemeral_key()?;
    if !Point::mul_gen(r).ct_eq(&epk) {
        return Err(Error::AuthenticationFailed);
    }
    let z = kdf::shared_point(r, &recipient.point())?;
    open(&z, token)
}

fn open(z: &Point, token: &Token) -> Result<Vec<u8>, Error> {
    let cek = kdf::derive_cek(z)?;
    let plaintext = aead::open(&cek, token.iv(), token.ciphertext(), token.tag(), token.aad())?;
    trace!(plaintext_len = plaintext.len(), "opened token");
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    use super::*;
    use crate::keys::{KeySet, PrivateKey, SharedScalar};
    use crate::token::{b64_encode, Header};

    const PLAINTEXT: &[u8] = br#"{"sub":"alice"}"#;

    const TOKEN: &str = "eyJhbGciOiJFQ0RILUVTIiwiZW5jIjoiQTI1NkdDTSIsImVwayI6eyJrdHkiOiJFQyIsImNydiI6IlAtMjU2IiwieCI6IkEyYXhrSHNQRDZLM3UyTkEzOVBzdm5ia1hmMGxfQlU5dUkzSE5XdTg1U3MiLCJ5IjoiUzlkWjdMYm9iSXQ5YkNvX3MxZ1p2bHo0Wk9uaG1ERGtBa3BrS1JDT0ZWRSJ9fQ.yv66vvrO263eyviI.7NxPymsgijBzuk289-lt.U5R0vA_iWn5YZ5fs5CTryw";

    const JWE_TOKEN: &str = "eyJhbGciOiAiRUNESC1FUyIsICJlbmMiOiAiQTI1NkdDTSIsICJlcGsiOiB7Imt0eSI6ICJFQyIsICJjcnYiOiAiUC0yNTYiLCAieCI6ICJBMmF4a0hzUEQ2SzN1Mk5BMzlQc3ZuYmtYZjBsX0JVOXVJM0hOV3U4NVNzIiwgInkiOiAiUzlkWjdMYm9iSXQ5YkNvX3MxZ1p2bHo0Wk9uaG1ERGtBa3BrS1JDT0ZWRSJ9fQ..yv66vvrO263eyviI.7NxPymsgijIwt0i28a4y59d4nWBRCZ4AFq-8ZXGcX_3otCyyEq5GLhCTfeENDbksqiec.cqNGUeDIUzaoFUPKWxMXkA";

    fn scenario() -> (PrivateKey, SharedScalar) {
        let sk0 = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
            .parse()
            .expect("valid scalar");
        let t = "0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789"
            .parse()
            .expect("valid scalar");
        (PrivateKey::from_scalar(sk0).expect("non-zero"), SharedScalar::from_scalar(t))
    }

    #[test]
    fn round_trip() {
        let mut rng = ChaChaRng::seed_from_u64(0xDEADBEEF);
        let keys = KeySet::generate(&mut rng);
        let token = keys
            .dictator
            .public_key()
            .encrypt(&mut rng, &keys.shared, 7, b"this is a cover message")
            .expect("should encrypt");
        let token = token.to_string().parse::<Token>().expect("should decode");

        assert_eq!(
            b"this is a cover message".to_vec(),
            keys.dictator.decrypt(&token).expect("should decrypt")
        );
    }

    #[test]
    fn empty_plaintext() {
        let mut rng = ChaChaRng::seed_from_u64(0xDEADBEEF);
        let keys = KeySet::generate(&mut rng);
        let token = keys
            .dictator
            .public_key()
            .encrypt(&mut rng, &keys.shared, 0, b"")
            .expect("should encrypt");
        assert!(token.ciphertext().is_empty());
        assert!(keys.dictator.decrypt(&token).expect("should decrypt").is_empty());
    }

    #[test]
    fn cover_plaintext_is_independent_of_covert_value() {
        let mut rng = ChaChaRng::seed_from_u64(0xDEADBEEF);
        let keys = KeySet::generate(&mut rng);
        let pk = keys.dictator.public_key();

        for cm in [0, 1, 42, 999, u64::MAX] {
            let token = pk.encrypt(&mut rng, &keys.shared, cm, PLAINTEXT).expect("should encrypt");
            assert_eq!(PLAINTEXT, keys.dictator.decrypt(&token).expect("should decrypt"));
        }
    }

    #[test]
    fn known_answer() {
        let (sk0, t) = scenario();
        let token = TOKEN.parse::<Token>().expect("should decode");
        assert_eq!(PLAINTEXT, sk0.decrypt(&token).expect("should decrypt"));
        assert_eq!(42, t.recover(&token, 100).expect("should recover"));
        assert_eq!(PLAINTEXT, t.open(42, &sk0.public_key(), &token).expect("should open"));
    }

    #[test]
    fn jwe_interop() {
        let (sk0, t) = scenario();
        let token = JWE_TOKEN.parse::<Token>().expect("should decode");
        assert_eq!(
            br#"{"sub": "alice", "iat": 1710000000, "role": "user"}"#.to_vec(),
            sk0.decrypt(&token).expect("should decrypt")
        );
        assert_eq!(42, t.recover(&token, 100).expect("should recover"));

        // Re-encoding keeps the header segment as received and drops the empty key segment.
        assert_eq!(JWE_TOKEN.replacen("..", ".", 1), token.to_string());
    }

    #[test]
    fn wrong_private_key() {
        let (_, t) = scenario();
        let token = TOKEN.parse::<Token>().expect("should decode");
        let other = PrivateKey::random(ChaChaRng::seed_from_u64(0xDEADBEEF));
        assert_matches!(other.decrypt(&token), Err(Error::AuthenticationFailed));
        assert_matches!(t.open(42, &other.public_key(), &token), Err(Error::AuthenticationFailed));
    }

    #[test]
    fn wrong_covert_value() {
        let (sk0, t) = scenario();
        let token = TOKEN.parse::<Token>().expect("should decode");
        assert_matches!(t.open(41, &sk0.public_key(), &token), Err(Error::AuthenticationFailed));
    }

    #[test]
    fn reserialized_header() {
        let (sk0, _) = scenario();
        let token = TOKEN.parse::<Token>().expect("should decode");
        let (_, rest) = TOKEN.split_once('.').expect("has segments");

        // Semantically equal, but not the authenticated bytes.
        let header = serde_json::to_string_pretty(token.header()).expect("should serialize");
        let altered = format!("{}.{rest}", b64_encode(header)).parse::<Token>().expect("valid");
        assert_eq!(token.header(), altered.header());
        assert_matches!(sk0.decrypt(&altered), Err(Error::AuthenticationFailed));
    }

    #[test]
    fn flip_every_bit() {
        let (sk0, _) = scenario();
        let token = TOKEN.parse::<Token>().expect("should decode");
        let header = TOKEN.split('.').next().expect("has header");

        let encode = |iv: &[u8], ciphertext: &[u8], tag: &[u8]| {
            format!("{header}.{}.{}.{}", b64_encode(iv), b64_encode(ciphertext), b64_encode(tag))
        };
        let parts = [token.iv().to_vec(), token.ciphertext().to_vec(), token.tag().to_vec()];

        for part in 0..parts.len() {
            for i in 0..parts[part].len() {
                for j in 0u8..8 {
                    let mut parts = parts.clone();
                    parts[part][i] ^= 1 << j;
                    let altered = encode(&parts[0], &parts[1], &parts[2])
                        .parse::<Token>()
                        .expect("should decode");
                    assert_matches!(
                        sk0.decrypt(&altered),
                        Err(Error::AuthenticationFailed),
                        "bit flip in segment {part}, byte {i}, bit {j} produced a valid message"
                    );
                }
            }
        }

        let (_, rest) = TOKEN.split_once('.').expect("has segments");
        let header = crate::token::b64_decode(header).expect("valid base64url");
        for i in 0..header.len() {
            for j in 0u8..8 {
                let mut header = header.clone();
                header[i] ^= 1 << j;
                let altered = format!("{}.{rest}", b64_encode(&header));
                match altered.parse::<Token>() {
                    Ok(token) if token.ephemeral_key().is_ok() => assert_matches!(
                        sk0.decrypt(&token),
                        Err(Error::AuthenticationFailed),
                        "header bit flip at byte {i}, bit {j} produced a valid message"
                    ),
                    Ok(token) => assert_matches!(sk0.decrypt(&token), Err(Error::InvalidPoint)),
                    Err(e) => assert_matches!(e, Error::MalformedToken(_)),
                }
            }
        }
    }

    #[test]
    fn substituted_ephemeral_key() {
        let (sk0, _) = scenario();
        let (_, rest) = TOKEN.split_once('.').expect("has segments");

        // A well-formed header naming a different, valid ephemeral key.
        let other = PrivateKey::random(ChaChaRng::seed_from_u64(0xDEADBEEF));
        let header = serde_json::to_string(&Header::ecdh_es(&other.public_key()))
            .expect("should serialize");
        let altered = format!("{}.{rest}", b64_encode(header)).parse::<Token>().expect("valid");
        assert!(altered.ephemeral_key().is_ok());
        assert_matches!(sk0.decrypt(&altered), Err(Error::AuthenticationFailed));
    }
}
