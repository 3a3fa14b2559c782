//! The compact token format: `header.iv.ciphertext.tag`.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aead::{self, IV_LEN, TAG_LEN};
use crate::ecc::Point;
use crate::kdf::ALGORITHM;
use crate::keys::{Jwk, PublicKey};
use crate::Error;

pub(crate) fn b64_encode(b: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(b)
}

pub(crate) fn b64_decode(s: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(s).ok()
}

/// The protected header of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// The key management algorithm; always `ECDH-ES`.
    pub alg: String,

    /// The content encryption algorithm; always `A256GCM`.
    pub enc: String,

    /// The ephemeral public key `R`.
    pub epk: Jwk,
}

impl Header {
    pub(crate) fn ecdh_es(epk: &PublicKey) -> Header {
        Header { alg: ALGORITHM.into(), enc: aead::LABEL.into(), epk: Jwk::from(*epk) }
    }

    fn encode(&self) -> Result<String, Error> {
        serde_json::to_vec(self)
            .map(b64_encode)
            .map_err(|_| Error::MalformedToken("unserializable header"))
    }
}

/// An encrypted token.
///
/// The header segment is kept exactly as encoded: it is the associated data of the ciphertext, so
/// it is never re-serialized from [`Header`].
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    protected: String,
    header: Header,
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl Token {
    pub(crate) fn seal(
        header: Header,
        iv: [u8; IV_LEN],
        seal: impl FnOnce(&[u8]) -> Result<(Vec<u8>, [u8; TAG_LEN]), Error>,
    ) -> Result<Token, Error> {
        let protected = header.encode()?;
        let (ciphertext, tag) = seal(protected.as_bytes())?;
        Ok(Token { protected, header, iv, ciphertext, tag })
    }

    /// Decodes a compact token.
    ///
    /// Accepts the four-segment form and the five-segment JWE form with an empty encrypted key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if the token has the wrong number of segments, a segment
    /// is not unpadded base64url, the IV or tag has the wrong length, or the header is not a
    /// supported JSON header.
    pub fn decode(s: &str) -> Result<Token, Error> {
        let segments = s.trim().split('.').collect::<Vec<_>>();
        let (protected, iv, ciphertext, tag) = match segments.as_slice() {
            [protected, iv, ciphertext, tag] => (*protected, *iv, *ciphertext, *tag),
            [protected, "", iv, ciphertext, tag] => (*protected, *iv, *ciphertext, *tag),
            _ => return Err(Error::MalformedToken("wrong number of segments")),
        };

        let header =
            b64_decode(protected).ok_or(Error::MalformedToken("invalid header encoding"))?;
        let header = serde_json::from_slice::<Header>(&header)
            .map_err(|_| Error::MalformedToken("invalid header"))?;
        if header.alg != ALGORITHM {
            return Err(Error::MalformedToken("unsupported key management algorithm"));
        }
        if header.enc != aead::LABEL {
            return Err(Error::MalformedToken("unsupported content encryption algorithm"));
        }

        let iv = b64_decode(iv)
            .and_then(|iv| <[u8; IV_LEN]>::try_from(iv).ok())
            .ok_or(Error::MalformedToken("invalid IV"))?;
        let ciphertext =
            b64_decode(ciphertext).ok_or(Error::MalformedToken("invalid ciphertext encoding"))?;
        let tag = b64_decode(tag)
            .and_then(|tag| <[u8; TAG_LEN]>::try_from(tag).ok())
            .ok_or(Error::MalformedToken("invalid tag"))?;

        Ok(Token { protected: protected.to_string(), header, iv, ciphertext, tag })
    }

    /// Encodes the token in its four-segment compact form.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.protected,
            b64_encode(self.iv),
            b64_encode(&self.ciphertext),
            b64_encode(self.tag)
        )
    }

    /// The decoded protected header.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// The associated data of the ciphertext: the header segment as it was encoded.
    #[must_use]
    pub fn aad(&self) -> &[u8] {
        self.protected.as_bytes()
    }

    /// The AES-GCM IV.
    #[must_use]
    pub const fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// The ciphertext, without its tag.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The authentication tag.
    #[must_use]
    pub const fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Decodes and validates the ephemeral public key `R` from the header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if `epk` is not a P-256 key whose coordinates are a
    /// non-identity point on the curve.
    pub fn ephemeral_key(&self) -> Result<Point, Error> {
        self.header.epk.to_point()
    }

    /// Returns the SHA-256 digest of the compressed ephemeral public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the ephemeral public key is invalid.
    pub fn fingerprint(&self) -> Result<[u8; 32], Error> {
        let q_e = self.ephemeral_key()?;
        Ok(Sha256::digest(q_e.to_sec1()).into())
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.encode())
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::decode(s)
    }
}
