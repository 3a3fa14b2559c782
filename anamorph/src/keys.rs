//! Dictator key pairs, the shared scalar, and their JSON key file forms.

use std::fmt::{self, Debug, Formatter};

use rand::{CryptoRng, Rng};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ecc::{NistP256, Point, Scalar, COORDINATE_LEN};
use crate::recover::{self, SearchPolicy, StepTable};
use crate::token::{b64_decode, b64_encode, Token};
use crate::{decrypt, encrypt, Error};

/// The JWK key type of an elliptic curve key.
pub const KTY: &str = "EC";

/// The JWK curve name of NIST P-256.
pub const CRV: &str = "P-256";

/// A P-256 key in JSON Web Key form. The private scalar `d` is present only for private keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// The key type; always `EC`.
    pub kty: String,

    /// The curve; always `P-256`.
    pub crv: String,

    /// The base64url-encoded private scalar, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    /// The base64url-encoded affine x-coordinate.
    pub x: String,

    /// The base64url-encoded affine y-coordinate.
    pub y: String,
}

impl Jwk {
    /// Decodes and validates the key's public point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the key is not a P-256 key or its coordinates are not a
    /// non-identity point on the curve.
    pub fn to_point(&self) -> Result<Point, Error> {
        if self.kty != KTY || self.crv != CRV {
            return Err(Error::InvalidPoint);
        }
        let x = b64_decode(&self.x).ok_or(Error::InvalidPoint)?;
        let y = b64_decode(&self.y).ok_or(Error::InvalidPoint)?;
        Point::from_coordinates(&x, &y)
    }
}

impl Debug for Jwk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("d", &self.d.as_ref().map(|_| "<redacted>"))
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl From<PublicKey> for Jwk {
    fn from(pk: PublicKey) -> Self {
        Jwk { kty: KTY.into(), crv: CRV.into(), d: None, x: b64_encode(pk.x), y: b64_encode(pk.y) }
    }
}

/// A dictator's public key. Never the identity.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Jwk", into = "Jwk")]
pub struct PublicKey {
    q: Point,
    x: [u8; COORDINATE_LEN],
    y: [u8; COORDINATE_LEN],
}

impl PublicKey {
    /// Wraps the given point as a public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if `q` is the identity.
    pub fn from_point(q: Point) -> Result<PublicKey, Error> {
        let (x, y) = q.coordinates().ok_or(Error::InvalidPoint)?;
        Ok(PublicKey { q, x, y })
    }

    /// The public point.
    #[must_use]
    pub const fn point(&self) -> Point {
        self.q
    }

    /// Encrypts `plaintext` for the owner of this key, embedding the covert value `cm` in the
    /// token's ephemeral key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCovertValue`] if `t + cm` is zero mod `n`, or
    /// [`Error::MessageTooLong`] if the plaintext is too long to encrypt.
    pub fn encrypt(
        &self,
        rng: impl CryptoRng + Rng,
        shared: &SharedScalar,
        cm: u64,
        plaintext: &[u8],
    ) -> Result<Token, Error> {
        encrypt::encrypt(rng, self, &shared.0, cm, plaintext)
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x?}", self.q.to_sec1())
    }
}

impl TryFrom<Jwk> for PublicKey {
    type Error = Error;

    fn try_from(jwk: Jwk) -> Result<Self, Self::Error> {
        PublicKey::from_point(jwk.to_point()?)
    }
}

/// A dictator's private key.
#[derive(Clone)]
pub struct PrivateKey {
    d: Scalar,
    public_key: PublicKey,
}

impl PrivateKey {
    /// Generates a random private key.
    #[must_use]
    pub fn random(rng: impl CryptoRng + Rng) -> PrivateKey {
        let d = Scalar::random(rng);
        let public_key = PublicKey::from_point(Point::mul_gen(&d))
            .expect("non-zero scalars have non-identity public keys");
        PrivateKey { d, public_key }
    }

    /// Creates a private key from the given scalar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidScalar`] if `d` is zero.
    pub fn from_scalar(d: Scalar) -> Result<PrivateKey, Error> {
        if d.is_zero() {
            return Err(Error::InvalidScalar);
        }
        let public_key = PublicKey::from_point(Point::mul_gen(&d))?;
        Ok(PrivateKey { d, public_key })
    }

    /// Returns the corresponding public key.
    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Decrypts the token's cover plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid, or
    /// [`Error::AuthenticationFailed`] if the token was altered or not encrypted for this key.
    pub fn decrypt(&self, token: &Token) -> Result<Vec<u8>, Error> {
        decrypt::decrypt(&self.d, token)
    }

    fn to_jwk(&self) -> Jwk {
        Jwk { d: Some(b64_encode(self.d.to_bytes())), ..Jwk::from(self.public_key) }
    }
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.public_key.fmt(f)
    }
}

impl Eq for PrivateKey {}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl TryFrom<Jwk> for PrivateKey {
    type Error = Error;

    fn try_from(jwk: Jwk) -> Result<Self, Self::Error> {
        let q = jwk.to_point()?;
        let d = jwk.d.as_deref().and_then(b64_decode).ok_or(Error::InvalidScalar)?;
        let sk = PrivateKey::from_scalar(Scalar::from_slice(&d)?)?;
        if sk.public_key.q != q {
            return Err(Error::InvalidPoint);
        }
        Ok(sk)
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_jwk().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PrivateKey::try_from(Jwk::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// The secret scalar `t` shared between the sender and Alice.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SharedScalar(Scalar);

#[derive(Serialize, Deserialize)]
struct SharedScalarFile {
    t: String,
}

impl SharedScalar {
    /// Generates a random shared scalar.
    #[must_use]
    pub fn random(rng: impl CryptoRng + Rng) -> SharedScalar {
        SharedScalar(Scalar::random(rng))
    }

    /// Wraps the given scalar.
    #[must_use]
    pub const fn from_scalar(t: Scalar) -> SharedScalar {
        SharedScalar(t)
    }

    /// Returns the ephemeral scalar `r = t + cm mod n` a token carrying `cm` is encrypted with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCovertValue`] if `r` is zero.
    pub fn ephemeral_scalar(&self, cm: u64) -> Result<Scalar, Error> {
        encrypt::ephemeral_scalar(&self.0, cm)
    }

    /// Recovers the smallest covert value in `[0, max]` carried by the token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid, or
    /// [`Error::CovertValueNotFound`] if no value in range matches.
    pub fn recover(&self, token: &Token, max: u64) -> Result<u64, Error> {
        self.recover_with(token, &SearchPolicy::new().with_max(max))
    }

    /// Recovers the covert value carried by the token using the given search policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid,
    /// [`Error::CovertValueNotFound`] if no value in range matches, or [`Error::SearchTimedOut`]
    /// if the policy's timeout passes first.
    pub fn recover_with(&self, token: &Token, policy: &SearchPolicy) -> Result<u64, Error> {
        recover::recover(&self.0, token, policy)
    }

    /// Recovers the covert value carried by the token using a precomputed step table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the token's ephemeral key is invalid, or
    /// [`Error::CovertValueNotFound`] if no value in the table's range matches.
    pub fn recover_with_table(
        &self,
        token: &Token,
        table: &StepTable<NistP256>,
    ) -> Result<u64, Error> {
        table.search(&self.0, &token.ephemeral_key()?)
    }

    /// Opens a token known to carry `cm`, as its sender or Alice would.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] if the token does not carry `cm` for this shared
    /// scalar, was altered, or was not encrypted for `recipient`.
    pub fn open(&self, cm: u64, recipient: &PublicKey, token: &Token) -> Result<Vec<u8>, Error> {
        let r = self.ephemeral_scalar(cm).map_err(|_| Error::AuthenticationFailed)?;
        decrypt::decrypt_ephemeral(&r, recipient, token)
    }
}

impl Debug for SharedScalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SharedScalar(<redacted>)")
    }
}

impl Serialize for SharedScalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SharedScalarFile { t: b64_encode(self.0.to_bytes()) }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedScalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let file = SharedScalarFile::deserialize(deserializer)?;
        b64_decode(&file.t)
            .ok_or(Error::InvalidScalar)
            .and_then(|t| Scalar::from_slice(&t))
            .map(SharedScalar)
            .map_err(D::Error::custom)
    }
}

/// Everything a new deployment needs: the dictator's key pair and the shared scalar.
#[derive(Debug)]
pub struct KeySet {
    /// The dictator's private key.
    pub dictator: PrivateKey,

    /// The scalar shared between the sender and Alice.
    pub shared: SharedScalar,
}

impl KeySet {
    /// Generates a dictator key pair and a shared scalar, both uniformly random in `[1, n)`.
    #[must_use]
    pub fn generate(mut rng: impl CryptoRng + Rng) -> KeySet {
        KeySet { dictator: PrivateKey::random(&mut rng), shared: SharedScalar::random(&mut rng) }
    }
}
