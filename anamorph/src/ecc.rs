//! NIST P-256 scalar and point arithmetic.

use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

use num_bigint::BigUint;
use p256::elliptic_curve::ops::{Reduce, ReduceNonZero};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::{Field, Group};
use p256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, U256};
use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;

use crate::Error;

/// The length of an encoded scalar in bytes.
pub const SCALAR_LEN: usize = 32;

/// The length of an encoded affine coordinate in bytes.
pub const COORDINATE_LEN: usize = 32;

/// The length of a compressed SEC1-encoded point in bytes.
pub const POINT_LEN: usize = 33;

/// The order `n` of the P-256 base point, big-endian.
pub const ORDER: [u8; SCALAR_LEN] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63, 0x25, 0x51,
];

/// A scalar of the NIST P-256 curve, always reduced mod `n`.
#[derive(Debug, Clone, Copy)]
pub struct Scalar(p256::Scalar);

impl Scalar {
    /// The zero scalar.
    pub const ZERO: Scalar = Scalar(p256::Scalar::ZERO);

    /// Generates a uniformly random scalar in `[1, n)`.
    #[must_use]
    pub fn random(mut rng: impl CryptoRng + Rng) -> Scalar {
        let b = FieldBytes::from(rng.gen::<[u8; SCALAR_LEN]>());
        Scalar(<p256::Scalar as ReduceNonZero<U256>>::reduce_nonzero_bytes(&b))
    }

    /// Interprets the given bytes as a big-endian integer and reduces it mod `n`.
    #[must_use]
    pub fn reduce(b: [u8; SCALAR_LEN]) -> Scalar {
        let b = FieldBytes::from(b);
        Scalar(<p256::Scalar as Reduce<U256>>::reduce_bytes(&b))
    }

    /// Interprets the given slice as a 32-byte big-endian integer and reduces it mod `n`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidScalar`] if the slice is not exactly 32 bytes long.
    pub fn from_slice(b: &[u8]) -> Result<Scalar, Error> {
        <[u8; SCALAR_LEN]>::try_from(b).map(Scalar::reduce).map_err(|_| Error::InvalidScalar)
    }

    /// Returns the scalar `v mod n`.
    #[must_use]
    pub fn from_u64(v: u64) -> Scalar {
        Scalar(p256::Scalar::from(v))
    }

    /// Returns the big-endian encoding of the scalar.
    #[must_use]
    pub fn to_bytes(self) -> [u8; SCALAR_LEN] {
        self.0.to_bytes().into()
    }

    /// Returns `true` iff the scalar is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero().into()
    }

    fn from_biguint(v: &BigUint) -> Scalar {
        let reduced = v % BigUint::from_bytes_be(&ORDER);
        let be = reduced.to_bytes_be();
        let mut b = [0u8; SCALAR_LEN];
        b[SCALAR_LEN - be.len()..].copy_from_slice(&be);
        Scalar::reduce(b)
    }
}

impl Add<Scalar> for Scalar {
    type Output = Scalar;

    fn add(self, rhs: Scalar) -> Self::Output {
        Scalar(self.0 + rhs.0)
    }
}

impl Eq for Scalar {}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer of any magnitude and reduces it mod `n`.
impl FromStr for Scalar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => (hex, 16),
            None => (s, 10),
        };
        if digits.starts_with(|c| c == '-' || c == '+') {
            return Err(Error::InvalidScalar);
        }
        BigUint::parse_bytes(digits.as_bytes(), radix)
            .map(|v| Scalar::from_biguint(&v))
            .ok_or(Error::InvalidScalar)
    }
}

/// A NIST P-256 point. May be the identity only when produced by arithmetic; decoded points never
/// are.
#[derive(Debug, Clone, Copy)]
pub struct Point(ProjectivePoint);

impl Point {
    /// The identity point.
    pub const IDENTITY: Point = Point(ProjectivePoint::IDENTITY);

    /// The curve's generator.
    pub const GENERATOR: Point = Point(ProjectivePoint::GENERATOR);

    /// Multiplies the curve's generator by the given scalar.
    #[must_use]
    pub fn mul_gen(d: &Scalar) -> Point {
        Point(ProjectivePoint::GENERATOR * d.0)
    }

    /// Decodes a point from its big-endian affine coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if either coordinate is not 32 bytes long or if `(x, y)` is
    /// not a non-identity point on the curve.
    pub fn from_coordinates(x: &[u8], y: &[u8]) -> Result<Point, Error> {
        let x = <[u8; COORDINATE_LEN]>::try_from(x).map_err(|_| Error::InvalidPoint)?;
        let y = <[u8; COORDINATE_LEN]>::try_from(y).map_err(|_| Error::InvalidPoint)?;
        let encoded =
            EncodedPoint::from_affine_coordinates(&FieldBytes::from(x), &FieldBytes::from(y), false);
        Point::from_encoded(&encoded)
    }

    /// Decodes a SEC1-encoded point, compressed or uncompressed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoint`] if the bytes do not encode a non-identity point on the
    /// curve.
    pub fn from_sec1(b: &[u8]) -> Result<Point, Error> {
        let encoded = EncodedPoint::from_bytes(b).map_err(|_| Error::InvalidPoint)?;
        Point::from_encoded(&encoded)
    }

    fn from_encoded(encoded: &EncodedPoint) -> Result<Point, Error> {
        let q: Option<AffinePoint> = AffinePoint::from_encoded_point(encoded).into();
        let q = ProjectivePoint::from(q.ok_or(Error::InvalidPoint)?);
        if q.is_identity().into() {
            return Err(Error::InvalidPoint);
        }
        Ok(Point(q))
    }

    /// Returns the big-endian affine coordinates of the point, or `None` for the identity.
    #[must_use]
    pub fn coordinates(&self) -> Option<([u8; COORDINATE_LEN], [u8; COORDINATE_LEN])> {
        let encoded = self.0.to_affine().to_encoded_point(false);
        Some(((*encoded.x()?).into(), (*encoded.y()?).into()))
    }

    /// Returns the SEC1 encoding of the point: compressed, or the single byte `0x00` for the
    /// identity.
    #[must_use]
    pub fn to_sec1(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    /// Returns `true` iff the point is the identity.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.0.is_identity().into()
    }

    /// Compares two points in constant time.
    #[must_use]
    pub fn ct_eq(&self, other: &Point) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Point {}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Add<Point> for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Self::Output {
        Point(self.0 + rhs.0)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Self::Output {
        Point(-self.0)
    }
}

impl Sub<Point> for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Self::Output {
        Point(self.0 - rhs.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;

    fn mul(self, rhs: Scalar) -> Self::Output {
        Point(self.0 * rhs.0)
    }
}

/// A prime-order group in which a covert value can be searched for.
///
/// The recovery search only needs these operations, which lets it run against a small group in
/// tests.
pub trait Curve {
    /// A scalar, reduced mod the group order.
    type Scalar: Copy + Send + Sync + Add<Output = Self::Scalar>;

    /// A group element.
    type Point: Copy + Send + Sync + Add<Output = Self::Point> + Sub<Output = Self::Point>;

    /// Returns `v` reduced mod the group order.
    fn scalar(v: u64) -> Self::Scalar;

    /// Returns the group's generator.
    fn generator() -> Self::Point;

    /// Multiplies the generator by `s`.
    fn mul_gen(s: &Self::Scalar) -> Self::Point;

    /// Compares two points without branching on their values.
    fn points_eq(a: &Self::Point, b: &Self::Point) -> bool;

    /// Returns a canonical byte encoding of `p`, usable as a lookup key.
    fn point_key(p: &Self::Point) -> Vec<u8>;
}

/// The NIST P-256 curve.
#[derive(Debug, Clone, Copy)]
pub struct NistP256;

impl Curve for NistP256 {
    type Scalar = Scalar;
    type Point = Point;

    fn scalar(v: u64) -> Scalar {
        Scalar::from_u64(v)
    }

    fn generator() -> Point {
        Point::GENERATOR
    }

    fn mul_gen(s: &Scalar) -> Point {
        Point::mul_gen(s)
    }

    fn points_eq(a: &Point, b: &Point) -> bool {
        a.ct_eq(b)
    }

    fn point_key(p: &Point) -> Vec<u8> {
        p.to_sec1()
    }
}
