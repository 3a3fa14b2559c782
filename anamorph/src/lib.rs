//! Anamorphic encryption over NIST P-256.
//!
//! A token produced by this crate is an ordinary `ECDH-ES`/`A256GCM` compact token: its recipient
//! (the "dictator") decrypts it with their private key and reads an innocuous cover plaintext.
//! The token's ephemeral key, however, is `(t + cm)·G`, where `t` is a scalar shared between the
//! sender and a third party, Alice. Knowing `t`, Alice recovers the covert value `cm` by searching
//! a bounded range; without `t`, the ephemeral key is indistinguishable from a random one.
//!
//! ```rust
//! use anamorph::{KeySet, Token};
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! // The dictator's key pair and the scalar shared by the sender and Alice.
//! let keys = KeySet::generate(rand::thread_rng());
//! let dictator_pub = keys.dictator.public_key();
//!
//! // The sender encrypts a cover message for the dictator, carrying the covert value 42.
//! let token = dictator_pub.encrypt(rand::thread_rng(), &keys.shared, 42, b"all is well")?;
//! let compact = token.to_string();
//!
//! // The dictator decrypts the cover message.
//! let token = compact.parse::<Token>()?;
//! assert_eq!(b"all is well".to_vec(), keys.dictator.decrypt(&token)?);
//!
//! // Alice recovers the covert value.
//! assert_eq!(42, keys.shared.recover(&token, 1000)?);
//! #
//! #   Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use self::{
    ecc::{Curve, NistP256, Point, Scalar},
    errors::*,
    keys::{Jwk, KeySet, PrivateKey, PublicKey, SharedScalar},
    recover::{SearchPolicy, StepTable, Strategy, DEFAULT_MAX_SEARCH, MAX_BABY_STEPS},
    token::{Header, Token},
};

pub mod aead;
mod decrypt;
pub mod ecc;
mod encrypt;
mod errors;
pub mod kdf;
mod keys;
pub mod recover;
mod token;
