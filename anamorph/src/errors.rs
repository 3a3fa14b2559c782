use thiserror::Error;

/// The error type for all anamorphic operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A scalar was negative, unparseable, of the wrong length, or zero where a private key was
    /// expected.
    #[error("invalid scalar")]
    InvalidScalar,

    /// A point was malformed, not on the curve, the identity, or did not match its private key.
    #[error("invalid point")]
    InvalidPoint,

    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),

    /// The token's authentication tag did not verify.
    ///
    /// The token may have been altered, or it may not have been encrypted for the given key.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The covert value and shared scalar combine into a zero ephemeral scalar.
    #[error("invalid covert value")]
    InvalidCovertValue,

    /// No covert value in `[0, max]` matches the token's ephemeral key.
    #[error("covert value not found in 0..={max}")]
    CovertValueNotFound {
        /// The inclusive upper bound of the search.
        max: u64,
    },

    /// The search deadline passed before the range was exhausted.
    #[error("covert value search timed out after {searched} guesses")]
    SearchTimedOut {
        /// The guess index at which the search stopped.
        searched: u64,
    },

    /// The plaintext exceeds the AES-GCM length limit.
    #[error("message too long")]
    MessageTooLong,

    /// A key file could not be parsed.
    #[error("invalid key file: {0}")]
    KeyFile(#[from] serde_json::Error),
}

impl Error {
    /// Returns a stable, machine-readable identifier for the error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Error::InvalidScalar => "invalid_scalar",
            Error::InvalidPoint => "invalid_point",
            Error::MalformedToken(_) => "malformed_token",
            Error::AuthenticationFailed => "authentication_failed",
            Error::InvalidCovertValue => "invalid_covert_value",
            Error::CovertValueNotFound { .. } => "covert_value_not_found",
            Error::SearchTimedOut { .. } => "search_timed_out",
            Error::MessageTooLong => "message_too_long",
            Error::KeyFile(_) => "invalid_key_file",
        }
    }
}
