//! Errors of the SASL engine

use std::str::Utf8Error;

use base64::DecodeError;
use hmac::digest::InvalidLength;

/// Error raised while processing a response from the client.
///
/// These are framing errors of a non-conforming client or failures of the credential store.
/// Wrong credentials are not errors, they complete the mechanism as not authenticated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MechanismError {
    /// Parsing str error
    #[error(transparent)]
    Utf8Error(#[from] Utf8Error),

    /// The first NUL separator of a PLAIN response is missing
    #[error("Invalid PLAIN encoding, authzid null terminator not found")]
    AuthzidTerminatorNotFound,

    /// The second NUL separator of a PLAIN response is missing
    #[error("Invalid PLAIN encoding, authcid null terminator not found")]
    AuthcidTerminatorNotFound,

    /// The client first message doesn't start with a supported GS2 header
    #[error("Cannot parse GS2-header")]
    CannotParseGs2Header,

    /// The client first message doesn't have the expected attributes
    #[error("Cannot parse client first message")]
    CannotParseClientFirstMessage,

    /// The username contains an `=` that is not followed by `2C` or `3D`
    #[error("Invalid username")]
    InvalidUsername,

    /// The client final message doesn't have the expected attributes
    #[error("Cannot parse client final message")]
    CannotParseClientFinalMessage,

    /// The client final message doesn't have a proof
    #[error("Client final message does not have proof")]
    ProofNotFoundInClientFinal,

    /// Error decoding base64 values
    #[error(transparent)]
    Base64DecodeError(#[from] DecodeError),

    /// Error from `Mac::new_from_slice`
    #[error(transparent)]
    HmacErrorInvalidLength(#[from] InvalidLength),

    /// A response arrived after the mechanism has completed
    #[error("No response expected in state {0}")]
    IllegalState(&'static str),

    /// The credential store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors reported by a [`CredentialStore`](crate::store::CredentialStore)
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    /// Beginning or committing a transaction failed
    #[error("Credential store transaction failed: {0}")]
    Transaction(String),

    /// A stored credential could not be decoded
    #[error("Malformed stored credential: {0}")]
    MalformedCredential(String),
}

/// Errors deriving or decoding a [`Credential`](crate::store::Credential)
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Error normalizing password
    #[error("Error normalizing password")]
    NormalizeError(#[from] stringprep::Error),

    /// Error from `Mac::new_from_slice` or PBKDF2
    #[error(transparent)]
    HmacErrorInvalidLength(#[from] InvalidLength),

    /// Error decoding base64 values
    #[error(transparent)]
    Base64DecodeError(#[from] DecodeError),

    /// The encoded SCRAM value is not `storedKey|serverKey`
    #[error("Encoded SCRAM credential must be \"storedKey|serverKey\"")]
    MissingServerKey,

    /// The algorithm id is not one of the known SCRAM or PBKDF2 ids
    #[error("Unsupported credential algorithm: {0}")]
    UnsupportedAlgorithm(String),
}
