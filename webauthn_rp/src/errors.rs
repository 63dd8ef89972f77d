use thiserror::Error;

use crate::main::{AttestationFormat, PathError};
use crate::utils::UtilError;

/// Errors that can occur while verifying WebAuthn responses.
///
/// A signature that simply does not verify is not an error: verifiers report
/// it as `Ok(false)` and the ceremony result carries `verified: false`. Every
/// variant here aborts the ceremony.
///
/// Callers should log the specific error and answer the client with a generic
/// message; [`WebauthnError::kind`] groups the variants for that mapping.
#[derive(Debug, Error)]
pub enum WebauthnError {
    /// Malformed CBOR, ASN.1, TPM structure, JSON or base64 input
    #[error("Decode error: {0}")]
    Decode(String),

    /// COSE key with missing or inconsistent fields
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// `clientDataJSON.type` is not the literal expected for the ceremony
    #[error("Invalid client data type. Expected: {expected}, Got: {actual}")]
    ClientDataType { expected: String, actual: String },

    /// Challenge in client data did not match the expected challenge
    #[error("Challenge verification failed: {0}")]
    Challenge(String),

    /// Origin in client data is not one of the expected origins
    #[error("Invalid origin: {0}")]
    Origin(String),

    /// rpIdHash did not match any accepted RP ID
    #[error("RP ID hash mismatch: {0}")]
    RpIdHash(String),

    /// User Present flag not set
    #[error("User not present")]
    UserNotPresent,

    /// User Verified flag not set while verification is required
    #[error("User verification required but flag not set")]
    UserNotVerified,

    /// Response does not carry a usable credential (id mismatch, disallowed
    /// algorithm, missing attested data)
    #[error("Credential mismatch: {0}")]
    CredentialMismatch(String),

    /// Assertion refers to a credential other than the stored one
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    /// Assertion userHandle differs from the stored user handle
    #[error("User handle mismatch")]
    UserHandleMismatch,

    /// Unknown attestation statement format
    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    /// Unknown or unsupported COSE algorithm
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    /// A structural attestation statement check failed
    #[error("Attestation verification failed ({format}): {reason}")]
    Attestation {
        format: AttestationFormat,
        reason: String,
    },

    /// Attestation payload timestamp is older than the freshness window
    #[error("Attestation expired ({format}): {reason}")]
    TimestampExpired {
        format: AttestationFormat,
        reason: String,
    },

    /// Attestation payload timestamp is ahead of the verification time
    #[error("Attestation timestamp in the future ({format}): {reason}")]
    TimestampInFuture {
        format: AttestationFormat,
        reason: String,
    },

    /// Attestation certificate chain does not lead to a trusted anchor
    #[error("Certificate path validation failed ({format}): {source}")]
    CertificatePath {
        format: AttestationFormat,
        #[source]
        source: PathError,
    },

    /// Metadata lookup failed or disagrees with the response
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Invalid relying party configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from utility operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

/// Coarse classification of [`WebauthnError`] for callers that only need to
/// pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Validation,
    Unsupported,
    Attestation,
    CertificatePath,
    Metadata,
    Config,
}

impl WebauthnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::MalformedKey(_) | Self::Utils(_) => ErrorKind::Decode,
            Self::ClientDataType { .. }
            | Self::Challenge(_)
            | Self::Origin(_)
            | Self::RpIdHash(_)
            | Self::UserNotPresent
            | Self::UserNotVerified
            | Self::CredentialMismatch(_)
            | Self::CredentialNotFound(_)
            | Self::UserHandleMismatch => ErrorKind::Validation,
            Self::UnsupportedFormat(_) | Self::UnsupportedAlgorithm(_) => ErrorKind::Unsupported,
            Self::Attestation { .. }
            | Self::TimestampExpired { .. }
            | Self::TimestampInFuture { .. } => ErrorKind::Attestation,
            Self::CertificatePath { .. } => ErrorKind::CertificatePath,
            Self::Metadata(_) => ErrorKind::Metadata,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn attestation(format: AttestationFormat, reason: impl Into<String>) -> Self {
        Self::Attestation {
            format,
            reason: reason.into(),
        }
    }
}
