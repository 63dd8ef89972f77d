use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::SafetyNetPolicy;
use crate::errors::WebauthnError;

use super::super::cbor::CborMap;
use super::super::cert::validate_certificate_path;
use super::super::cose::CoseKey;
use super::super::metadata::{MetadataStatement, RevocationChecker};
use super::android_key::AndroidKeyVerifier;
use super::android_safetynet::AndroidSafetyNetVerifier;
use super::apple::AppleVerifier;
use super::none::NoneVerifier;
use super::packed::PackedVerifier;
use super::tpm::TpmVerifier;
use super::u2f::U2fVerifier;

/// Attestation statement formats this crate can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    FidoU2f,
    Packed,
    Tpm,
    AndroidKey,
    AndroidSafetyNet,
    Apple,
}

impl AttestationFormat {
    /// The `fmt` identifier used in attestation objects
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FidoU2f => "fido-u2f",
            Self::Packed => "packed",
            Self::Tpm => "tpm",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::Apple => "apple",
        }
    }

    pub fn verifier(self) -> &'static dyn AttestationVerifier {
        match self {
            Self::None => &NoneVerifier,
            Self::FidoU2f => &U2fVerifier,
            Self::Packed => &PackedVerifier,
            Self::Tpm => &TpmVerifier,
            Self::AndroidKey => &AndroidKeyVerifier,
            Self::AndroidSafetyNet => &AndroidSafetyNetVerifier,
            Self::Apple => &AppleVerifier,
        }
    }
}

impl TryFrom<&str> for AttestationFormat {
    type Error = WebauthnError;

    fn try_from(fmt: &str) -> Result<Self, Self::Error> {
        match fmt {
            "none" => Ok(Self::None),
            "fido-u2f" => Ok(Self::FidoU2f),
            "packed" => Ok(Self::Packed),
            "tpm" => Ok(Self::Tpm),
            "android-key" => Ok(Self::AndroidKey),
            "android-safetynet" => Ok(Self::AndroidSafetyNet),
            "apple" => Ok(Self::Apple),
            other => {
                tracing::error!("Unsupported attestation format: {}", other);
                Err(WebauthnError::UnsupportedFormat(other.to_string()))
            }
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much the attestation says about the authenticator's provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationType {
    None,
    SelfAttestation,
    Basic,
    AttCa,
    AnonCa,
}

/// Trust material available to a verifier.
pub struct TrustContext<'a> {
    pub metadata: Option<&'a MetadataStatement>,
    /// Static anchors configured for the statement's format
    pub anchors: Vec<Vec<u8>>,
    pub revocation: &'a dyn RevocationChecker,
    pub safetynet: SafetyNetPolicy,
    pub now: DateTime<Utc>,
}

/// Everything a verifier needs, borrowed from the registration in progress.
pub struct VerifierInput<'a> {
    pub aaguid: [u8; 16],
    pub att_stmt: &'a CborMap,
    pub auth_data_bytes: &'a [u8],
    pub rp_id_hash: [u8; 32],
    pub client_data_hash: [u8; 32],
    pub credential_id: &'a [u8],
    pub credential_public_key: &'a CoseKey,
    pub trust: TrustContext<'a>,
}

impl VerifierInput<'_> {
    /// `authenticatorData || clientDataHash`, the message most formats sign
    pub(crate) fn signed_data(&self) -> Vec<u8> {
        crate::utils::concat(&[self.auth_data_bytes, &self.client_data_hash])
    }

    /// Validates `chain` against metadata roots first, then the static
    /// anchors for the format.
    pub(crate) fn validate_chain(
        &self,
        format: AttestationFormat,
        chain: &[Vec<u8>],
    ) -> Result<(), WebauthnError> {
        let mut anchors = match self.trust.metadata {
            Some(statement) => statement.root_certificates()?,
            None => Vec::new(),
        };
        anchors.extend(self.trust.anchors.iter().cloned());

        validate_certificate_path(chain, &anchors, self.trust.revocation, self.trust.now).map_err(
            |source| {
                tracing::error!("Certificate path validation failed for {}: {}", format, source);
                WebauthnError::CertificatePath { format, source }
            },
        )
    }
}

/// One implementation per [`AttestationFormat`].
pub trait AttestationVerifier: Send + Sync {
    fn format(&self) -> AttestationFormat;

    /// Checks the statement.
    ///
    /// # Returns
    /// * `Ok(true)` if the statement is valid
    /// * `Ok(false)` if it is well formed but its signature does not verify
    ///
    /// # Errors
    /// Structural failures are reported as `Attestation { format, .. }`,
    /// chain failures as `CertificatePath { format, .. }`.
    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError>;

    /// Classification of a statement that verified.
    fn attestation_type(&self, input: &VerifierInput<'_>) -> AttestationType;
}

/// Runs the metadata cross-check, then the format's verifier.
pub fn verify_attestation(
    format: AttestationFormat,
    input: &VerifierInput<'_>,
) -> Result<bool, WebauthnError> {
    tracing::debug!("Using '{}' attestation format", format);

    if let Some(statement) = input.trust.metadata {
        let alg = input.credential_public_key.alg();
        if !statement.allows_algorithm(alg) {
            tracing::error!(
                "Credential algorithm {} not declared in metadata for {}",
                alg,
                statement.description
            );
            return Err(WebauthnError::Metadata(format!(
                "Credential algorithm {alg} is not declared by the authenticator metadata"
            )));
        }
    }

    let verifier = format.verifier();
    debug_assert_eq!(verifier.format(), format);
    let verified = verifier.verify(input)?;
    if !verified {
        tracing::warn!("Attestation signature for '{}' did not verify", format);
    }
    Ok(verified)
}
