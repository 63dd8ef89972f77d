use crate::errors::WebauthnError;

use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};

/// `none`: the authenticator chose not to attest, typical for platform
/// authenticators and privacy-preserving clients.
pub(super) struct NoneVerifier;

impl AttestationVerifier for NoneVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::None
    }

    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        if !input.att_stmt.is_empty() {
            tracing::error!(
                "attStmt must be empty for none attestation, found {} entries",
                input.att_stmt.len()
            );
            return Err(WebauthnError::UnsupportedFormat(
                "none attestation with a non-empty statement".to_string(),
            ));
        }
        Ok(true)
    }

    fn attestation_type(&self, _input: &VerifierInput<'_>) -> AttestationType {
        AttestationType::None
    }
}
