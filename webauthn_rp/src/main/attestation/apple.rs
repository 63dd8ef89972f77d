use ring::digest;
use x509_parser::der_parser::ber::BerObjectContent;

use crate::errors::WebauthnError;

use super::super::cert::{context_explicit, find_extension, parse_der_exact, public_key_matches};
use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};
use super::utils::{parse_leaf, require_x5c};

const FORMAT: AttestationFormat = AttestationFormat::Apple;

/// Apple anonymous attestation nonce extension, 1.2.840.113635.100.8.2
const OID_APPLE_NONCE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x63, 0x64, 0x08, 0x02];

/// `apple`: anonymous attestation from Apple platform authenticators.
///
/// There is no statement signature. The leaf certificate is minted per
/// credential, carries a nonce binding it to this registration, and
/// certifies the credential key itself.
pub(super) struct AppleVerifier;

impl AttestationVerifier for AppleVerifier {
    fn format(&self) -> AttestationFormat {
        FORMAT
    }

    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        tracing::debug!("Verifying Apple anonymous attestation");

        let x5c = require_x5c(input.att_stmt, FORMAT)?;
        let cert = parse_leaf(&x5c, FORMAT)?;

        let ext = find_extension(&cert, OID_APPLE_NONCE).ok_or_else(|| {
            tracing::error!("Apple nonce extension not found in credential certificate");
            WebauthnError::attestation(FORMAT, "Missing nonce extension")
        })?;
        let nonce = parse_nonce_extension(ext.value)?;

        let expected = digest::digest(&digest::SHA256, &input.signed_data());
        if nonce != expected.as_ref() {
            tracing::error!("Apple nonce does not match SHA-256(authData || clientDataHash)");
            return Err(WebauthnError::attestation(
                FORMAT,
                "Nonce does not match authenticator data and client data hash",
            ));
        }

        if !public_key_matches(&cert, input.credential_public_key) {
            return Err(WebauthnError::attestation(
                FORMAT,
                "Credential certificate key does not match credential public key",
            ));
        }

        input.validate_chain(FORMAT, &x5c)?;
        Ok(true)
    }

    fn attestation_type(&self, _input: &VerifierInput<'_>) -> AttestationType {
        AttestationType::AnonCa
    }
}

/// `SEQUENCE { [1] EXPLICIT OCTET STRING nonce }`
fn parse_nonce_extension(value: &[u8]) -> Result<&[u8], WebauthnError> {
    let invalid = || WebauthnError::attestation(FORMAT, "Malformed nonce extension");

    let outer = parse_der_exact(value, "Apple nonce extension")?;
    let items = outer.as_sequence().map_err(|e| {
        tracing::error!("Apple nonce extension is not a SEQUENCE: {}", e);
        WebauthnError::Decode(format!("Apple nonce extension is not a SEQUENCE: {e}"))
    })?;
    for item in items {
        if let Some((1, inner)) = context_explicit(item, "Apple nonce")? {
            return match inner.content {
                BerObjectContent::OctetString(nonce) => Ok(nonce),
                _ => Err(invalid()),
            };
        }
    }
    Err(invalid())
}
