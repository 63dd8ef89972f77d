use oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY;

use crate::errors::WebauthnError;

use super::super::cose::{CoseAlgorithm, CoseCurve, CoseKey};
use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};
use super::utils::{get_bytes, parse_leaf, require_x5c};

const FORMAT: AttestationFormat = AttestationFormat::FidoU2f;

/// `fido-u2f`: legacy CTAP1 security keys.
pub(super) struct U2fVerifier;

impl AttestationVerifier for U2fVerifier {
    fn format(&self) -> AttestationFormat {
        FORMAT
    }

    /// Verifies a FIDO-U2F attestation statement
    ///
    /// The statement carries exactly one attestation certificate and a
    /// signature over
    /// `0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F`,
    /// where `publicKeyU2F` is the credential key as an uncompressed P-256
    /// point.
    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        tracing::debug!("Verifying FIDO-U2F attestation");

        let sig = get_bytes(input.att_stmt, "sig", FORMAT)?;
        let x5c = require_x5c(input.att_stmt, FORMAT)?;
        if x5c.len() != 1 {
            tracing::error!("U2F x5c must hold exactly one certificate, got {}", x5c.len());
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("x5c must contain exactly one certificate, found {}", x5c.len()),
            ));
        }

        if input.aaguid != [0u8; 16] {
            return Err(WebauthnError::attestation(
                FORMAT,
                "AAGUID must be zero for U2F authenticators",
            ));
        }

        let public_key_u2f = match input.credential_public_key {
            key @ CoseKey::Ec2 {
                crv: CoseCurve::P256,
                ..
            } => key.to_raw_key()?,
            _ => {
                return Err(WebauthnError::attestation(
                    FORMAT,
                    "Credential public key must be an EC2 P-256 key",
                ));
            }
        };

        let cert = parse_leaf(&x5c, FORMAT)?;
        let spki = cert.public_key();
        if spki.algorithm.algorithm != OID_KEY_TYPE_EC_PUBLIC_KEY
            || spki.subject_public_key.data.len() != 65
        {
            return Err(WebauthnError::attestation(
                FORMAT,
                "Attestation certificate key must be an EC P-256 key",
            ));
        }

        input.validate_chain(FORMAT, &x5c)?;

        let mut verification_data = Vec::with_capacity(1 + 32 + 32 + input.credential_id.len() + 65);
        verification_data.push(0x00);
        verification_data.extend_from_slice(&input.rp_id_hash);
        verification_data.extend_from_slice(&input.client_data_hash);
        verification_data.extend_from_slice(input.credential_id);
        verification_data.extend_from_slice(&public_key_u2f);

        super::super::cert::verify_with_certificate(&cert, CoseAlgorithm::ES256, sig, &verification_data)
    }

    fn attestation_type(&self, _input: &VerifierInput<'_>) -> AttestationType {
        AttestationType::Basic
    }
}
