use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::{
    OID_X509_COMMON_NAME, OID_X509_COUNTRY_NAME, OID_X509_ORGANIZATION_NAME,
    OID_X509_ORGANIZATIONAL_UNIT,
};
use x509_parser::x509::X509Version;

use crate::errors::WebauthnError;

use super::super::cbor::map_get;
use super::super::cert::{subject_attribute, verify_with_certificate};
use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};
use super::utils::{check_aaguid_extension, check_leaf_basics, get_alg, get_bytes, get_x5c, parse_leaf};

const FORMAT: AttestationFormat = AttestationFormat::Packed;

const REQUIRED_OU: &str = "Authenticator Attestation";

/// `packed`: the WebAuthn-native format, with either a certificate chain or
/// a self signature by the credential key.
pub(super) struct PackedVerifier;

impl AttestationVerifier for PackedVerifier {
    fn format(&self) -> AttestationFormat {
        FORMAT
    }

    /// Verifies a packed attestation statement
    ///
    /// # Errors
    /// * `Attestation` if the statement uses ECDAA, if a self-attestation
    ///   algorithm differs from the credential's, or if the certificate
    ///   requirements are not met
    /// * `CertificatePath` if the chain does not lead to a trust anchor
    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        let alg = get_alg(input.att_stmt, FORMAT)?;
        let sig = get_bytes(input.att_stmt, "sig", FORMAT)?;

        if map_get(input.att_stmt, "ecdaaKeyId").is_some() {
            tracing::error!("ECDAA attestation is not supported");
            return Err(WebauthnError::attestation(
                FORMAT,
                "ECDAA attestation is not supported",
            ));
        }

        let signed_data = input.signed_data();

        let Some(x5c) = get_x5c(input.att_stmt, FORMAT)? else {
            tracing::debug!("Self attestation");
            let credential_alg = input.credential_public_key.alg();
            if alg != credential_alg {
                tracing::error!(
                    "Self attestation alg {} differs from credential alg {}",
                    alg,
                    credential_alg
                );
                return Err(WebauthnError::attestation(
                    FORMAT,
                    format!("Statement algorithm {alg} does not match credential algorithm {credential_alg}"),
                ));
            }
            return input.credential_public_key.verify(sig, &signed_data);
        };

        tracing::debug!("Full attestation with certificate chain");
        let cert = parse_leaf(&x5c, FORMAT)?;
        verify_attestation_certificate(&cert, input)?;
        input.validate_chain(FORMAT, &x5c)?;

        verify_with_certificate(&cert, alg, sig, &signed_data)
    }

    fn attestation_type(&self, input: &VerifierInput<'_>) -> AttestationType {
        if map_get(input.att_stmt, "x5c").is_some() {
            AttestationType::Basic
        } else {
            AttestationType::SelfAttestation
        }
    }
}

/// Packed attestation certificate requirements: version 3, a subject with
/// C, O, CN and the fixed OU, not a CA, and a matching AAGUID extension if
/// present.
fn verify_attestation_certificate(
    cert: &X509Certificate<'_>,
    input: &VerifierInput<'_>,
) -> Result<(), WebauthnError> {
    if cert.version() != X509Version::V3 {
        return Err(WebauthnError::attestation(
            FORMAT,
            "Attestation certificate must be version 3",
        ));
    }

    for (oid, name) in [
        (&OID_X509_COUNTRY_NAME, "C"),
        (&OID_X509_ORGANIZATION_NAME, "O"),
        (&OID_X509_COMMON_NAME, "CN"),
    ] {
        if subject_attribute(cert, oid).is_none_or(|value| value.is_empty()) {
            tracing::error!("Attestation certificate subject is missing {}", name);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("Attestation certificate subject is missing {name}"),
            ));
        }
    }

    let ou = subject_attribute(cert, &OID_X509_ORGANIZATIONAL_UNIT);
    if ou.as_deref() != Some(REQUIRED_OU) {
        tracing::error!("Unexpected attestation certificate OU: {:?}", ou);
        return Err(WebauthnError::attestation(
            FORMAT,
            format!("Attestation certificate OU must be '{REQUIRED_OU}'"),
        ));
    }

    check_leaf_basics(cert, input, FORMAT)?;
    check_aaguid_extension(cert, input, FORMAT)
}
