use ciborium::value::Value as CborValue;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::ber::BerObjectContent;

use crate::errors::WebauthnError;
use crate::utils::hex_encode;

use super::super::cbor::{CborMap, as_array, as_bytes, as_i64, as_text, map_get};
use super::super::cert::{
    check_validity, find_extension, is_ca, parse_certificate, parse_der_exact,
};
use super::super::cose::CoseAlgorithm;
use super::core::{AttestationFormat, VerifierInput};

/// id-fido-gen-ce-aaguid, 1.3.6.1.4.1.45724.1.1.4
pub(super) const OID_FIDO_GEN_CE_AAGUID: &[u8] =
    &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xE5, 0x1C, 0x01, 0x01, 0x04];

pub(super) fn get_bytes<'a>(
    att_stmt: &'a CborMap,
    key: &str,
    format: AttestationFormat,
) -> Result<&'a [u8], WebauthnError> {
    map_get(att_stmt, key).and_then(as_bytes).ok_or_else(|| {
        tracing::error!("Missing or invalid '{}' in {} attestation statement", key, format);
        WebauthnError::attestation(format, format!("Missing or invalid '{key}'"))
    })
}

pub(super) fn get_text<'a>(
    att_stmt: &'a CborMap,
    key: &str,
    format: AttestationFormat,
) -> Result<&'a str, WebauthnError> {
    map_get(att_stmt, key).and_then(as_text).ok_or_else(|| {
        tracing::error!("Missing or invalid '{}' in {} attestation statement", key, format);
        WebauthnError::attestation(format, format!("Missing or invalid '{key}'"))
    })
}

/// The statement's `alg`, resolved to a supported algorithm.
pub(super) fn get_alg(
    att_stmt: &CborMap,
    format: AttestationFormat,
) -> Result<CoseAlgorithm, WebauthnError> {
    let id = map_get(att_stmt, "alg")
        .and_then(as_i64)
        .ok_or_else(|| WebauthnError::attestation(format, "Missing or invalid 'alg'"))?;
    CoseAlgorithm::try_from(id)
}

/// The `x5c` chain, leaf first, if the statement carries one.
pub(super) fn get_x5c(
    att_stmt: &CborMap,
    format: AttestationFormat,
) -> Result<Option<Vec<Vec<u8>>>, WebauthnError> {
    let Some(value) = map_get(att_stmt, "x5c") else {
        return Ok(None);
    };
    let certs = as_array(value)
        .ok_or_else(|| WebauthnError::attestation(format, "'x5c' is not an array"))?;
    let chain = certs
        .iter()
        .map(|cert| match cert {
            CborValue::Bytes(der) => Ok(der.clone()),
            _ => Err(WebauthnError::attestation(
                format,
                "'x5c' contains a non-byte-string entry",
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err(WebauthnError::attestation(format, "Empty 'x5c'"));
    }
    tracing::debug!("Found x5c with {} certificates", chain.len());
    Ok(Some(chain))
}

pub(super) fn require_x5c(
    att_stmt: &CborMap,
    format: AttestationFormat,
) -> Result<Vec<Vec<u8>>, WebauthnError> {
    get_x5c(att_stmt, format)?
        .ok_or_else(|| WebauthnError::attestation(format, "Missing 'x5c'"))
}

/// Parses the leaf certificate of a chain.
pub(super) fn parse_leaf(
    chain: &[Vec<u8>],
    format: AttestationFormat,
) -> Result<X509Certificate<'_>, WebauthnError> {
    let leaf = chain
        .first()
        .ok_or_else(|| WebauthnError::attestation(format, "Missing attestation certificate"))?;
    parse_certificate(leaf)
}

/// Checks the id-fido-gen-ce-aaguid extension when the certificate has one:
/// it must be non-critical and hold the authenticator's AAGUID.
pub(super) fn check_aaguid_extension(
    cert: &X509Certificate<'_>,
    input: &VerifierInput<'_>,
    format: AttestationFormat,
) -> Result<(), WebauthnError> {
    let Some(ext) = find_extension(cert, OID_FIDO_GEN_CE_AAGUID) else {
        return Ok(());
    };
    if ext.critical {
        return Err(WebauthnError::attestation(
            format,
            "AAGUID extension must not be critical",
        ));
    }
    let value = parse_der_exact(ext.value, "AAGUID extension")?;
    let BerObjectContent::OctetString(cert_aaguid) = value.content else {
        return Err(WebauthnError::attestation(
            format,
            "AAGUID extension is not an OCTET STRING",
        ));
    };
    if cert_aaguid != input.aaguid.as_slice() {
        tracing::error!(
            "AAGUID extension mismatch: cert={}, authData={}",
            hex_encode(cert_aaguid),
            hex_encode(input.aaguid)
        );
        return Err(WebauthnError::attestation(
            format,
            "AAGUID in certificate does not match authenticator data",
        ));
    }
    Ok(())
}

/// Certificate checks shared by every leaf: validity window and the
/// basic-constraints CA flag.
pub(super) fn check_leaf_basics(
    cert: &X509Certificate<'_>,
    input: &VerifierInput<'_>,
    format: AttestationFormat,
) -> Result<(), WebauthnError> {
    check_validity(cert, 0, input.trust.now)
        .map_err(|e| WebauthnError::attestation(format, format!("Attestation certificate: {e}")))?;
    if is_ca(cert)? {
        return Err(WebauthnError::attestation(
            format,
            "Attestation certificate must not be a CA certificate",
        ));
    }
    Ok(())
}
