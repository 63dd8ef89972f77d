use chrono::{DateTime, Utc};
use thiserror::Error;
use x509_parser::der_parser::ber::{BerObjectContent, Class};
use x509_parser::der_parser::der::{DerObject, parse_der};
use x509_parser::{
    certificate::X509Certificate, extensions::X509Extension, oid_registry::Oid, prelude::FromDer,
};

use crate::errors::WebauthnError;

use super::cose::{CoseAlgorithm, CoseKey};
use super::metadata::RevocationChecker;

/// Reasons a certificate chain fails to lead to a trust anchor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Duplicate certificate in chain")]
    DuplicateCertificate,

    #[error("Failed to parse certificate {index}: {reason}")]
    Parse { index: usize, reason: String },

    #[error("Certificate {0} is not yet valid")]
    NotYetValid(usize),

    #[error("Certificate {0} has expired")]
    Expired(usize),

    #[error("Certificate {0} is revoked")]
    Revoked(usize),

    #[error("Certificate signature does not verify against its issuer")]
    SignatureMismatch,

    #[error("No trust anchor validates the chain")]
    NoValidAnchor,
}

pub(crate) fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, WebauthnError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
        tracing::error!("Failed to parse certificate: {}", e);
        WebauthnError::Decode(format!("Failed to parse certificate: {e}"))
    })?;
    Ok(cert)
}

/// Checks the certificate's validity window against `now`.
pub(crate) fn check_validity(
    cert: &X509Certificate<'_>,
    index: usize,
    now: DateTime<Utc>,
) -> Result<(), PathError> {
    let validity = cert.validity();
    let now = now.timestamp();
    if now < validity.not_before.timestamp() {
        tracing::debug!("Certificate {} not valid before {}", index, validity.not_before);
        return Err(PathError::NotYetValid(index));
    }
    if now > validity.not_after.timestamp() {
        tracing::debug!("Certificate {} expired at {}", index, validity.not_after);
        return Err(PathError::Expired(index));
    }
    Ok(())
}

fn is_self_signed(cert: &X509Certificate<'_>) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw()
}

/// Validates a leaf-first certificate chain against a set of trust anchors.
///
/// With no anchors there is nothing to validate against and the chain is
/// accepted without being parsed.
///
/// Every chain certificate must parse, be inside its validity window and
/// not be revoked. Each anchor is then appended to the chain in turn and the
/// path is walked child to parent, verifying every signature; a self-signed
/// terminal certificate also has to verify its own signature. The first
/// anchor that yields a fully verified path wins.
///
/// # Errors
/// * `SignatureMismatch` if some anchor matched the chain by name but a
///   signature along the path did not verify
/// * `NoValidAnchor` if no anchor connected to the chain at all
pub fn validate_certificate_path(
    chain: &[Vec<u8>],
    trust_anchors: &[Vec<u8>],
    revocation: &dyn RevocationChecker,
    now: DateTime<Utc>,
) -> Result<(), PathError> {
    if trust_anchors.is_empty() {
        tracing::debug!("No trust anchors configured, skipping certificate path validation");
        return Ok(());
    }

    for (i, cert) in chain.iter().enumerate() {
        if chain[i + 1..].contains(cert) {
            tracing::error!("Certificate {} appears more than once in the chain", i);
            return Err(PathError::DuplicateCertificate);
        }
    }

    let mut parsed = Vec::with_capacity(chain.len());
    for (index, der) in chain.iter().enumerate() {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| PathError::Parse {
            index,
            reason: e.to_string(),
        })?;
        check_validity(&cert, index, now)?;
        if revocation.is_revoked(der) {
            tracing::error!("Certificate {} is revoked", index);
            return Err(PathError::Revoked(index));
        }
        parsed.push(cert);
    }

    let mut name_matched = false;
    for (anchor_index, anchor_der) in trust_anchors.iter().enumerate() {
        let Ok((_, anchor)) = X509Certificate::from_der(anchor_der) else {
            tracing::warn!("Skipping unparseable trust anchor {}", anchor_index);
            continue;
        };
        if check_validity(&anchor, anchor_index, now).is_err() {
            tracing::warn!("Skipping trust anchor {} outside its validity window", anchor_index);
            continue;
        }

        let mut path: Vec<&X509Certificate<'_>> = parsed.iter().collect();
        // chains sometimes already carry the root
        if chain.last() != Some(anchor_der) {
            path.push(&anchor);
        }

        match verify_path(&path) {
            Ok(()) => {
                tracing::debug!("Certificate path verified with trust anchor {}", anchor_index);
                return Ok(());
            }
            Err(PathStep::NameMismatch) => {}
            Err(PathStep::BadSignature) => name_matched = true,
        }
    }

    if name_matched {
        tracing::error!("Certificate path matched a trust anchor but a signature failed");
        Err(PathError::SignatureMismatch)
    } else {
        tracing::error!("No trust anchor validates the certificate chain");
        Err(PathError::NoValidAnchor)
    }
}

enum PathStep {
    NameMismatch,
    BadSignature,
}

fn verify_path(path: &[&X509Certificate<'_>]) -> Result<(), PathStep> {
    for pair in path.windows(2) {
        let (child, parent) = (pair[0], pair[1]);
        if child.issuer().as_raw() != parent.subject().as_raw() {
            return Err(PathStep::NameMismatch);
        }
        if child.verify_signature(Some(parent.public_key())).is_err() {
            return Err(PathStep::BadSignature);
        }
    }
    if let Some(last) = path.last() {
        if is_self_signed(last) && last.verify_signature(None).is_err() {
            return Err(PathStep::BadSignature);
        }
    }
    Ok(())
}

/// Parses exactly one DER element; trailing bytes are an error.
pub(crate) fn parse_der_exact<'a>(
    bytes: &'a [u8],
    what: &str,
) -> Result<DerObject<'a>, WebauthnError> {
    let (rest, obj) = parse_der(bytes).map_err(|e| {
        tracing::error!("Failed to parse {} as DER: {}", what, e);
        WebauthnError::Decode(format!("Invalid DER in {what}: {e}"))
    })?;
    if !rest.is_empty() {
        tracing::error!("{} trailing bytes after {}", rest.len(), what);
        return Err(WebauthnError::Decode(format!("Trailing bytes after {what}")));
    }
    Ok(obj)
}

/// Tag number and inner element of an `[n] EXPLICIT` context-specific
/// element, or `None` if `obj` is not context-specific.
pub(crate) fn context_explicit<'a>(
    obj: &DerObject<'a>,
    what: &str,
) -> Result<Option<(u32, DerObject<'a>)>, WebauthnError> {
    match &obj.content {
        BerObjectContent::Unknown(any) if any.class() == Class::ContextSpecific => {
            let inner = parse_der_exact(any.data, what)?;
            Ok(Some((any.tag().0, inner)))
        }
        _ => Ok(None),
    }
}

/// Big-endian magnitude without leading zero bytes.
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// First subject attribute of the given type, as a string.
pub(crate) fn subject_attribute(cert: &X509Certificate<'_>, oid: &Oid<'_>) -> Option<String> {
    cert.subject()
        .iter_attributes()
        .find(|attr| attr.attr_type() == oid)
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
}

/// The basic-constraints CA flag; absent extension means not a CA.
pub(crate) fn is_ca(cert: &X509Certificate<'_>) -> Result<bool, WebauthnError> {
    let constraints = cert
        .basic_constraints()
        .map_err(|e| WebauthnError::Decode(format!("Invalid basic constraints: {e}")))?;
    Ok(constraints.is_some_and(|bc| bc.value.ca))
}

/// Extension lookup by DER-encoded OID bytes.
pub(crate) fn find_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &[u8],
) -> Option<&'a X509Extension<'a>> {
    cert.extensions().iter().find(|ext| ext.oid.as_bytes() == oid)
}

/// Whether the certificate's subject key is the same key as `key`.
pub(crate) fn public_key_matches(cert: &X509Certificate<'_>, key: &CoseKey) -> bool {
    let raw_keys = CoseKey::from_spki(cert.public_key(), key.alg())
        .and_then(|cert_key| Ok((cert_key.to_raw_key()?, key.to_raw_key()?)));
    match raw_keys {
        Ok((cert_raw, credential_raw)) => cert_raw == credential_raw,
        Err(e) => {
            tracing::debug!("Certificate key not comparable to credential key: {}", e);
            false
        }
    }
}

/// Verifies a signature made with the certificate's key under `alg`.
pub(crate) fn verify_with_certificate(
    cert: &X509Certificate<'_>,
    alg: CoseAlgorithm,
    signature: &[u8],
    message: &[u8],
) -> Result<bool, WebauthnError> {
    CoseKey::from_spki(cert.public_key(), alg)?.verify(signature, message)
}
