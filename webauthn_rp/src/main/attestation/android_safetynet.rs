use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use ring::digest;
use serde::Deserialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::{
    OID_EC_P256, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_NIST_EC_P384, OID_PKCS1_RSAENCRYPTION,
    OID_X509_COMMON_NAME,
};

use crate::config::SafetyNetPolicy;
use crate::errors::WebauthnError;
use crate::utils::{base64_decode, base64_encode, base64url_decode};

use super::super::cert::subject_attribute;
use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};
use super::utils::{get_bytes, get_text, parse_leaf};

const FORMAT: AttestationFormat = AttestationFormat::AndroidSafetyNet;

const SAFETYNET_HOSTNAME: &str = "attest.android.com";

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// `android-safetynet`: a SafetyNet attestation JWS produced by Google Play
/// services on behalf of the device.
pub(super) struct AndroidSafetyNetVerifier;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
    #[serde(default)]
    apk_package_name: Option<String>,
}

/// The three dot-separated parts of a compact JWS.
struct CompactJws<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> CompactJws<'a> {
    fn split(token: &'a str) -> Result<Self, WebauthnError> {
        let parts: Vec<&str> = token.split('.').collect();
        match parts[..] {
            [header, payload, signature] => Ok(Self {
                header,
                payload,
                signature,
            }),
            _ => {
                tracing::error!("SafetyNet response has {} JWS parts", parts.len());
                Err(WebauthnError::Decode(
                    "SafetyNet response is not a compact JWS".to_string(),
                ))
            }
        }
    }

    /// `header.payload`, the JWS signing input
    fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }
}

impl AttestationVerifier for AndroidSafetyNetVerifier {
    fn format(&self) -> AttestationFormat {
        FORMAT
    }

    /// Verifies an Android SafetyNet attestation statement
    ///
    /// # Errors
    /// * `Decode` if the response is not a well formed JWS
    /// * `Attestation` for nonce, CTS profile or certificate failures
    /// * `TimestampExpired` / `TimestampInFuture` if `timestampMs` falls
    ///   outside the configured window
    /// * `CertificatePath` if the JWS chain does not lead to a trust anchor
    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        let ver = get_text(input.att_stmt, "ver", FORMAT)?;
        tracing::debug!("Verifying SafetyNet attestation, ver={}", ver);

        let response = get_bytes(input.att_stmt, "response", FORMAT)?;
        let token = std::str::from_utf8(response)
            .map_err(|e| WebauthnError::Decode(format!("SafetyNet response is not UTF-8: {e}")))?;
        let jws = CompactJws::split(token)?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| WebauthnError::Decode(format!("Invalid SafetyNet JWS header: {e}")))?;

        let payload_bytes = base64url_decode(jws.payload)?;
        let payload: SafetyNetPayload = serde_json::from_slice(&payload_bytes)
            .map_err(|e| WebauthnError::Decode(format!("Invalid SafetyNet payload: {e}")))?;
        tracing::debug!(
            "SafetyNet payload for package {:?} at {}",
            payload.apk_package_name,
            payload.timestamp_ms
        );

        let expected_nonce =
            base64_encode(digest::digest(&digest::SHA256, &input.signed_data()));
        check_payload(&payload, &expected_nonce, &input.trust.safetynet, input.trust.now)?;

        let x5c = header
            .x5c
            .as_ref()
            .filter(|certs| !certs.is_empty())
            .ok_or_else(|| WebauthnError::attestation(FORMAT, "JWS header has no x5c"))?
            .iter()
            .map(|cert| base64_decode(cert).map_err(WebauthnError::from))
            .collect::<Result<Vec<_>, _>>()?;

        let cert = parse_leaf(&x5c, FORMAT)?;
        let common_name = subject_attribute(&cert, &OID_X509_COMMON_NAME);
        if common_name.as_deref() != Some(SAFETYNET_HOSTNAME) {
            tracing::error!("SafetyNet leaf CN is {:?}", common_name);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("Attestation certificate is not issued to {SAFETYNET_HOSTNAME}"),
            ));
        }

        input.validate_chain(FORMAT, &x5c)?;

        let (key, allowed) = decoding_key(&cert)?;
        if !allowed.contains(&header.alg) {
            tracing::error!(
                "SafetyNet JWS alg {:?} does not match the leaf key type, allowed: {:?}",
                header.alg,
                allowed
            );
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("JWS algorithm {:?} not allowed for the leaf certificate key", header.alg),
            ));
        }
        jsonwebtoken::crypto::verify(jws.signature, jws.signing_input().as_bytes(), &key, header.alg)
            .map_err(|e| {
                tracing::error!("SafetyNet JWS signature check failed: {}", e);
                WebauthnError::attestation(FORMAT, format!("JWS signature check failed: {e}"))
            })
    }

    fn attestation_type(&self, _input: &VerifierInput<'_>) -> AttestationType {
        AttestationType::Basic
    }
}

/// Nonce, CTS profile and freshness checks on the decoded payload.
fn check_payload(
    payload: &SafetyNetPayload,
    expected_nonce: &str,
    policy: &SafetyNetPolicy,
    now: DateTime<Utc>,
) -> Result<(), WebauthnError> {
    if payload.nonce != expected_nonce {
        tracing::error!(
            "SafetyNet nonce mismatch: expected {}, got {}",
            expected_nonce,
            payload.nonce
        );
        return Err(WebauthnError::attestation(
            FORMAT,
            "Nonce does not match authenticator data and client data hash",
        ));
    }

    if !payload.cts_profile_match {
        return Err(WebauthnError::attestation(
            FORMAT,
            "Device does not pass the CTS profile match",
        ));
    }

    if !policy.verify_timestamp {
        tracing::debug!("SafetyNet timestamp verification disabled");
        return Ok(());
    }

    let now_ms = now.timestamp_millis();
    let window_ms = i64::try_from(policy.window.as_millis()).unwrap_or(i64::MAX);
    if payload.timestamp_ms > now_ms.saturating_add(window_ms) {
        return Err(WebauthnError::TimestampInFuture {
            format: FORMAT,
            reason: format!(
                "timestampMs {} is ahead of verification time {}",
                payload.timestamp_ms, now_ms
            ),
        });
    }
    if payload.timestamp_ms < now_ms.saturating_sub(window_ms) {
        return Err(WebauthnError::TimestampExpired {
            format: FORMAT,
            reason: format!(
                "timestampMs {} is older than {} ms",
                payload.timestamp_ms, window_ms
            ),
        });
    }
    Ok(())
}

/// JWS verification key from the leaf certificate, PKCS#1 for RSA and the raw
/// point for EC, with the only algorithms that key may verify.
fn decoding_key(
    cert: &X509Certificate<'_>,
) -> Result<(DecodingKey, &'static [Algorithm]), WebauthnError> {
    let spki = cert.public_key();
    let data: &[u8] = &spki.subject_public_key.data;
    if spki.algorithm.algorithm == OID_PKCS1_RSAENCRYPTION {
        return Ok((DecodingKey::from_rsa_der(data), RSA_ALGORITHMS));
    }
    if spki.algorithm.algorithm == OID_KEY_TYPE_EC_PUBLIC_KEY {
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| params.as_oid().ok());
        return match curve {
            Some(oid) if oid == OID_EC_P256 => {
                Ok((DecodingKey::from_ec_der(data), &[Algorithm::ES256]))
            }
            Some(oid) if oid == OID_NIST_EC_P384 => {
                Ok((DecodingKey::from_ec_der(data), &[Algorithm::ES384]))
            }
            other => Err(WebauthnError::attestation(
                FORMAT,
                format!("Unsupported JWS curve {other:?}"),
            )),
        };
    }
    Err(WebauthnError::attestation(
        FORMAT,
        format!("Unsupported JWS key type {}", spki.algorithm.algorithm),
    ))
}
