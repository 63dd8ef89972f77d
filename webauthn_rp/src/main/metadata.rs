//! Capabilities the verification engine consumes but does not own: FIDO
//! metadata statements, certificate revocation status and per-format trust
//! anchors.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::WebauthnError;
use crate::utils::base64_decode;

use super::attestation::AttestationFormat;
use super::cose::CoseAlgorithm;

/// The subset of a FIDO MDS metadata statement used during registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    pub aaguid: Option<Uuid>,
    #[serde(default)]
    pub description: String,
    /// FIDO registry names such as `secp256r1_ecdsa_sha256_raw`
    #[serde(default)]
    pub authentication_algorithms: Vec<String>,
    #[serde(default)]
    pub attestation_types: Vec<String>,
    /// Standard base64 DER certificates
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>,
}

impl MetadataStatement {
    /// Decoded `attestationRootCertificates`.
    pub fn root_certificates(&self) -> Result<Vec<Vec<u8>>, WebauthnError> {
        self.attestation_root_certificates
            .iter()
            .map(|cert| {
                base64_decode(cert).map_err(|e| {
                    WebauthnError::Metadata(format!("Invalid attestation root certificate: {e}"))
                })
            })
            .collect()
    }

    /// Whether the statement permits `alg`. A statement that declares no
    /// algorithms permits everything.
    pub fn allows_algorithm(&self, alg: CoseAlgorithm) -> bool {
        self.authentication_algorithms.is_empty()
            || self
                .authentication_algorithms
                .iter()
                .any(|name| name == metadata_algorithm_name(alg))
    }
}

/// FIDO registry name of the algorithm a COSE identifier denotes.
pub fn metadata_algorithm_name(alg: CoseAlgorithm) -> &'static str {
    match alg {
        CoseAlgorithm::ES256 => "secp256r1_ecdsa_sha256_raw",
        CoseAlgorithm::ES384 => "secp384r1_ecdsa_sha384_raw",
        CoseAlgorithm::ES512 => "secp521r1_ecdsa_sha512_raw",
        CoseAlgorithm::EdDSA => "ed25519_eddsa_sha512_raw",
        CoseAlgorithm::PS256 => "rsassa_pss_sha256_raw",
        CoseAlgorithm::PS384 => "rsassa_pss_sha384_raw",
        CoseAlgorithm::PS512 => "rsassa_pss_sha512_raw",
        CoseAlgorithm::RS256 => "rsassa_pkcsv15_sha256_raw",
        CoseAlgorithm::RS384 => "rsassa_pkcsv15_sha384_raw",
        CoseAlgorithm::RS512 => "rsassa_pkcsv15_sha512_raw",
        CoseAlgorithm::RS1 => "rsassa_pkcsv15_sha1_raw",
    }
}

/// Source of metadata statements keyed by AAGUID.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn get(&self, aaguid: &Uuid) -> Option<MetadataStatement>;
}

/// Lookup that never knows any authenticator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl MetadataLookup for NoMetadata {
    async fn get(&self, _aaguid: &Uuid) -> Option<MetadataStatement> {
        None
    }
}

/// In-memory metadata table, typically loaded once from a JSON blob.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    statements: HashMap<Uuid, MetadataStatement>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of metadata statements. Statements without an
    /// `aaguid` (UAF and U2F entries) are skipped.
    pub fn from_json(json: &str) -> Result<Self, WebauthnError> {
        let entries: Vec<MetadataStatement> = serde_json::from_str(json)
            .map_err(|e| WebauthnError::Metadata(format!("Invalid metadata JSON: {e}")))?;

        let mut table = Self::new();
        for entry in entries {
            match entry.aaguid {
                Some(_) => table.insert(entry),
                None => tracing::warn!(
                    "Skipping metadata statement without AAGUID: {}",
                    entry.description
                ),
            }
        }
        tracing::debug!("Loaded {} metadata statements", table.statements.len());
        Ok(table)
    }

    pub fn insert(&mut self, statement: MetadataStatement) {
        if let Some(aaguid) = statement.aaguid {
            self.statements.insert(aaguid, statement);
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[async_trait]
impl MetadataLookup for StaticMetadata {
    async fn get(&self, aaguid: &Uuid) -> Option<MetadataStatement> {
        self.statements.get(aaguid).cloned()
    }
}

/// Revocation status of attestation certificates.
pub trait RevocationChecker: Send + Sync {
    fn is_revoked(&self, cert_der: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevocation;

impl RevocationChecker for NoRevocation {
    fn is_revoked(&self, _cert_der: &[u8]) -> bool {
        false
    }
}

/// Per-format trust anchors used when no metadata statement supplies roots.
pub trait TrustAnchorStore: Send + Sync {
    fn get(&self, format: AttestationFormat) -> Vec<Vec<u8>>;
}

/// Fixed anchor table; empty unless anchors are added.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustAnchors {
    anchors: HashMap<AttestationFormat, Vec<Vec<u8>>>,
}

impl StaticTrustAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anchor(mut self, format: AttestationFormat, cert_der: Vec<u8>) -> Self {
        self.add_anchor(format, cert_der);
        self
    }

    pub fn add_anchor(&mut self, format: AttestationFormat, cert_der: Vec<u8>) {
        self.anchors.entry(format).or_default().push(cert_der);
    }
}

impl TrustAnchorStore for StaticTrustAnchors {
    fn get(&self, format: AttestationFormat) -> Vec<Vec<u8>> {
        self.anchors.get(&format).cloned().unwrap_or_default()
    }
}
