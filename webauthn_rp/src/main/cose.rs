use std::borrow::Cow;
use std::fmt;

use ciborium::value::Value as CborValue;
use oid_registry::{OID_KEY_TYPE_EC_PUBLIC_KEY, OID_PKCS1_RSAENCRYPTION, OID_SIG_ED25519};
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};
use x509_parser::asn1_rs::{Integer, Sequence, ToDer};
use x509_parser::der_parser::ber::BerObjectContent;
use x509_parser::der_parser::der::parse_der;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::errors::WebauthnError;

use super::cbor::{as_bytes, as_i64, as_map, decode_cbor_exact, map_get_int};
use super::cert::strip_leading_zeros;

// COSE key labels (RFC 9053)
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_RSA_N: i64 = -1;
const LABEL_RSA_E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// COSE signature algorithms accepted for credentials and attestation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
    EdDSA,
    PS256,
    PS384,
    PS512,
    RS256,
    RS384,
    RS512,
    RS1,
}

impl CoseAlgorithm {
    pub const ALL: [CoseAlgorithm; 11] = [
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::EdDSA,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::RS1,
    ];

    /// IANA COSE algorithm identifier
    pub fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::ES384 => -35,
            Self::ES512 => -36,
            Self::EdDSA => -8,
            Self::PS256 => -37,
            Self::PS384 => -38,
            Self::PS512 => -39,
            Self::RS256 => -257,
            Self::RS384 => -258,
            Self::RS512 => -259,
            Self::RS1 => -65535,
        }
    }

    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::PS256
                | Self::PS384
                | Self::PS512
                | Self::RS256
                | Self::RS384
                | Self::RS512
                | Self::RS1
        )
    }

    /// The curve an ECDSA or EdDSA algorithm is bound to
    fn curve(self) -> Option<CoseCurve> {
        match self {
            Self::ES256 => Some(CoseCurve::P256),
            Self::ES384 => Some(CoseCurve::P384),
            Self::ES512 => Some(CoseCurve::P521),
            Self::EdDSA => Some(CoseCurve::Ed25519),
            _ => None,
        }
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = WebauthnError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.id() == id)
            .ok_or(WebauthnError::UnsupportedAlgorithm(id))
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseCurve {
    P256,
    P384,
    P521,
    Ed25519,
}

impl CoseCurve {
    pub fn id(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
            Self::Ed25519 => 6,
        }
    }

    fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::P256),
            2 => Some(Self::P384),
            3 => Some(Self::P521),
            6 => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// Length in bytes of one coordinate (or of the whole key for Ed25519)
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
            Self::Ed25519 => 32,
        }
    }
}

/// A credential or attestation public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 {
        alg: CoseAlgorithm,
        crv: CoseCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        alg: CoseAlgorithm,
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Okp {
        alg: CoseAlgorithm,
        crv: CoseCurve,
        x: Vec<u8>,
    },
}

fn malformed(msg: impl Into<String>) -> WebauthnError {
    let msg = msg.into();
    tracing::error!("Malformed COSE key: {}", msg);
    WebauthnError::MalformedKey(msg)
}

impl CoseKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WebauthnError> {
        let value = decode_cbor_exact(bytes)?;
        Self::from_cbor(&value)
    }

    /// Builds a key from a decoded COSE_Key map.
    ///
    /// # Errors
    /// * `UnsupportedAlgorithm` if the `alg` label names an algorithm outside
    ///   [`CoseAlgorithm`]
    /// * `MalformedKey` if a required label is missing or the key type, curve
    ///   and algorithm disagree
    pub fn from_cbor(value: &CborValue) -> Result<Self, WebauthnError> {
        let map = as_map(value).ok_or_else(|| malformed("COSE key is not a CBOR map"))?;

        let int_field = |label: i64, name: &str| {
            map_get_int(map, label)
                .and_then(as_i64)
                .ok_or_else(|| malformed(format!("Missing or invalid {name}")))
        };
        let bytes_field = |label: i64, name: &str| {
            map_get_int(map, label)
                .and_then(as_bytes)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| malformed(format!("Missing or invalid {name}")))
        };

        let kty = int_field(LABEL_KTY, "kty")?;
        let alg = CoseAlgorithm::try_from(int_field(LABEL_ALG, "alg")?)?;

        let key = match kty {
            KTY_EC2 => {
                let crv = CoseCurve::from_id(int_field(LABEL_CRV, "crv")?)
                    .ok_or_else(|| malformed("Unknown EC2 curve"))?;
                CoseKey::Ec2 {
                    alg,
                    crv,
                    x: bytes_field(LABEL_X, "x coordinate")?,
                    y: bytes_field(LABEL_Y, "y coordinate")?,
                }
            }
            KTY_OKP => {
                let crv = CoseCurve::from_id(int_field(LABEL_CRV, "crv")?)
                    .ok_or_else(|| malformed("Unknown OKP curve"))?;
                CoseKey::Okp {
                    alg,
                    crv,
                    x: bytes_field(LABEL_X, "x")?,
                }
            }
            KTY_RSA => CoseKey::Rsa {
                alg,
                n: bytes_field(LABEL_RSA_N, "modulus")?,
                e: bytes_field(LABEL_RSA_E, "exponent")?,
            },
            other => return Err(malformed(format!("Unknown key type {other}"))),
        };

        key.check_consistency()?;
        Ok(key)
    }

    fn check_consistency(&self) -> Result<(), WebauthnError> {
        match self {
            CoseKey::Ec2 { alg, crv, x, y } => {
                if *crv == CoseCurve::Ed25519 || alg.curve() != Some(*crv) {
                    return Err(malformed(format!(
                        "EC2 key with alg {alg} does not match curve {crv:?}"
                    )));
                }
                let len = crv.coordinate_len();
                if x.len() != len || y.len() != len {
                    return Err(malformed(format!(
                        "EC2 coordinates must be {len} bytes, got x={} y={}",
                        x.len(),
                        y.len()
                    )));
                }
            }
            CoseKey::Okp { alg, crv, x } => {
                if *alg != CoseAlgorithm::EdDSA || *crv != CoseCurve::Ed25519 {
                    return Err(malformed(format!(
                        "OKP key must be EdDSA over Ed25519, got {alg} over {crv:?}"
                    )));
                }
                if x.len() != crv.coordinate_len() {
                    return Err(malformed(format!("Ed25519 key must be 32 bytes, got {}", x.len())));
                }
            }
            CoseKey::Rsa { alg, n, e } => {
                if !alg.is_rsa() {
                    return Err(malformed(format!("RSA key with non-RSA alg {alg}")));
                }
                if strip_leading_zeros(n).is_empty() || strip_leading_zeros(e).is_empty() {
                    return Err(malformed("RSA modulus and exponent must be non-zero"));
                }
            }
        }
        Ok(())
    }

    pub fn alg(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2 { alg, .. } | CoseKey::Rsa { alg, .. } | CoseKey::Okp { alg, .. } => *alg,
        }
    }

    /// Canonical byte form of the key: `0x04 || x || y` for EC2, the raw
    /// 32 bytes for Ed25519, and PKCS#1 `RSAPublicKey` DER for RSA.
    ///
    /// This is the form certificate keys are compared against.
    pub fn to_raw_key(&self) -> Result<Vec<u8>, WebauthnError> {
        match self {
            CoseKey::Ec2 { x, y, .. } => {
                let mut out = Vec::with_capacity(1 + x.len() + y.len());
                out.push(0x04);
                out.extend_from_slice(x);
                out.extend_from_slice(y);
                Ok(out)
            }
            CoseKey::Okp { x, .. } => Ok(x.clone()),
            CoseKey::Rsa { n, e, .. } => {
                let mut content = der_unsigned_integer(n)?;
                content.extend(der_unsigned_integer(e)?);
                Sequence::new(Cow::Owned(content)).to_der_vec().map_err(|e| {
                    tracing::error!("Failed to encode RSAPublicKey: {}", e);
                    malformed(format!("Failed to encode RSAPublicKey: {e}"))
                })
            }
        }
    }

    /// Re-encodes the key as a COSE_Key map.
    pub fn to_cbor(&self) -> CborValue {
        let int = |v: i64| CborValue::Integer(v.into());
        let mut map = match self {
            CoseKey::Ec2 { crv, x, y, .. } => vec![
                (int(LABEL_KTY), int(KTY_EC2)),
                (int(LABEL_CRV), int(crv.id())),
                (int(LABEL_X), CborValue::Bytes(x.clone())),
                (int(LABEL_Y), CborValue::Bytes(y.clone())),
            ],
            CoseKey::Okp { crv, x, .. } => vec![
                (int(LABEL_KTY), int(KTY_OKP)),
                (int(LABEL_CRV), int(crv.id())),
                (int(LABEL_X), CborValue::Bytes(x.clone())),
            ],
            CoseKey::Rsa { n, e, .. } => vec![
                (int(LABEL_KTY), int(KTY_RSA)),
                (int(LABEL_RSA_N), CborValue::Bytes(n.clone())),
                (int(LABEL_RSA_E), CborValue::Bytes(e.clone())),
            ],
        };
        map.insert(1, (int(LABEL_ALG), int(self.alg().id())));
        CborValue::Map(map)
    }

    /// Builds a verification key for `alg` from an X.509 SubjectPublicKeyInfo.
    ///
    /// Attestation signatures made by certificate keys are checked through
    /// the same [`CoseKey::verify`] path as credential signatures.
    pub fn from_spki(spki: &SubjectPublicKeyInfo<'_>, alg: CoseAlgorithm) -> Result<Self, WebauthnError> {
        let key_oid = &spki.algorithm.algorithm;
        let data: &[u8] = &spki.subject_public_key.data;

        let key = if *key_oid == OID_KEY_TYPE_EC_PUBLIC_KEY {
            let crv = match data.len() {
                65 => CoseCurve::P256,
                97 => CoseCurve::P384,
                133 => CoseCurve::P521,
                len => return Err(malformed(format!("Unsupported EC point length {len}"))),
            };
            if data.first() != Some(&0x04) {
                return Err(malformed("Compressed EC points are not supported"));
            }
            let len = crv.coordinate_len();
            CoseKey::Ec2 {
                alg,
                crv,
                x: data[1..1 + len].to_vec(),
                y: data[1 + len..].to_vec(),
            }
        } else if *key_oid == OID_PKCS1_RSAENCRYPTION {
            match spki.parsed() {
                Ok(PublicKey::RSA(rsa)) => CoseKey::Rsa {
                    alg,
                    n: strip_leading_zeros(rsa.modulus).to_vec(),
                    e: strip_leading_zeros(rsa.exponent).to_vec(),
                },
                Ok(_) => return Err(malformed("Invalid RSAPublicKey structure")),
                Err(e) => {
                    tracing::error!("Failed to parse RSA SubjectPublicKeyInfo: {}", e);
                    return Err(malformed(format!("Invalid RSAPublicKey structure: {e}")));
                }
            }
        } else if *key_oid == OID_SIG_ED25519 {
            CoseKey::Okp {
                alg,
                crv: CoseCurve::Ed25519,
                x: data.to_vec(),
            }
        } else {
            return Err(malformed(format!("Unsupported certificate key type {key_oid}")));
        };

        key.check_consistency()?;
        Ok(key)
    }

    /// Verifies `signature` over `message` with the algorithm the key declares.
    ///
    /// # Returns
    /// * `Ok(true)` if the signature verifies
    /// * `Ok(false)` if it does not, including ECDSA signatures that are not
    ///   valid DER
    ///
    /// # Errors
    /// * `UnsupportedAlgorithm` for ES512, which has no verifier here
    pub fn verify(&self, signature: &[u8], message: &[u8]) -> Result<bool, WebauthnError> {
        let ok = match self {
            CoseKey::Ec2 { alg, crv, .. } => {
                let verification_algorithm: &'static dyn signature::VerificationAlgorithm = match alg {
                    CoseAlgorithm::ES256 => &signature::ECDSA_P256_SHA256_FIXED,
                    CoseAlgorithm::ES384 => &signature::ECDSA_P384_SHA384_FIXED,
                    other => return Err(WebauthnError::UnsupportedAlgorithm(other.id())),
                };
                let Some(fixed) = der_signature_to_fixed(signature, crv.coordinate_len()) else {
                    tracing::debug!("ECDSA signature is not a valid DER SEQUENCE");
                    return Ok(false);
                };
                UnparsedPublicKey::new(verification_algorithm, self.to_raw_key()?)
                    .verify(message, &fixed)
                    .is_ok()
            }
            CoseKey::Okp { x, .. } => UnparsedPublicKey::new(&signature::ED25519, x)
                .verify(message, signature)
                .is_ok(),
            CoseKey::Rsa { alg, n, e } => {
                let params: &'static signature::RsaParameters = match alg {
                    CoseAlgorithm::RS1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                    CoseAlgorithm::RS256 => &signature::RSA_PKCS1_2048_8192_SHA256,
                    CoseAlgorithm::RS384 => &signature::RSA_PKCS1_2048_8192_SHA384,
                    CoseAlgorithm::RS512 => &signature::RSA_PKCS1_2048_8192_SHA512,
                    CoseAlgorithm::PS256 => &signature::RSA_PSS_2048_8192_SHA256,
                    CoseAlgorithm::PS384 => &signature::RSA_PSS_2048_8192_SHA384,
                    CoseAlgorithm::PS512 => &signature::RSA_PSS_2048_8192_SHA512,
                    other => return Err(WebauthnError::UnsupportedAlgorithm(other.id())),
                };
                RsaPublicKeyComponents {
                    n: strip_leading_zeros(n),
                    e: strip_leading_zeros(e),
                }
                .verify(params, message, signature)
                .is_ok()
            }
        };

        if !ok {
            tracing::debug!("Signature verification failed for {}", self.alg());
        }
        Ok(ok)
    }
}

/// DER INTEGER for a non-negative big-endian magnitude.
fn der_unsigned_integer(magnitude: &[u8]) -> Result<Vec<u8>, WebauthnError> {
    let magnitude = strip_leading_zeros(magnitude);
    let mut content = Vec::with_capacity(magnitude.len() + 1);
    if magnitude.first().is_none_or(|b| b & 0x80 != 0) {
        content.push(0x00);
    }
    content.extend_from_slice(magnitude);
    Integer::new(&content)
        .to_der_vec()
        .map_err(|e| malformed(format!("Failed to encode INTEGER: {e}")))
}

/// Converts a DER `SEQUENCE { r INTEGER, s INTEGER }` into `r || s`, each
/// left-padded to `width` bytes.
fn der_signature_to_fixed(signature: &[u8], width: usize) -> Option<Vec<u8>> {
    let (rest, parsed) = parse_der(signature).ok()?;
    if !rest.is_empty() {
        return None;
    }
    let BerObjectContent::Sequence(parts) = &parsed.content else {
        return None;
    };
    let [r, s] = parts.as_slice() else {
        return None;
    };
    let mut out = vec![0u8; width * 2];
    for (i, int) in [r, s].into_iter().enumerate() {
        let BerObjectContent::Integer(value) = int.content else {
            return None;
        };
        let magnitude = strip_leading_zeros(value);
        if magnitude.len() > width {
            return None;
        }
        let end = (i + 1) * width;
        out[end - magnitude.len()..end].copy_from_slice(magnitude);
    }
    Some(out)
}
