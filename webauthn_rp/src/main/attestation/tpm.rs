use ring::digest;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::x509::{X509Name, X509Version};

use crate::errors::WebauthnError;

use super::super::cbor::map_get;
use super::super::cert::{strip_leading_zeros, verify_with_certificate};
use super::super::cose::{CoseAlgorithm, CoseCurve, CoseKey};
use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};
use super::utils::{
    check_aaguid_extension, check_leaf_basics, get_alg, get_bytes, get_text, parse_leaf,
    require_x5c,
};

const FORMAT: AttestationFormat = AttestationFormat::Tpm;

const TPM_GENERATED_VALUE: u32 = 0xFF54_4347; // 0xFF + "TCG"
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_SHA384: u16 = 0x000C;
const TPM_ALG_SHA512: u16 = 0x000D;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ALG_ECC: u16 = 0x0023;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

const RSA_DEFAULT_EXPONENT: u32 = 65537;

/// tcg-kp-AIKCertificate, 2.23.133.8.3
const OID_TCG_KP_AIK_CERTIFICATE: &[u8] = &[0x67, 0x81, 0x05, 0x08, 0x03];
/// tcg-at-tpmManufacturer, 2.23.133.2.1
const OID_TCG_AT_TPM_MANUFACTURER: &[u8] = &[0x67, 0x81, 0x05, 0x02, 0x01];
/// tcg-at-tpmModel, 2.23.133.2.2
const OID_TCG_AT_TPM_MODEL: &[u8] = &[0x67, 0x81, 0x05, 0x02, 0x02];
/// tcg-at-tpmVersion, 2.23.133.2.3
const OID_TCG_AT_TPM_VERSION: &[u8] = &[0x67, 0x81, 0x05, 0x02, 0x03];

/// TPM vendor IDs from the TCG vendor registry, plus the conformance ID
/// used by software TPMs in test suites.
const TPM_MANUFACTURERS: &[&str] = &[
    "FFFFF1D0", // FIDO conformance
    "414D4400", // AMD
    "41544D4C", // Atmel
    "4252434D", // Broadcom
    "4353434F", // Cisco
    "464C5953", // Flyslice
    "48504500", // HPE
    "49424D00", // IBM
    "49465800", // Infineon
    "494E5443", // Intel
    "4C454E00", // Lenovo
    "4D534654", // Microsoft
    "4E534D20", // National Semiconductor
    "4E545A00", // Nationz
    "4E544300", // Nuvoton
    "51434F4D", // Qualcomm
    "534D5343", // SMSC
    "53544D20", // STMicroelectronics
    "534D534E", // Samsung
    "534E5300", // Sinosun
    "54584E00", // Texas Instruments
    "57454300", // Winbond
    "524F4343", // Fuzhou Rockchip
    "474F4F47", // Google
];

/// `tpm`: attestation by a TPM 2.0 Attestation Identity Key.
///
/// The TPM certifies the credential key by signing a `TPMS_ATTEST`
/// (`certInfo`) that names the key's `TPMT_PUBLIC` (`pubArea`). The AIK
/// certificate in `x5c` vouches for the signing key.
pub(super) struct TpmVerifier;

impl AttestationVerifier for TpmVerifier {
    fn format(&self) -> AttestationFormat {
        FORMAT
    }

    /// Verifies a TPM attestation statement
    ///
    /// Structural checks on `pubArea`, `certInfo` and the AIK certificate
    /// all run before the signature over `certInfo`, so a tampered
    /// `extraData` surfaces as an `Attestation` error rather than a failed
    /// signature.
    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        let ver = get_text(input.att_stmt, "ver", FORMAT)?;
        if ver != "2.0" {
            tracing::error!("Unsupported TPM version: {}", ver);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("Unsupported TPM version {ver}"),
            ));
        }

        let alg = get_alg(input.att_stmt, FORMAT)?;
        let sig = get_bytes(input.att_stmt, "sig", FORMAT)?;
        let pub_area_bytes = get_bytes(input.att_stmt, "pubArea", FORMAT)?;
        let cert_info_bytes = get_bytes(input.att_stmt, "certInfo", FORMAT)?;
        if map_get(input.att_stmt, "ecdaaKeyId").is_some() {
            return Err(WebauthnError::attestation(
                FORMAT,
                "ECDAA attestation is not supported",
            ));
        }
        let x5c = require_x5c(input.att_stmt, FORMAT)?;

        let pub_area = PubArea::parse(pub_area_bytes)?;
        pub_area.check_matches(input.credential_public_key)?;

        let cert_info = CertInfo::parse(cert_info_bytes)?;
        cert_info.check_header()?;

        let expected_extra_data = hash_for_algorithm(alg, &input.signed_data())?;
        if cert_info.extra_data != expected_extra_data {
            tracing::error!("TPM extraData does not match hash of authData || clientDataHash");
            return Err(WebauthnError::attestation(
                FORMAT,
                "certInfo extraData does not match authenticator data and client data hash",
            ));
        }

        let expected_name = tpm_name(pub_area.name_alg, pub_area_bytes)?;
        if cert_info.attested_name != expected_name {
            tracing::error!("TPM attested name does not match pubArea");
            return Err(WebauthnError::attestation(
                FORMAT,
                "certInfo attested name does not match pubArea",
            ));
        }

        let aik = parse_leaf(&x5c, FORMAT)?;
        verify_aik_certificate(&aik, input)?;
        input.validate_chain(FORMAT, &x5c)?;

        verify_with_certificate(&aik, alg, sig, cert_info_bytes)
    }

    fn attestation_type(&self, _input: &VerifierInput<'_>) -> AttestationType {
        AttestationType::AttCa
    }
}

/// Big-endian cursor over TPM marshalled structures.
struct TpmReader<'a> {
    bytes: &'a [u8],
    what: &'static str,
}

impl<'a> TpmReader<'a> {
    fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, what }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WebauthnError> {
        if self.bytes.len() < len {
            tracing::error!("TPM {} truncated", self.what);
            return Err(WebauthnError::Decode(format!("TPM {} is truncated", self.what)));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16, WebauthnError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, WebauthnError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A `TPM2B_*`: u16 size followed by that many bytes.
    fn sized(&mut self) -> Result<&'a [u8], WebauthnError> {
        let len = self.u16()?;
        self.take(usize::from(len))
    }

    /// `TPMT_*_SCHEME`: the scheme, plus its hash algorithm unless NULL.
    fn scheme(&mut self) -> Result<u16, WebauthnError> {
        let scheme = self.u16()?;
        if scheme != TPM_ALG_NULL {
            let _hash_alg = self.u16()?;
        }
        Ok(scheme)
    }

    fn finish(self) -> Result<(), WebauthnError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(WebauthnError::Decode(format!(
                "{} trailing bytes after TPM {}",
                self.bytes.len(),
                self.what
            )))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PubAreaKey {
    Rsa {
        key_bits: u16,
        exponent: u32,
        modulus: Vec<u8>,
    },
    Ecc {
        curve_id: u16,
        x: Vec<u8>,
        y: Vec<u8>,
    },
}

/// `TPMT_PUBLIC`
#[derive(Debug)]
struct PubArea {
    name_alg: u16,
    object_attributes: u32,
    key: PubAreaKey,
}

impl PubArea {
    fn parse(bytes: &[u8]) -> Result<Self, WebauthnError> {
        let mut r = TpmReader::new(bytes, "pubArea");
        let key_type = r.u16()?;
        let name_alg = r.u16()?;
        let object_attributes = r.u32()?;
        let _auth_policy = r.sized()?;

        let symmetric = r.u16()?;
        if symmetric != TPM_ALG_NULL {
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("pubArea symmetric algorithm must be TPM_ALG_NULL, got {symmetric:#06x}"),
            ));
        }
        let _scheme = r.scheme()?;

        let key = match key_type {
            TPM_ALG_RSA => {
                let key_bits = r.u16()?;
                let exponent = match r.u32()? {
                    0 => RSA_DEFAULT_EXPONENT,
                    e => e,
                };
                let modulus = r.sized()?.to_vec();
                PubAreaKey::Rsa {
                    key_bits,
                    exponent,
                    modulus,
                }
            }
            TPM_ALG_ECC => {
                let curve_id = r.u16()?;
                let _kdf = r.scheme()?;
                let x = r.sized()?.to_vec();
                let y = r.sized()?.to_vec();
                PubAreaKey::Ecc { curve_id, x, y }
            }
            other => {
                tracing::error!("Unsupported pubArea type {:#06x}", other);
                return Err(WebauthnError::attestation(
                    FORMAT,
                    format!("Unsupported pubArea type {other:#06x}"),
                ));
            }
        };
        r.finish()?;

        tracing::debug!(
            "Parsed pubArea: nameAlg={:#06x}, objectAttributes={:#010x}",
            name_alg,
            object_attributes
        );
        Ok(Self {
            name_alg,
            object_attributes,
            key,
        })
    }

    /// The pubArea must describe the same key as the credential public key.
    fn check_matches(&self, credential_key: &CoseKey) -> Result<(), WebauthnError> {
        let matches = match (&self.key, credential_key) {
            (
                PubAreaKey::Rsa {
                    exponent, modulus, ..
                },
                CoseKey::Rsa { n, e, .. },
            ) => {
                let e = strip_leading_zeros(e);
                e.len() <= 4
                    && e.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)) == *exponent
                    && strip_leading_zeros(modulus) == strip_leading_zeros(n)
            }
            (PubAreaKey::Ecc { curve_id, x, y }, CoseKey::Ec2 { crv, x: cx, y: cy, .. }) => {
                let curve = match *curve_id {
                    TPM_ECC_NIST_P256 => Some(CoseCurve::P256),
                    TPM_ECC_NIST_P384 => Some(CoseCurve::P384),
                    TPM_ECC_NIST_P521 => Some(CoseCurve::P521),
                    _ => None,
                };
                curve == Some(*crv) && x == cx && y == cy
            }
            _ => false,
        };

        if !matches {
            tracing::error!("TPM pubArea key does not match credential public key");
            return Err(WebauthnError::attestation(
                FORMAT,
                "pubArea key does not match credential public key",
            ));
        }
        Ok(())
    }
}

/// `TPMS_ATTEST` with `TPMS_CERTIFY_INFO` attested data
#[derive(Debug)]
struct CertInfo {
    magic: u32,
    attest_type: u16,
    extra_data: Vec<u8>,
    firmware_version: u64,
    attested_name: Vec<u8>,
}

impl CertInfo {
    fn parse(bytes: &[u8]) -> Result<Self, WebauthnError> {
        let mut r = TpmReader::new(bytes, "certInfo");
        let magic = r.u32()?;
        let attest_type = r.u16()?;
        let _qualified_signer = r.sized()?;
        let extra_data = r.sized()?.to_vec();
        // TPMS_CLOCK_INFO: clock u64, resetCount u32, restartCount u32, safe u8
        let _clock_info = r.take(17)?;
        let fw = r.take(8)?;
        let firmware_version = fw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        let attested_name = r.sized()?.to_vec();
        let _qualified_name = r.sized()?;
        r.finish()?;

        Ok(Self {
            magic,
            attest_type,
            extra_data,
            firmware_version,
            attested_name,
        })
    }

    fn check_header(&self) -> Result<(), WebauthnError> {
        if self.magic != TPM_GENERATED_VALUE {
            tracing::error!("Invalid TPM magic: {:#010x}", self.magic);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("certInfo magic {:#010x} is not TPM_GENERATED_VALUE", self.magic),
            ));
        }
        if self.attest_type != TPM_ST_ATTEST_CERTIFY {
            tracing::error!("Invalid TPM attest type: {:#06x}", self.attest_type);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("certInfo type {:#06x} is not TPM_ST_ATTEST_CERTIFY", self.attest_type),
            ));
        }
        tracing::debug!("TPM firmware version {:#018x}", self.firmware_version);
        Ok(())
    }
}

/// Hash of `data` under the hash function of a signature algorithm.
fn hash_for_algorithm(alg: CoseAlgorithm, data: &[u8]) -> Result<Vec<u8>, WebauthnError> {
    let algorithm = match alg {
        CoseAlgorithm::RS1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
        CoseAlgorithm::ES256 | CoseAlgorithm::RS256 | CoseAlgorithm::PS256 => &digest::SHA256,
        CoseAlgorithm::ES384 | CoseAlgorithm::RS384 | CoseAlgorithm::PS384 => &digest::SHA384,
        CoseAlgorithm::ES512 | CoseAlgorithm::RS512 | CoseAlgorithm::PS512 => &digest::SHA512,
        CoseAlgorithm::EdDSA => return Err(WebauthnError::UnsupportedAlgorithm(alg.id())),
    };
    Ok(digest::digest(algorithm, data).as_ref().to_vec())
}

/// `TPM2B_NAME` contents for a public area: nameAlg followed by its digest.
fn tpm_name(name_alg: u16, pub_area: &[u8]) -> Result<Vec<u8>, WebauthnError> {
    let algorithm = match name_alg {
        TPM_ALG_SHA1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
        TPM_ALG_SHA256 => &digest::SHA256,
        TPM_ALG_SHA384 => &digest::SHA384,
        TPM_ALG_SHA512 => &digest::SHA512,
        other => {
            tracing::error!("Unsupported TPM nameAlg {:#06x}", other);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("Unsupported nameAlg {other:#06x}"),
            ));
        }
    };
    let mut name = name_alg.to_be_bytes().to_vec();
    name.extend_from_slice(digest::digest(algorithm, pub_area).as_ref());
    Ok(name)
}

/// AIK certificate requirements: version 3, empty subject, TPM device
/// attributes in the subject alternative name, the AIK EKU, not a CA and a
/// matching AAGUID extension if present.
fn verify_aik_certificate(
    cert: &X509Certificate<'_>,
    input: &VerifierInput<'_>,
) -> Result<(), WebauthnError> {
    if cert.version() != X509Version::V3 {
        return Err(WebauthnError::attestation(FORMAT, "AIK certificate must be version 3"));
    }

    if cert.subject().iter_attributes().next().is_some() {
        tracing::debug!("AIK certificate subject is not empty: {}", cert.subject());
        return Err(WebauthnError::attestation(
            FORMAT,
            "AIK certificate subject must be empty",
        ));
    }

    let san = cert
        .subject_alternative_name()
        .map_err(|e| WebauthnError::Decode(format!("Invalid subject alternative name: {e}")))?
        .ok_or_else(|| {
            WebauthnError::attestation(FORMAT, "AIK certificate has no subject alternative name")
        })?;
    let device = san
        .value
        .general_names
        .iter()
        .find_map(|name| match name {
            GeneralName::DirectoryName(dn) => Some(TpmDeviceAttributes::from_name(dn)),
            _ => None,
        })
        .ok_or_else(|| {
            WebauthnError::attestation(FORMAT, "Subject alternative name has no directory name")
        })?;
    device.check()?;

    let eku = cert
        .extended_key_usage()
        .map_err(|e| WebauthnError::Decode(format!("Invalid extended key usage: {e}")))?;
    let has_aik_usage = eku.is_some_and(|eku| {
        eku.value
            .other
            .iter()
            .any(|oid| oid.as_bytes() == OID_TCG_KP_AIK_CERTIFICATE)
    });
    if !has_aik_usage {
        return Err(WebauthnError::attestation(
            FORMAT,
            "AIK certificate lacks the tcg-kp-AIKCertificate key usage",
        ));
    }

    check_leaf_basics(cert, input, FORMAT)?;
    check_aaguid_extension(cert, input, FORMAT)
}

/// TPM manufacturer, model and version from the AIK's directory name.
#[derive(Debug, Default)]
struct TpmDeviceAttributes {
    manufacturer: Option<String>,
    model: Option<String>,
    version: Option<String>,
}

impl TpmDeviceAttributes {
    fn from_name(name: &X509Name<'_>) -> Self {
        let mut attrs = Self::default();
        for attr in name.iter_attributes() {
            let value = attr.as_str().ok().map(str::to_string);
            match attr.attr_type().as_bytes() {
                OID_TCG_AT_TPM_MANUFACTURER => attrs.manufacturer = value,
                OID_TCG_AT_TPM_MODEL => attrs.model = value,
                OID_TCG_AT_TPM_VERSION => attrs.version = value,
                _ => {}
            }
        }
        attrs
    }

    fn check(&self) -> Result<(), WebauthnError> {
        let manufacturer = self.manufacturer.as_deref().ok_or_else(|| {
            WebauthnError::attestation(FORMAT, "AIK certificate has no TPM manufacturer")
        })?;
        if !is_known_manufacturer(manufacturer) {
            tracing::error!("Unknown TPM manufacturer: {}", manufacturer);
            return Err(WebauthnError::attestation(
                FORMAT,
                format!("Unknown TPM manufacturer {manufacturer}"),
            ));
        }
        if self.model.as_deref().is_none_or(str::is_empty) {
            return Err(WebauthnError::attestation(FORMAT, "AIK certificate has no TPM model"));
        }
        if self.version.as_deref().is_none_or(str::is_empty) {
            return Err(WebauthnError::attestation(FORMAT, "AIK certificate has no TPM version"));
        }
        Ok(())
    }
}

/// Manufacturer values look like `id:414D4400`.
fn is_known_manufacturer(value: &str) -> bool {
    let id = value.strip_prefix("id:").unwrap_or(value).to_ascii_uppercase();
    TPM_MANUFACTURERS.contains(&id.as_str())
}
