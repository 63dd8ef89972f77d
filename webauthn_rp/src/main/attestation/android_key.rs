use x509_parser::der_parser::ber::BerObjectContent;
use x509_parser::der_parser::der::DerObject;

use crate::errors::WebauthnError;

use super::super::cert::{
    context_explicit, find_extension, parse_der_exact, public_key_matches, verify_with_certificate,
};
use super::core::{AttestationFormat, AttestationType, AttestationVerifier, VerifierInput};
use super::utils::{get_alg, get_bytes, parse_leaf, require_x5c};

const FORMAT: AttestationFormat = AttestationFormat::AndroidKey;

/// Android key attestation extension, 1.3.6.1.4.1.11129.2.1.17
const OID_ANDROID_KEY_DESCRIPTION: &[u8] =
    &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xD6, 0x79, 0x02, 0x01, 0x11];

/// AuthorizationList tags
mod auth_list_tags {
    pub const PURPOSE: u32 = 1;
    pub const ALL_APPLICATIONS: u32 = 600;
    pub const ORIGIN: u32 = 702;
}

/// KM_ORIGIN_GENERATED
const KM_ORIGIN_GENERATED: u64 = 0;
/// KM_PURPOSE_SIGN
const KM_PURPOSE_SIGN: u64 = 2;

/// `android-key`: keys generated in Android Keystore, attested by a
/// certificate chain whose leaf certifies the credential key.
pub(super) struct AndroidKeyVerifier;

impl AttestationVerifier for AndroidKeyVerifier {
    fn format(&self) -> AttestationFormat {
        FORMAT
    }

    fn verify(&self, input: &VerifierInput<'_>) -> Result<bool, WebauthnError> {
        tracing::debug!("Verifying Android key attestation");

        let alg = get_alg(input.att_stmt, FORMAT)?;
        let sig = get_bytes(input.att_stmt, "sig", FORMAT)?;
        let x5c = require_x5c(input.att_stmt, FORMAT)?;
        let cert = parse_leaf(&x5c, FORMAT)?;

        if !public_key_matches(&cert, input.credential_public_key) {
            tracing::error!("Android key attestation certificate key differs from credential key");
            return Err(WebauthnError::attestation(
                FORMAT,
                "Attestation certificate key does not match credential public key",
            ));
        }

        let ext = find_extension(&cert, OID_ANDROID_KEY_DESCRIPTION).ok_or_else(|| {
            WebauthnError::attestation(FORMAT, "Missing key description extension")
        })?;
        let description = KeyDescription::parse(ext.value)?;
        description.check(&input.client_data_hash)?;

        input.validate_chain(FORMAT, &x5c)?;

        verify_with_certificate(&cert, alg, sig, &input.signed_data())
    }

    fn attestation_type(&self, _input: &VerifierInput<'_>) -> AttestationType {
        AttestationType::Basic
    }
}

/// The parts of an `AuthorizationList` relevant to WebAuthn.
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthorizationList {
    all_applications: bool,
    origin: Option<u64>,
    purposes: Vec<u64>,
}

impl AuthorizationList {
    fn parse(element: &DerObject<'_>) -> Result<Self, WebauthnError> {
        let BerObjectContent::Sequence(entries) = &element.content else {
            return Err(WebauthnError::attestation(
                FORMAT,
                "AuthorizationList is not a SEQUENCE",
            ));
        };

        let mut list = Self::default();
        for entry in entries {
            let Some((tag, inner)) = context_explicit(entry, "AuthorizationList entry")? else {
                continue;
            };
            match tag {
                auth_list_tags::ALL_APPLICATIONS => list.all_applications = true,
                auth_list_tags::ORIGIN => list.origin = Some(unsigned(&inner)?),
                auth_list_tags::PURPOSE => {
                    let BerObjectContent::Set(purposes) = &inner.content else {
                        return Err(WebauthnError::attestation(FORMAT, "purpose is not a SET"));
                    };
                    for purpose in purposes {
                        list.purposes.push(unsigned(purpose)?);
                    }
                }
                _ => {}
            }
        }
        Ok(list)
    }
}

/// Value of an INTEGER or ENUMERATED that fits in a `u64`.
fn unsigned(obj: &DerObject<'_>) -> Result<u64, WebauthnError> {
    obj.as_u64().map_err(|e| {
        tracing::error!("AuthorizationList value is not an unsigned integer: {}", e);
        WebauthnError::Decode(format!("Invalid AuthorizationList integer: {e}"))
    })
}

/// KeyDescription, as carried in the attestation certificate:
/// attestationChallenge at index 4, softwareEnforced at 6, teeEnforced at 7.
#[derive(Debug)]
struct KeyDescription {
    attestation_challenge: Vec<u8>,
    software_enforced: AuthorizationList,
    tee_enforced: AuthorizationList,
}

impl KeyDescription {
    fn parse(value: &[u8]) -> Result<Self, WebauthnError> {
        let description = parse_der_exact(value, "KeyDescription")?;
        let BerObjectContent::Sequence(fields) = &description.content else {
            return Err(WebauthnError::attestation(
                FORMAT,
                "KeyDescription is not a SEQUENCE",
            ));
        };
        if fields.len() < 8 {
            tracing::error!("KeyDescription has {} fields, expected 8", fields.len());
            return Err(WebauthnError::attestation(
                FORMAT,
                "KeyDescription has too few fields",
            ));
        }

        let BerObjectContent::OctetString(challenge) = fields[4].content else {
            return Err(WebauthnError::attestation(
                FORMAT,
                "attestationChallenge is not an OCTET STRING",
            ));
        };

        Ok(Self {
            attestation_challenge: challenge.to_vec(),
            software_enforced: AuthorizationList::parse(&fields[6])?,
            tee_enforced: AuthorizationList::parse(&fields[7])?,
        })
    }

    fn check(&self, client_data_hash: &[u8]) -> Result<(), WebauthnError> {
        if self.attestation_challenge != client_data_hash {
            tracing::error!("Android attestationChallenge does not match clientDataHash");
            return Err(WebauthnError::attestation(
                FORMAT,
                "attestationChallenge does not match client data hash",
            ));
        }

        if self.software_enforced.all_applications || self.tee_enforced.all_applications {
            return Err(WebauthnError::attestation(
                FORMAT,
                "Key is bound to all applications",
            ));
        }

        let origin = self.tee_enforced.origin.or(self.software_enforced.origin);
        if origin != Some(KM_ORIGIN_GENERATED) {
            tracing::error!("Android key origin is {:?}, expected GENERATED", origin);
            return Err(WebauthnError::attestation(
                FORMAT,
                "Key origin is not KM_ORIGIN_GENERATED",
            ));
        }

        let can_sign = self
            .software_enforced
            .purposes
            .iter()
            .chain(&self.tee_enforced.purposes)
            .any(|p| *p == KM_PURPOSE_SIGN);
        if !can_sign {
            return Err(WebauthnError::attestation(
                FORMAT,
                "Key purpose does not include KM_PURPOSE_SIGN",
            ));
        }

        Ok(())
    }
}
