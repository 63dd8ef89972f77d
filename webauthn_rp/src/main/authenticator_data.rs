use ciborium::value::Value as CborValue;
use uuid::Uuid;

use crate::errors::WebauthnError;

use super::cbor::decode_cbor_first;
use super::cose::CoseKey;

/// Flags for AuthenticatorData as defined in WebAuthn Level 3
mod auth_data_flags {
    /// User Present (UP) - Bit 0
    pub(super) const UP: u8 = 1 << 0;
    /// User Verified (UV) - Bit 2
    pub(super) const UV: u8 = 1 << 2;
    /// Backup Eligibility (BE) - Bit 3
    pub(super) const BE: u8 = 1 << 3;
    /// Backup State (BS) - Bit 4
    pub(super) const BS: u8 = 1 << 4;
    /// Attested Credential Data Present - Bit 6
    pub(super) const AT: u8 = 1 << 6;
    /// Extension Data Present - Bit 7
    pub(super) const ED: u8 = 1 << 7;
}

const RP_ID_HASH_LEN: usize = 32;
const HEADER_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;
const MAX_CREDENTIAL_ID_LEN: usize = 1023;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthenticatorFlags {
    pub user_present: bool,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub attested_data_included: bool,
    pub extension_data_included: bool,
}

impl AuthenticatorFlags {
    pub fn from_byte(flags: u8) -> Self {
        Self {
            user_present: flags & auth_data_flags::UP != 0,
            user_verified: flags & auth_data_flags::UV != 0,
            backup_eligible: flags & auth_data_flags::BE != 0,
            backup_state: flags & auth_data_flags::BS != 0,
            attested_data_included: flags & auth_data_flags::AT != 0,
            extension_data_included: flags & auth_data_flags::ED != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        [
            (self.user_present, auth_data_flags::UP),
            (self.user_verified, auth_data_flags::UV),
            (self.backup_eligible, auth_data_flags::BE),
            (self.backup_state, auth_data_flags::BS),
            (self.attested_data_included, auth_data_flags::AT),
            (self.extension_data_included, auth_data_flags::ED),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, bit)| acc | bit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
    /// The COSE key exactly as it appeared in the authenticator data
    pub credential_public_key_bytes: Vec<u8>,
}

impl AttestedCredentialData {
    pub fn aaguid_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.aaguid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub counter: u32,
    pub attested: Option<AttestedCredentialData>,
    pub extensions: Option<CborValue>,
    pub raw: Vec<u8>,
}

fn truncated(what: &str) -> WebauthnError {
    tracing::error!("Authenticator data truncated while reading {}", what);
    WebauthnError::Decode(format!("Authenticator data truncated while reading {what}"))
}

/// Parses authenticator data.
///
/// Layout:
/// - RP ID hash (32 bytes)
/// - Flags (1 byte)
/// - Signature counter (4 bytes, big endian)
/// - If AT: AAGUID (16 bytes), credential ID length (2 bytes, big endian),
///   credential ID, credential public key (one CBOR item)
/// - If ED: extensions (one CBOR map)
///
/// Nothing may follow the last item.
pub fn parse_authenticator_data(bytes: &[u8]) -> Result<AuthenticatorData, WebauthnError> {
    if bytes.len() < HEADER_LEN {
        return Err(truncated("header"));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
    let flags = AuthenticatorFlags::from_byte(bytes[RP_ID_HASH_LEN]);
    let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

    if flags.backup_state && !flags.backup_eligible {
        tracing::error!("Backup state flag set without backup eligibility");
        return Err(WebauthnError::Decode(
            "Backup state flag set on a credential that is not backup eligible".into(),
        ));
    }

    let mut pos = HEADER_LEN;

    let attested = if flags.attested_data_included {
        let rest = &bytes[pos..];
        if rest.len() < AAGUID_LEN + 2 {
            return Err(truncated("attested credential data"));
        }
        let mut aaguid = [0u8; 16];
        aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
        let cred_id_len = usize::from(u16::from_be_bytes([rest[16], rest[17]]));
        if cred_id_len > MAX_CREDENTIAL_ID_LEN {
            tracing::error!("Credential ID length {} exceeds limit", cred_id_len);
            return Err(WebauthnError::Decode(format!(
                "Credential ID length {cred_id_len} exceeds {MAX_CREDENTIAL_ID_LEN} bytes"
            )));
        }
        pos += AAGUID_LEN + 2;

        if bytes.len() < pos + cred_id_len {
            return Err(truncated("credential ID"));
        }
        let credential_id = bytes[pos..pos + cred_id_len].to_vec();
        pos += cred_id_len;

        let (key_value, key_len) = decode_cbor_first(&bytes[pos..])?;
        let credential_public_key_bytes = bytes[pos..pos + key_len].to_vec();
        let credential_public_key = CoseKey::from_cbor(&key_value)?;
        pos += key_len;

        Some(AttestedCredentialData {
            aaguid,
            credential_id,
            credential_public_key,
            credential_public_key_bytes,
        })
    } else {
        None
    };

    let extensions = if flags.extension_data_included {
        let (value, len) = decode_cbor_first(&bytes[pos..])?;
        if !matches!(value, CborValue::Map(_)) {
            return Err(WebauthnError::Decode(
                "Authenticator extensions must be a CBOR map".into(),
            ));
        }
        pos += len;
        Some(value)
    } else {
        None
    };

    if pos != bytes.len() {
        tracing::error!(
            "Authenticator data has {} unexpected trailing bytes",
            bytes.len() - pos
        );
        return Err(WebauthnError::Decode(format!(
            "Unexpected {} trailing bytes in authenticator data",
            bytes.len() - pos
        )));
    }

    tracing::debug!(
        "Parsed authenticator data: flags={:?}, counter={}, attested={}, extensions={}",
        flags,
        counter,
        attested.is_some(),
        extensions.is_some()
    );

    Ok(AuthenticatorData {
        rp_id_hash,
        flags,
        counter,
        attested,
        extensions,
        raw: bytes.to_vec(),
    })
}
