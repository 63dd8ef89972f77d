use ciborium::value::Value as CborValue;
use uuid::Uuid;

use super::attestation::{AttestationFormat, AttestationType};
use super::authenticator_data::AuthenticatorFlags;
use super::cose::CoseAlgorithm;

/// Whether a credential can leave the authenticator it was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialDeviceType {
    SingleDevice,
    MultiDevice,
}

impl CredentialDeviceType {
    pub(crate) fn from_flags(flags: &AuthenticatorFlags) -> Self {
        if flags.backup_eligible {
            Self::MultiDevice
        } else {
            Self::SingleDevice
        }
    }
}

/// Outcome of a registration ceremony. `info` is present only when
/// `verified` is true.
#[derive(Debug, Clone)]
pub struct VerifiedRegistration {
    pub verified: bool,
    pub info: Option<RegistrationInfo>,
}

/// What the caller should persist for a newly registered credential.
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    pub fmt: AttestationFormat,
    pub attestation_type: AttestationType,
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    /// COSE-encoded public key, as it appeared in the authenticator data
    pub credential_public_key: Vec<u8>,
    pub credential_algorithm: CoseAlgorithm,
    pub counter: u32,
    pub user_verified: bool,
    pub credential_backed_up: bool,
    pub credential_device_type: CredentialDeviceType,
    /// The raw attestation object, for callers that keep it for audit
    pub attestation_object: Vec<u8>,
    pub extensions: Option<CborValue>,
}

/// Outcome of an authentication ceremony.
#[derive(Debug, Clone)]
pub struct VerifiedAuthentication {
    pub verified: bool,
    pub info: Option<AuthenticationInfo>,
}

#[derive(Debug, Clone)]
pub struct AuthenticationInfo {
    pub credential_id: Vec<u8>,
    /// Counter to store for the next ceremony
    pub new_counter: u32,
    /// Both counters were non-zero and the new one did not increase
    pub counter_regressed: bool,
    pub user_verified: bool,
    pub credential_backed_up: bool,
    pub credential_device_type: CredentialDeviceType,
    pub extensions: Option<CborValue>,
}
