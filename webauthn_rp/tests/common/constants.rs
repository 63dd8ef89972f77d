/// Relying party used by most scenarios
pub const RP_ID: &str = "dev.dontneeda.pw";
pub const ORIGIN: &str = "https://dev.dontneeda.pw";

/// Challenge issued for the registration scenarios
pub const CHALLENGE: &[u8] = b"totallyUniqueValueEveryAttestation";
pub const OTHER_CHALLENGE: &[u8] = b"aDifferentChallengeFromAnotherSession";

/// Webauthn client data types
pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

/// Authenticator data flags
pub mod flags {
    pub const UP: u8 = 0x01;
    pub const UV: u8 = 0x04;
    pub const BE: u8 = 0x08;
    pub const BS: u8 = 0x10;
    pub const AT: u8 = 0x40;
}

/// Subject alternative name of the software TPM used in the tests
pub mod tpm {
    pub const MANUFACTURER: &str = "id:FFFFF1D0";
    pub const MODEL: &str = "FIDO Test TPM";
    pub const VERSION: &str = "id:13";
}

pub const SAFETYNET_HOSTNAME: &str = "attest.android.com";
