//! webauthn-rp - WebAuthn/FIDO2 relying-party verification engine
//!
//! Verifies registration (attestation) and authentication (assertion)
//! responses produced by `navigator.credentials.create()` and
//! `navigator.credentials.get()`. Challenge issuance, user and credential
//! storage, and HTTP handling stay with the caller; this crate only decides
//! whether a response is genuine.
//!
//! ```no_run
//! use webauthn_rp::{ExpectedChallenge, RelyingParty, RpConfig};
//!
//! # async fn run(response: webauthn_rp::RegistrationResponse, challenge: Vec<u8>)
//! # -> Result<(), webauthn_rp::WebauthnError> {
//! let rp = RelyingParty::new(RpConfig::new("example.com", "https://example.com"));
//! let result = rp
//!     .verify_registration(&response, &ExpectedChallenge::Exact(challenge))
//!     .await?;
//! if let Some(info) = result.info {
//!     println!("registered {} credential", info.fmt);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod errors;
mod main;
mod types;
mod utils;

pub use config::{RpConfig, SafetyNetPolicy, UserVerification};

pub use errors::{ErrorKind, WebauthnError};

pub use types::{
    AuthenticationResponse, AuthenticatorAssertionResponse, AuthenticatorAttestationResponse,
    ExpectedChallenge, RegistrationResponse, StoredCredential,
};

pub use main::{
    AttestationFormat, AttestationType, AttestedCredentialData, AuthenticationInfo,
    AuthenticatorData, AuthenticatorFlags, ClientData, ClientDataType, CoseAlgorithm, CoseCurve,
    CoseKey, CredentialDeviceType, MetadataLookup, MetadataStatement, NoMetadata, NoRevocation,
    PathError, RegistrationInfo, RelyingParty, RevocationChecker, StaticMetadata,
    StaticTrustAnchors, TokenBinding, TokenBindingStatus, TrustAnchorStore, VerifiedAuthentication,
    VerifiedRegistration, decode_cbor_exact, decode_cbor_first, encode_cbor,
    metadata_algorithm_name, parse_authenticator_data, validate_certificate_path,
    validate_client_data,
};

pub use utils::{UtilError, base64url_decode, base64url_encode, hex_encode};
