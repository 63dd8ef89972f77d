mod attestation;
mod auth;
mod authenticator_data;
mod cbor;
mod cert;
mod client_data;
mod cose;
mod metadata;
mod register;
mod relying_party;
#[cfg(test)]
mod test_utils;
mod types;

pub use attestation::{AttestationFormat, AttestationType};

pub use authenticator_data::{
    AttestedCredentialData, AuthenticatorData, AuthenticatorFlags, parse_authenticator_data,
};

pub use cbor::{decode_cbor_exact, decode_cbor_first, encode_cbor};

pub use cert::{PathError, validate_certificate_path};

pub use client_data::{
    ClientData, ClientDataType, TokenBinding, TokenBindingStatus, validate_client_data,
};

pub use cose::{CoseAlgorithm, CoseCurve, CoseKey};

pub use metadata::{
    MetadataLookup, MetadataStatement, NoMetadata, NoRevocation, RevocationChecker,
    StaticMetadata, StaticTrustAnchors, TrustAnchorStore, metadata_algorithm_name,
};

pub use relying_party::RelyingParty;

pub use types::{
    AuthenticationInfo, CredentialDeviceType, RegistrationInfo, VerifiedAuthentication,
    VerifiedRegistration,
};
