use std::fmt;

use serde::{Deserialize, Serialize};

/// Credential data received from the browser after
/// `navigator.credentials.create()`.
///
/// Byte fields are base64url strings, exactly as the WebAuthn JSON
/// serialization produces them.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AuthenticatorAttestationResponse,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Assertion received from the browser after `navigator.credentials.get()`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AuthenticatorAssertionResponse,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default)]
    pub user_handle: Option<String>,
}

/// A credential as the caller stored it after registration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub credential_id: Vec<u8>,
    /// COSE-encoded credential public key
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub user_handle: Option<Vec<u8>>,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// How the challenge in `clientDataJSON` is checked.
pub enum ExpectedChallenge {
    /// The challenge the RP issued, compared in constant time
    Exact(Vec<u8>),
    /// Caller-supplied acceptance test, for RPs that encode state in the
    /// challenge
    Predicate(Box<dyn Fn(&[u8]) -> bool + Send + Sync>),
}

impl fmt::Debug for ExpectedChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(challenge) => f.debug_tuple("Exact").field(challenge).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<Vec<u8>> for ExpectedChallenge {
    fn from(challenge: Vec<u8>) -> Self {
        Self::Exact(challenge)
    }
}

impl From<&[u8]> for ExpectedChallenge {
    fn from(challenge: &[u8]) -> Self {
        Self::Exact(challenge.to_vec())
    }
}
