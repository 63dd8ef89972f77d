use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::errors::WebauthnError;
use crate::types::ExpectedChallenge;
use crate::utils::base64url_decode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBindingStatus {
    Present,
    Supported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBinding {
    pub status: TokenBindingStatus,
    pub id: Option<String>,
}

/// Client data as signed by the client, rebuilt per ceremony and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientData {
    pub type_: ClientDataType,
    pub challenge: Vec<u8>,
    pub origin: String,
    pub cross_origin: Option<bool>,
    pub token_binding: Option<TokenBinding>,
    /// The exact `clientDataJSON` bytes; hashed for signature input
    pub raw: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct RawClientData {
    #[serde(rename = "type")]
    type_: String,
    challenge: String,
    origin: String,
    #[serde(rename = "crossOrigin", default)]
    cross_origin: Option<bool>,
    #[serde(rename = "tokenBinding", default)]
    token_binding: Option<RawTokenBinding>,
}

#[derive(Debug, Deserialize)]
struct RawTokenBinding {
    status: String,
    #[serde(default)]
    id: Option<String>,
}

/// Parses `clientDataJSON` and checks it against the ceremony expectations.
///
/// Checks run in this order, each with its own error:
/// 1. `type` equals the expected ceremony type
/// 2. `challenge` satisfies `expected_challenge`
/// 3. `origin` is one of `expected_origins`
/// 4. `tokenBinding.status`, when present, is `present` or `supported`
///
/// # Errors
/// * `Decode` if the input is not UTF-8 JSON with the required members
/// * `ClientDataType`, `Challenge` or `Origin` for the failing check
pub fn validate_client_data(
    raw_json: &[u8],
    expected_type: ClientDataType,
    expected_challenge: &ExpectedChallenge,
    expected_origins: &[String],
) -> Result<ClientData, WebauthnError> {
    let json = std::str::from_utf8(raw_json).map_err(|e| {
        tracing::error!("Client data is not valid UTF-8: {}", e);
        WebauthnError::Decode(format!("Client data is not valid UTF-8: {e}"))
    })?;
    let parsed: RawClientData = serde_json::from_str(json).map_err(|e| {
        tracing::error!("Invalid client data JSON: {}", e);
        WebauthnError::Decode(format!("Invalid client data JSON: {e}"))
    })?;

    tracing::debug!(
        "Client data: type={}, origin={}, crossOrigin={:?}",
        parsed.type_,
        parsed.origin,
        parsed.cross_origin
    );

    if parsed.type_ != expected_type.as_str() {
        tracing::error!(
            "Invalid client data type. Expected: {}, Got: {}",
            expected_type.as_str(),
            parsed.type_
        );
        return Err(WebauthnError::ClientDataType {
            expected: expected_type.as_str().to_string(),
            actual: parsed.type_,
        });
    }

    let challenge = base64url_decode(&parsed.challenge).map_err(|e| {
        tracing::error!("Challenge is not valid base64url: {}", e);
        WebauthnError::Decode(format!("Challenge is not valid base64url: {e}"))
    })?;
    let challenge_ok = match expected_challenge {
        ExpectedChallenge::Exact(expected) => bool::from(challenge.as_slice().ct_eq(expected.as_slice())),
        ExpectedChallenge::Predicate(accept) => accept(&challenge),
    };
    if !challenge_ok {
        tracing::error!("Challenge mismatch");
        return Err(WebauthnError::Challenge(
            "Challenge mismatch. For more details, run with RUST_LOG=debug".into(),
        ));
    }

    if !expected_origins.iter().any(|o| *o == parsed.origin) {
        tracing::error!(
            "Invalid origin. Expected one of: {:?}, Got: {}",
            expected_origins,
            parsed.origin
        );
        return Err(WebauthnError::Origin(format!(
            "Unexpected origin {}",
            parsed.origin
        )));
    }

    let token_binding = parsed
        .token_binding
        .map(|tb| {
            let status = match tb.status.as_str() {
                "present" => TokenBindingStatus::Present,
                "supported" => TokenBindingStatus::Supported,
                other => {
                    tracing::error!("Invalid token binding status: {}", other);
                    return Err(WebauthnError::Decode(format!(
                        "Invalid token binding status: {other}"
                    )));
                }
            };
            if status == TokenBindingStatus::Present && tb.id.is_none() {
                return Err(WebauthnError::Decode(
                    "Token binding status is present but id is missing".into(),
                ));
            }
            Ok(TokenBinding { status, id: tb.id })
        })
        .transpose()?;

    Ok(ClientData {
        type_: expected_type,
        challenge,
        origin: parsed.origin,
        cross_origin: parsed.cross_origin,
        token_binding,
        raw: raw_json.to_vec(),
    })
}
