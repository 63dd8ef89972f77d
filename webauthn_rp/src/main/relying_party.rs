use std::sync::Arc;

use ring::digest;

use crate::config::RpConfig;
use crate::errors::WebauthnError;
use crate::utils::base64url_decode;

use super::authenticator_data::AuthenticatorData;
use super::metadata::{
    MetadataLookup, NoMetadata, NoRevocation, RevocationChecker, StaticTrustAnchors,
    TrustAnchorStore,
};

/// Verification context for one relying party.
///
/// Holds the configuration and the injected trust capabilities. It has no
/// mutable state, so one instance can be shared across tasks behind an
/// `Arc`.
#[derive(Clone)]
pub struct RelyingParty {
    pub(super) config: RpConfig,
    pub(super) metadata: Arc<dyn MetadataLookup>,
    pub(super) revocation: Arc<dyn RevocationChecker>,
    pub(super) anchors: Arc<dyn TrustAnchorStore>,
}

impl RelyingParty {
    /// A relying party without metadata, revocation data or trust anchors:
    /// attestation statements are checked for internal consistency only.
    pub fn new(config: RpConfig) -> Self {
        Self {
            config,
            metadata: Arc::new(NoMetadata),
            revocation: Arc::new(NoRevocation),
            anchors: Arc::new(StaticTrustAnchors::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataLookup>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_revocation(mut self, revocation: Arc<dyn RevocationChecker>) -> Self {
        self.revocation = revocation;
        self
    }

    pub fn with_trust_anchors(mut self, anchors: Arc<dyn TrustAnchorStore>) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn config(&self) -> &RpConfig {
        &self.config
    }

    /// Checks shared by both ceremonies: rpIdHash matches a configured RP
    /// ID, then user presence, then user verification when required.
    pub(super) fn check_authenticator_data(
        &self,
        auth_data: &AuthenticatorData,
    ) -> Result<(), WebauthnError> {
        let rp_id_matches = self
            .config
            .rp_ids
            .iter()
            .any(|rp_id| sha256(rp_id.as_bytes()) == auth_data.rp_id_hash);
        if !rp_id_matches {
            tracing::error!("RP ID hash does not match any of {:?}", self.config.rp_ids);
            return Err(WebauthnError::RpIdHash(format!(
                "rpIdHash does not match any of {:?}",
                self.config.rp_ids
            )));
        }

        if !auth_data.flags.user_present {
            tracing::error!("User Present flag not set");
            return Err(WebauthnError::UserNotPresent);
        }

        if self.config.user_verification.is_required() && !auth_data.flags.user_verified {
            tracing::error!("User verification required but flag not set");
            return Err(WebauthnError::UserNotVerified);
        }

        Ok(())
    }
}

const PUBLIC_KEY_TYPE: &str = "public-key";

/// Decodes a base64url field of a WebAuthn JSON response.
pub(super) fn decode_field(value: &str, what: &str) -> Result<Vec<u8>, WebauthnError> {
    base64url_decode(value).map_err(|e| {
        tracing::error!("Failed to decode {}: {}", what, e);
        WebauthnError::Decode(format!("Failed to decode {what}: {e}"))
    })
}

/// Checks the credential `type` and that `id` names the same credential as
/// `rawId`, returning the decoded `rawId`.
pub(super) fn decode_credential_id(
    type_: &str,
    id: &str,
    raw_id: &str,
) -> Result<Vec<u8>, WebauthnError> {
    if type_ != PUBLIC_KEY_TYPE {
        tracing::error!("Credential type is '{}', expected '{}'", type_, PUBLIC_KEY_TYPE);
        return Err(WebauthnError::CredentialMismatch(format!(
            "Credential type '{type_}' is not '{PUBLIC_KEY_TYPE}'"
        )));
    }
    let raw_id = decode_field(raw_id, "rawId")?;
    if decode_field(id, "id")? != raw_id {
        tracing::error!("Credential id does not match rawId");
        return Err(WebauthnError::CredentialMismatch(
            "Credential id does not match rawId".into(),
        ));
    }
    Ok(raw_id)
}

pub(super) fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}
