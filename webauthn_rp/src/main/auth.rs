use subtle::ConstantTimeEq;

use crate::errors::WebauthnError;
use crate::types::{AuthenticationResponse, ExpectedChallenge, StoredCredential};
use crate::utils::{concat, hex_encode};

use super::authenticator_data::parse_authenticator_data;
use super::client_data::{ClientDataType, validate_client_data};
use super::cose::CoseKey;
use super::relying_party::{RelyingParty, decode_credential_id, decode_field, sha256};
use super::types::{AuthenticationInfo, CredentialDeviceType, VerifiedAuthentication};

/// A counter that fails to increase is reported, not rejected: some
/// authenticators keep a global counter and some never increment. A zero on
/// either side means the authenticator does not implement counters.
fn counter_regressed(stored: u32, received: u32) -> bool {
    stored != 0 && received != 0 && received <= stored
}

/// The response's user handle, when both sides have one, must equal the
/// stored handle.
fn verify_user_handle(
    response_handle: Option<&str>,
    stored: &StoredCredential,
) -> Result<(), WebauthnError> {
    let (Some(handle), Some(stored_handle)) = (response_handle, stored.user_handle.as_ref())
    else {
        tracing::debug!("No user handle to compare");
        return Ok(());
    };
    let handle = decode_field(handle, "userHandle")?;
    if !bool::from(handle.as_slice().ct_eq(stored_handle.as_slice())) {
        tracing::error!("User handle mismatch");
        return Err(WebauthnError::UserHandleMismatch);
    }
    Ok(())
}

impl RelyingParty {
    /// Verifies an authentication assertion against a stored credential.
    ///
    /// # Arguments
    /// * `response` - The assertion returned by `navigator.credentials.get()`
    /// * `expected_challenge` - The challenge issued for this ceremony
    /// * `credential` - The credential the caller looked up by `response.id`
    ///
    /// # Returns
    /// * `verified: true` with the counter to store, or
    /// * `verified: false` with no info when the signature does not verify
    ///
    /// A counter regression sets `counter_regressed` and is logged; it does
    /// not fail the ceremony.
    pub async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected_challenge: &ExpectedChallenge,
        credential: &StoredCredential,
    ) -> Result<VerifiedAuthentication, WebauthnError> {
        let client_data_json = decode_field(&response.response.client_data_json, "clientDataJSON")?;
        validate_client_data(
            &client_data_json,
            ClientDataType::Get,
            expected_challenge,
            &self.config.origins,
        )?;

        let auth_data_bytes =
            decode_field(&response.response.authenticator_data, "authenticatorData")?;
        let auth_data = parse_authenticator_data(&auth_data_bytes)?;
        self.check_authenticator_data(&auth_data)?;

        let raw_id = decode_credential_id(&response.type_, &response.id, &response.raw_id)?;
        if raw_id != credential.credential_id {
            tracing::error!(
                "Assertion credential ID {} does not match the stored credential {}",
                hex_encode(&raw_id),
                hex_encode(&credential.credential_id)
            );
            return Err(WebauthnError::CredentialNotFound(response.id.clone()));
        }

        verify_user_handle(response.response.user_handle.as_deref(), credential)?;

        let public_key = CoseKey::from_bytes(&credential.public_key)?;
        let signature = decode_field(&response.response.signature, "signature")?;
        let signed_data = concat(&[auth_data_bytes.as_slice(), &sha256(&client_data_json)]);
        if !public_key.verify(&signature, &signed_data)? {
            tracing::error!("Assertion signature did not verify");
            return Ok(VerifiedAuthentication {
                verified: false,
                info: None,
            });
        }

        let regressed = counter_regressed(credential.counter, auth_data.counter);
        if regressed {
            tracing::warn!(
                "Signature counter did not increase: stored={}, received={}. Possible cloned authenticator",
                credential.counter,
                auth_data.counter
            );
        }

        tracing::debug!(
            "Authentication verified: counter={}, uv={}",
            auth_data.counter,
            auth_data.flags.user_verified
        );

        Ok(VerifiedAuthentication {
            verified: true,
            info: Some(AuthenticationInfo {
                credential_id: credential.credential_id.clone(),
                new_counter: auth_data.counter,
                counter_regressed: regressed,
                user_verified: auth_data.flags.user_verified,
                credential_backed_up: auth_data.flags.backup_state,
                credential_device_type: CredentialDeviceType::from_flags(&auth_data.flags),
                extensions: auth_data.extensions,
            }),
        })
    }
}
