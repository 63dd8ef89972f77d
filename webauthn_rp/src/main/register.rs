use ciborium::value::Value as CborValue;

use crate::errors::WebauthnError;
use crate::types::{ExpectedChallenge, RegistrationResponse};

use super::attestation::{AttestationFormat, TrustContext, VerifierInput, verify_attestation};
use super::authenticator_data::parse_authenticator_data;
use super::cbor::{CborMap, decode_cbor_exact, map_get};
use super::client_data::{ClientDataType, validate_client_data};
use super::metadata::MetadataStatement;
use super::relying_party::{RelyingParty, decode_credential_id, decode_field, sha256};
use super::types::{CredentialDeviceType, RegistrationInfo, VerifiedRegistration};

/// The three members of a CBOR attestation object.
#[derive(Debug)]
struct AttestationObject {
    fmt: String,
    auth_data: Vec<u8>,
    att_stmt: CborMap,
}

fn parse_attestation_object(bytes: &[u8]) -> Result<AttestationObject, WebauthnError> {
    let CborValue::Map(map) = decode_cbor_exact(bytes)? else {
        return Err(WebauthnError::Decode(
            "Attestation object is not a CBOR map".to_string(),
        ));
    };

    let fmt = match map_get(&map, "fmt") {
        Some(CborValue::Text(fmt)) => fmt.clone(),
        _ => return Err(WebauthnError::Decode("Missing attestation 'fmt'".into())),
    };
    let auth_data = match map_get(&map, "authData") {
        Some(CborValue::Bytes(data)) => data.clone(),
        _ => return Err(WebauthnError::Decode("Missing attestation 'authData'".into())),
    };
    let att_stmt = match map_get(&map, "attStmt") {
        Some(CborValue::Map(stmt)) => stmt.clone(),
        _ => return Err(WebauthnError::Decode("Missing attestation 'attStmt'".into())),
    };

    tracing::debug!(
        "Attestation format: {}, authData: {} bytes, attStmt: {} entries",
        fmt,
        auth_data.len(),
        att_stmt.len()
    );
    Ok(AttestationObject {
        fmt,
        auth_data,
        att_stmt,
    })
}

impl RelyingParty {
    /// Verifies a registration response.
    ///
    /// # Arguments
    /// * `response` - The credential returned by `navigator.credentials.create()`
    /// * `expected_challenge` - The challenge issued for this ceremony
    ///
    /// # Returns
    /// * `verified: true` with the credential to store, or
    /// * `verified: false` with no info when the attestation signature does
    ///   not verify
    ///
    /// # Errors
    /// Every other failed check aborts with the corresponding
    /// [`WebauthnError`]; see [`WebauthnError::kind`] for grouping.
    pub async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected_challenge: &ExpectedChallenge,
    ) -> Result<VerifiedRegistration, WebauthnError> {
        let client_data_json = decode_field(&response.response.client_data_json, "clientDataJSON")?;
        validate_client_data(
            &client_data_json,
            ClientDataType::Create,
            expected_challenge,
            &self.config.origins,
        )?;

        let attestation_object =
            decode_field(&response.response.attestation_object, "attestationObject")?;
        let att_obj = parse_attestation_object(&attestation_object)?;
        let format = AttestationFormat::try_from(att_obj.fmt.as_str())?;

        let auth_data = parse_authenticator_data(&att_obj.auth_data)?;
        self.check_authenticator_data(&auth_data)?;

        let attested = auth_data.attested.as_ref().ok_or_else(|| {
            tracing::error!("Registration authenticator data has no attested credential data");
            WebauthnError::CredentialMismatch("No attested credential data".into())
        })?;

        let raw_id = decode_credential_id(&response.type_, &response.id, &response.raw_id)?;
        if raw_id != attested.credential_id {
            tracing::error!("Credential ID in authenticator data does not match rawId");
            return Err(WebauthnError::CredentialMismatch(
                "Credential ID in authenticator data does not match rawId".into(),
            ));
        }

        let credential_algorithm = attested.credential_public_key.alg();
        if !self.config.supported_algorithms.contains(&credential_algorithm) {
            tracing::error!("Credential algorithm {} is not accepted", credential_algorithm);
            return Err(WebauthnError::CredentialMismatch(format!(
                "Credential algorithm {credential_algorithm} is not accepted"
            )));
        }

        let aaguid = attested.aaguid_uuid();
        let metadata = self.lookup_metadata(&aaguid).await?;

        let input = VerifierInput {
            aaguid: attested.aaguid,
            att_stmt: &att_obj.att_stmt,
            auth_data_bytes: &att_obj.auth_data,
            rp_id_hash: auth_data.rp_id_hash,
            client_data_hash: sha256(&client_data_json),
            credential_id: &attested.credential_id,
            credential_public_key: &attested.credential_public_key,
            trust: TrustContext {
                metadata: metadata.as_ref(),
                anchors: self.anchors.get(format),
                revocation: self.revocation.as_ref(),
                safetynet: self.config.safetynet.clone(),
                now: chrono::Utc::now(),
            },
        };

        if !verify_attestation(format, &input)? {
            return Ok(VerifiedRegistration {
                verified: false,
                info: None,
            });
        }
        let attestation_type = format.verifier().attestation_type(&input);

        tracing::debug!(
            "Registration verified: fmt={}, type={:?}, aaguid={}",
            format,
            attestation_type,
            aaguid
        );

        Ok(VerifiedRegistration {
            verified: true,
            info: Some(RegistrationInfo {
                fmt: format,
                attestation_type,
                aaguid,
                credential_id: attested.credential_id.clone(),
                credential_public_key: attested.credential_public_key_bytes.clone(),
                credential_algorithm,
                counter: auth_data.counter,
                user_verified: auth_data.flags.user_verified,
                credential_backed_up: auth_data.flags.backup_state,
                credential_device_type: CredentialDeviceType::from_flags(&auth_data.flags),
                attestation_object,
                extensions: auth_data.extensions.clone(),
            }),
        })
    }

    /// Metadata for `aaguid`, bounded by the configured timeout.
    async fn lookup_metadata(
        &self,
        aaguid: &uuid::Uuid,
    ) -> Result<Option<MetadataStatement>, WebauthnError> {
        let statement = tokio::time::timeout(self.config.metadata_timeout, self.metadata.get(aaguid))
            .await
            .map_err(|_| {
                tracing::error!("Metadata lookup for {} timed out", aaguid);
                WebauthnError::Metadata("lookup timed out".to_string())
            })?;

        match &statement {
            Some(s) => tracing::debug!("Metadata found for {}: {}", aaguid, s.description),
            None if !aaguid.is_nil() => {
                tracing::warn!("No metadata statement for AAGUID {}", aaguid);
            }
            None => {}
        }
        Ok(statement)
    }
}
