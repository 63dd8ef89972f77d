//! Software authenticator and attestation statement builders
//!
//! Every fixture is generated at test time: keys come from ring, and the
//! statements are signed the way the corresponding authenticator family
//! signs them.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use webauthn_rp::{
    AuthenticationResponse, AuthenticatorAssertionResponse, AuthenticatorAttestationResponse,
    CoseKey, RegistrationResponse, RelyingParty, RpConfig, StoredCredential, base64url_encode,
    encode_cbor,
};

use super::certificates::{CertificateBuilder, RsaSigningKey, SigningKey, TestCa, oids};
use super::der::{Class, Tag, encode_integer, encode_sequence, encode_tagged, encode_tlv};
use super::constants::{ORIGIN, RP_ID, SAFETYNET_HOSTNAME, TYPE_CREATE, flags, tpm};

pub type AttStmt = Vec<(CborValue, CborValue)>;

pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

fn text(key: &str) -> CborValue {
    CborValue::Text(key.to_string())
}

fn int(value: i64) -> CborValue {
    CborValue::Integer(Integer::from(value))
}

pub fn relying_party() -> RelyingParty {
    RelyingParty::new(RpConfig::new(RP_ID, ORIGIN))
}

pub fn client_data_json(type_: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": type_,
        "challenge": base64url_encode(challenge),
        "origin": origin,
        "crossOrigin": false
    })
    .to_string()
    .into_bytes()
}

/// A software authenticator holding one ES256 credential, or an RS256
/// credential once [`TestAuthenticator::with_rsa_credential`] is applied.
pub struct TestAuthenticator {
    pub key: SigningKey,
    pub rsa_key: Option<RsaSigningKey>,
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub flags: u8,
}

impl TestAuthenticator {
    pub fn new(aaguid: [u8; 16]) -> Self {
        let key = SigningKey::generate();
        let credential_id = sha256(&key.public_point())[..16].to_vec();
        Self {
            key,
            rsa_key: None,
            aaguid,
            credential_id,
            flags: flags::UP,
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_rsa_credential(mut self) -> Self {
        self.rsa_key = Some(RsaSigningKey::load());
        self
    }

    pub fn cose_key(&self) -> CoseKey {
        match &self.rsa_key {
            Some(rsa) => rsa.cose_key(),
            None => self.key.cose_key(),
        }
    }

    /// Signature by the credential key
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.rsa_key {
            Some(rsa) => rsa.sign(message),
            None => self.key.sign(message),
        }
    }

    pub fn credential_public_key(&self) -> Vec<u8> {
        encode_cbor(&self.cose_key().to_cbor()).expect("Failed to encode COSE key")
    }

    /// Authenticator data for a registration: AT set, counter zero.
    pub fn attested_auth_data(&self, rp_id: &str) -> Vec<u8> {
        let mut out = sha256(rp_id.as_bytes());
        out.push(self.flags | flags::AT);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&self.aaguid);
        out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&self.credential_public_key());
        out
    }

    pub fn assertion_auth_data(&self, rp_id: &str, counter: u32) -> Vec<u8> {
        let mut out = sha256(rp_id.as_bytes());
        out.push(self.flags);
        out.extend_from_slice(&counter.to_be_bytes());
        out
    }

    /// Signs an assertion over `authenticatorData || SHA-256(clientDataJSON)`.
    pub fn assert(
        &self,
        auth_data: &[u8],
        client_data_json: &[u8],
        user_handle: Option<&[u8]>,
    ) -> AuthenticationResponse {
        let mut signed = auth_data.to_vec();
        signed.extend_from_slice(&sha256(client_data_json));
        let signature = self.sign(&signed);
        AuthenticationResponse {
            id: base64url_encode(&self.credential_id),
            raw_id: base64url_encode(&self.credential_id),
            response: AuthenticatorAssertionResponse {
                client_data_json: base64url_encode(client_data_json),
                authenticator_data: base64url_encode(auth_data),
                signature: base64url_encode(signature),
                user_handle: user_handle.map(base64url_encode),
            },
            type_: "public-key".to_string(),
        }
    }

    pub fn stored_credential(&self, counter: u32, user_handle: Option<&[u8]>) -> StoredCredential {
        StoredCredential {
            credential_id: self.credential_id.clone(),
            public_key: self.credential_public_key(),
            counter,
            user_handle: user_handle.map(<[u8]>::to_vec),
            transports: vec!["usb".to_string()],
        }
    }
}

/// The inputs every attestation statement is computed from.
pub struct Registration {
    pub auth_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
}

impl Registration {
    pub fn new(authenticator: &TestAuthenticator, challenge: &[u8]) -> Self {
        Self {
            auth_data: authenticator.attested_auth_data(RP_ID),
            client_data_json: client_data_json(TYPE_CREATE, challenge, ORIGIN),
        }
    }

    pub fn client_data_hash(&self) -> Vec<u8> {
        sha256(&self.client_data_json)
    }

    /// `authenticatorData || clientDataHash`
    pub fn signed_data(&self) -> Vec<u8> {
        let mut out = self.auth_data.clone();
        out.extend_from_slice(&self.client_data_hash());
        out
    }

    pub fn response(
        &self,
        authenticator: &TestAuthenticator,
        fmt: &str,
        att_stmt: AttStmt,
    ) -> RegistrationResponse {
        let attestation_object = CborValue::Map(vec![
            (text("fmt"), text(fmt)),
            (text("attStmt"), CborValue::Map(att_stmt)),
            (text("authData"), CborValue::Bytes(self.auth_data.clone())),
        ]);
        let attestation_object =
            encode_cbor(&attestation_object).expect("Failed to encode attestation object");
        RegistrationResponse {
            id: base64url_encode(&authenticator.credential_id),
            raw_id: base64url_encode(&authenticator.credential_id),
            response: AuthenticatorAttestationResponse {
                client_data_json: base64url_encode(&self.client_data_json),
                attestation_object: base64url_encode(attestation_object),
                transports: vec!["usb".to_string()],
            },
            type_: "public-key".to_string(),
        }
    }
}

fn x5c(certs: &[&[u8]]) -> CborValue {
    CborValue::Array(certs.iter().map(|c| CborValue::Bytes(c.to_vec())).collect())
}

/// `packed` self attestation: the credential key signs.
pub fn packed_self_statement(authenticator: &TestAuthenticator, reg: &Registration) -> AttStmt {
    vec![
        (text("alg"), int(-7)),
        (text("sig"), CborValue::Bytes(authenticator.key.sign(&reg.signed_data()))),
    ]
}

/// `packed` full attestation with an attestation certificate issued by `ca`.
pub fn packed_full_statement(
    authenticator: &TestAuthenticator,
    reg: &Registration,
    ca: &TestCa,
) -> AttStmt {
    let attestation_key = SigningKey::generate();
    let cert = ca.issue(
        CertificateBuilder::new(&[
            (oids::COUNTRY, "US"),
            (oids::ORGANIZATION, "Test Authenticators Inc"),
            (oids::ORGANIZATIONAL_UNIT, "Authenticator Attestation"),
            (oids::COMMON_NAME, "Test Authenticator Batch 1"),
        ])
        .aaguid(&authenticator.aaguid),
        &attestation_key,
    );
    vec![
        (text("alg"), int(-7)),
        (text("sig"), CborValue::Bytes(attestation_key.sign(&reg.signed_data()))),
        (text("x5c"), x5c(&[&cert])),
    ]
}

/// `fido-u2f` with a self-signed attestation certificate.
pub fn u2f_statement(authenticator: &TestAuthenticator, reg: &Registration) -> AttStmt {
    let attestation_key = SigningKey::generate();
    let cert = CertificateBuilder::new(&[(oids::COMMON_NAME, "U2F Test Token")])
        .self_signed(&attestation_key);

    let mut verification_data = vec![0x00];
    verification_data.extend_from_slice(&sha256(RP_ID.as_bytes()));
    verification_data.extend_from_slice(&reg.client_data_hash());
    verification_data.extend_from_slice(&authenticator.credential_id);
    verification_data.extend_from_slice(&authenticator.key.public_point());

    vec![
        (text("sig"), CborValue::Bytes(attestation_key.sign(&verification_data))),
        (text("x5c"), x5c(&[&cert])),
    ]
}

fn tpm_sized(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(data);
    out
}

/// `TPMT_PUBLIC` for an ECC P-256 key with SHA-256 as name algorithm
pub fn tpm_ecc_pub_area(point: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0023u16.to_be_bytes()); // TPM_ALG_ECC
    out.extend_from_slice(&0x000Bu16.to_be_bytes()); // nameAlg SHA-256
    out.extend_from_slice(&0x0006_0472u32.to_be_bytes()); // objectAttributes
    out.extend_from_slice(&tpm_sized(&[])); // authPolicy
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric NULL
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme NULL
    out.extend_from_slice(&0x0003u16.to_be_bytes()); // TPM_ECC_NIST_P256
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // kdf NULL
    out.extend_from_slice(&tpm_sized(&point[1..33]));
    out.extend_from_slice(&tpm_sized(&point[33..65]));
    out
}

/// `TPMT_PUBLIC` for an RSA key with the default exponent and SHA-256 as
/// name algorithm
pub fn tpm_rsa_pub_area(modulus: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0001u16.to_be_bytes()); // TPM_ALG_RSA
    out.extend_from_slice(&0x000Bu16.to_be_bytes()); // nameAlg SHA-256
    out.extend_from_slice(&0x0006_0472u32.to_be_bytes()); // objectAttributes
    out.extend_from_slice(&tpm_sized(&[])); // authPolicy
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric NULL
    out.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme NULL
    out.extend_from_slice(&((modulus.len() * 8) as u16).to_be_bytes()); // keyBits
    out.extend_from_slice(&0u32.to_be_bytes()); // exponent, 0 for 65537
    out.extend_from_slice(&tpm_sized(modulus));
    out
}

/// `TPMS_ATTEST` certifying `pub_area`
pub fn tpm_cert_info(extra_data: &[u8], pub_area: &[u8]) -> Vec<u8> {
    let mut name = 0x000Bu16.to_be_bytes().to_vec();
    name.extend_from_slice(&sha256(pub_area));

    let mut out = Vec::new();
    out.extend_from_slice(&0xFF54_4347u32.to_be_bytes()); // TPM_GENERATED_VALUE
    out.extend_from_slice(&0x8017u16.to_be_bytes()); // TPM_ST_ATTEST_CERTIFY
    out.extend_from_slice(&tpm_sized(b"qualified-signer"));
    out.extend_from_slice(&tpm_sized(extra_data));
    out.extend_from_slice(&[0u8; 17]); // clockInfo
    out.extend_from_slice(&0x0002_0000_0000_0000u64.to_be_bytes()); // firmwareVersion
    out.extend_from_slice(&tpm_sized(&name));
    out.extend_from_slice(&tpm_sized(&[]));
    out
}

/// `tpm` attestation by an AIK certified by `ca`. `extra_data` overrides the
/// certified `extraData`, which is otherwise `SHA-256(authData || clientDataHash)`.
pub fn tpm_statement(
    authenticator: &TestAuthenticator,
    reg: &Registration,
    ca: &TestCa,
    extra_data: Option<Vec<u8>>,
) -> AttStmt {
    let aik = SigningKey::generate();
    let aik_cert = ca.issue(
        CertificateBuilder::empty_subject()
            .directory_name(&[
                (oids::TCG_AT_TPM_MANUFACTURER, tpm::MANUFACTURER),
                (oids::TCG_AT_TPM_MODEL, tpm::MODEL),
                (oids::TCG_AT_TPM_VERSION, tpm::VERSION),
            ])
            .extended_key_usage(&[oids::TCG_KP_AIK_CERTIFICATE])
            .aaguid(&authenticator.aaguid),
        &aik,
    );

    let pub_area = match &authenticator.rsa_key {
        Some(rsa) => tpm_rsa_pub_area(&rsa.modulus()),
        None => tpm_ecc_pub_area(&authenticator.key.public_point()),
    };
    let extra_data = extra_data.unwrap_or_else(|| sha256(&reg.signed_data()));
    let cert_info = tpm_cert_info(&extra_data, &pub_area);

    vec![
        (text("ver"), text("2.0")),
        (text("alg"), int(-7)),
        (text("x5c"), x5c(&[&aik_cert, &ca.cert])),
        (text("sig"), CborValue::Bytes(aik.sign(&cert_info))),
        (text("certInfo"), CborValue::Bytes(cert_info)),
        (text("pubArea"), CborValue::Bytes(pub_area)),
    ]
}

/// Android `KeyDescription` for a TEE-generated signing key.
pub fn android_key_description(challenge: &[u8]) -> Vec<u8> {
    let purpose = encode_tagged(
        Class::ContextSpecific,
        true,
        1,
        &encode_tlv(Tag::Set, &encode_integer(&[2])),
    );
    let origin = encode_tagged(Class::ContextSpecific, true, 702, &encode_integer(&[0]));
    encode_sequence(&[
        encode_integer(&[3]),
        encode_tlv(Tag::Enumerated, &[1]),
        encode_integer(&[4]),
        encode_tlv(Tag::Enumerated, &[1]),
        encode_tlv(Tag::OctetString, challenge),
        encode_tlv(Tag::OctetString, &[]),
        encode_sequence(&[]),
        encode_sequence(&[purpose, origin]),
    ])
}

/// `android-key`: the leaf certifies the credential key itself.
pub fn android_key_statement(
    authenticator: &TestAuthenticator,
    reg: &Registration,
    ca: &TestCa,
    challenge: &[u8],
) -> AttStmt {
    let leaf = ca.issue(
        CertificateBuilder::new(&[(oids::COMMON_NAME, "Android Keystore Key")]).extension(
            oids::ANDROID_KEY_DESCRIPTION,
            false,
            &android_key_description(challenge),
        ),
        &authenticator.key,
    );
    vec![
        (text("alg"), int(-7)),
        (text("sig"), CborValue::Bytes(authenticator.key.sign(&reg.signed_data()))),
        (text("x5c"), x5c(&[&leaf, &ca.cert])),
    ]
}

/// `apple`: a per-credential certificate whose nonce binds the registration.
pub fn apple_statement(authenticator: &TestAuthenticator, reg: &Registration, ca: &TestCa) -> AttStmt {
    let nonce = sha256(&reg.signed_data());
    let extension = encode_sequence(&[encode_tagged(
        Class::ContextSpecific,
        true,
        1,
        &encode_tlv(Tag::OctetString, &nonce),
    )]);
    let leaf = ca.issue(
        CertificateBuilder::new(&[(oids::COMMON_NAME, "Apple Credential Key")]).extension(
            oids::APPLE_NONCE,
            false,
            &extension,
        ),
        &authenticator.key,
    );
    vec![
        (text("alg"), int(-7)),
        (text("x5c"), x5c(&[&leaf, &ca.cert])),
    ]
}

/// `android-safetynet`: an ES256 JWS whose leaf is issued to
/// `attest.android.com` by `ca`.
pub fn safetynet_statement(reg: &Registration, ca: &TestCa, timestamp_ms: i64) -> AttStmt {
    safetynet_statement_signed(reg, ca, timestamp_ms, "ES256", |leaf_key, signing_input| {
        leaf_key.sign_fixed(signing_input)
    })
}

/// `android-safetynet` with the header `alg` and the signature supplied by
/// the caller. `sign` gets the leaf key and the JWS signing input.
pub fn safetynet_statement_signed(
    reg: &Registration,
    ca: &TestCa,
    timestamp_ms: i64,
    alg: &str,
    sign: impl FnOnce(&SigningKey, &[u8]) -> Vec<u8>,
) -> AttStmt {
    let signing_key = SigningKey::generate();
    let leaf = ca.issue(
        CertificateBuilder::new(&[
            (oids::COUNTRY, "US"),
            (oids::ORGANIZATION, "Google LLC"),
            (oids::COMMON_NAME, SAFETYNET_HOSTNAME),
        ]),
        &signing_key,
    );

    let header = serde_json::json!({
        "alg": alg,
        "x5c": [STANDARD.encode(&leaf), STANDARD.encode(&ca.cert)],
    });
    let payload = serde_json::json!({
        "nonce": STANDARD.encode(sha256(&reg.signed_data())),
        "timestampMs": timestamp_ms,
        "apkPackageName": "com.google.android.gms",
        "apkCertificateDigestSha256": [],
        "ctsProfileMatch": true,
        "basicIntegrity": true,
    });
    let signing_input = format!(
        "{}.{}",
        base64url_encode(header.to_string()),
        base64url_encode(payload.to_string())
    );
    let signature = sign(&signing_key, signing_input.as_bytes());
    let token = format!("{signing_input}.{}", base64url_encode(signature));

    vec![
        (text("ver"), text("14366018")),
        (text("response"), CborValue::Bytes(token.into_bytes())),
    ]
}
