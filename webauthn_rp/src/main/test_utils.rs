//! Test helpers shared by the unit tests: ring-generated keys, an
//! authenticator data builder and attestation verifier inputs.

use chrono::Utc;
use ciborium::value::Value as CborValue;
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, ECDSA_P384_SHA384_ASN1_SIGNING, EcdsaKeyPair, Ed25519KeyPair,
    KeyPair, RSA_PKCS1_SHA256, RSA_PKCS1_SHA384, RSA_PKCS1_SHA512, RSA_PSS_SHA256, RSA_PSS_SHA384,
    RSA_PSS_SHA512, RsaEncoding, RsaKeyPair, RsaPublicKeyComponents,
};

use crate::config::SafetyNetPolicy;

use super::attestation::{TrustContext, VerifierInput};
use super::cbor::{CborMap, encode_cbor};
use super::cose::{CoseAlgorithm, CoseCurve, CoseKey};
use super::metadata::NoRevocation;

/// RSA-2048 PKCS#8 key; ring cannot generate RSA keys.
pub(crate) const RSA_PKCS8: &[u8] = include_bytes!("../../testdata/rsa2048.pk8");

/// RSASSA-PKCS1-v1_5 SHA-1 signature of [`RS1_MESSAGE`] under [`RSA_PKCS8`],
/// made with openssl since ring does not sign with SHA-1.
pub(crate) const RS1_SIGNATURE: &[u8] = include_bytes!("../../testdata/rsa2048_rs1.sig");
pub(crate) const RS1_MESSAGE: &[u8] = b"legacy TPM attestation over SHA-1";

enum Signer {
    Ecdsa(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
    Rsa(RsaKeyPair, &'static dyn RsaEncoding),
    /// Public half only
    Verify,
}

/// A freshly generated key pair together with its COSE public key.
pub(crate) struct TestKey {
    pub cose: CoseKey,
    signer: Signer,
}

impl TestKey {
    fn ecdsa(
        signing: &'static ring::signature::EcdsaSigningAlgorithm,
        alg: CoseAlgorithm,
        crv: CoseCurve,
    ) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(signing, &rng).unwrap();
        let key_pair = EcdsaKeyPair::from_pkcs8(signing, pkcs8.as_ref(), &rng).unwrap();
        let point = key_pair.public_key().as_ref().to_vec();
        let len = crv.coordinate_len();
        Self {
            cose: CoseKey::Ec2 {
                alg,
                crv,
                x: point[1..1 + len].to_vec(),
                y: point[1 + len..].to_vec(),
            },
            signer: Signer::Ecdsa(key_pair),
        }
    }

    pub fn p256() -> Self {
        Self::ecdsa(&ECDSA_P256_SHA256_ASN1_SIGNING, CoseAlgorithm::ES256, CoseCurve::P256)
    }

    pub fn p384() -> Self {
        Self::ecdsa(&ECDSA_P384_SHA384_ASN1_SIGNING, CoseAlgorithm::ES384, CoseCurve::P384)
    }

    pub fn ed25519() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        Self {
            cose: CoseKey::Okp {
                alg: CoseAlgorithm::EdDSA,
                crv: CoseCurve::Ed25519,
                x: key_pair.public_key().as_ref().to_vec(),
            },
            signer: Signer::Ed25519(key_pair),
        }
    }

    /// The checked-in RSA key under `alg`. RS1 keys can only verify
    /// [`RS1_SIGNATURE`].
    pub fn rsa(alg: CoseAlgorithm) -> Self {
        let key_pair = RsaKeyPair::from_pkcs8(RSA_PKCS8).unwrap();
        let public = RsaPublicKeyComponents::<Vec<u8>>::from(key_pair.public());
        let cose = CoseKey::Rsa {
            alg,
            n: public.n,
            e: public.e,
        };
        let padding: &'static dyn RsaEncoding = match alg {
            CoseAlgorithm::RS256 => &RSA_PKCS1_SHA256,
            CoseAlgorithm::RS384 => &RSA_PKCS1_SHA384,
            CoseAlgorithm::RS512 => &RSA_PKCS1_SHA512,
            CoseAlgorithm::PS256 => &RSA_PSS_SHA256,
            CoseAlgorithm::PS384 => &RSA_PSS_SHA384,
            CoseAlgorithm::PS512 => &RSA_PSS_SHA512,
            _ => {
                return Self {
                    cose,
                    signer: Signer::Verify,
                };
            }
        };
        Self {
            cose,
            signer: Signer::Rsa(key_pair, padding),
        }
    }

    /// DER signature for ECDSA keys, raw 64 bytes for Ed25519, modulus-sized
    /// for RSA.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.signer {
            Signer::Ecdsa(key_pair) => key_pair
                .sign(&SystemRandom::new(), message)
                .unwrap()
                .as_ref()
                .to_vec(),
            Signer::Ed25519(key_pair) => key_pair.sign(message).as_ref().to_vec(),
            Signer::Rsa(key_pair, padding) => {
                let mut signature = vec![0u8; key_pair.public().modulus_len()];
                key_pair
                    .sign(*padding, &SystemRandom::new(), message, &mut signature)
                    .unwrap();
                signature
            }
            Signer::Verify => panic!("{} test key cannot sign", self.cose.alg()),
        }
    }

    pub fn cose_bytes(&self) -> Vec<u8> {
        encode_cbor(&self.cose.to_cbor()).unwrap()
    }
}

pub(crate) fn flip_bit(bytes: &[u8], bit: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out[bit / 8] ^= 1 << (bit % 8);
    out
}

pub(crate) fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Builds authenticator data byte strings.
pub(crate) struct AuthDataBuilder {
    rp_id_hash: Vec<u8>,
    flags: u8,
    counter: u32,
    attested: Option<([u8; 16], Vec<u8>, Vec<u8>)>,
    extensions: Option<CborValue>,
}

impl AuthDataBuilder {
    pub fn new(rp_id: &str) -> Self {
        Self {
            rp_id_hash: sha256(rp_id.as_bytes()),
            flags: 0x01,
            counter: 0,
            attested: None,
            extensions: None,
        }
    }

    pub fn counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    fn set_flag(mut self, bit: u8, on: bool) -> Self {
        if on {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
        self
    }

    pub fn user_present(self, on: bool) -> Self {
        self.set_flag(1 << 0, on)
    }

    pub fn user_verified(self, on: bool) -> Self {
        self.set_flag(1 << 2, on)
    }

    pub fn attested(mut self, aaguid: [u8; 16], credential_id: Vec<u8>, key: &CoseKey) -> Self {
        self.attested = Some((aaguid, credential_id, encode_cbor(&key.to_cbor()).unwrap()));
        self.set_flag(1 << 6, true)
    }

    pub fn extensions(mut self, extensions: CborValue) -> Self {
        self.extensions = Some(extensions);
        self.set_flag(1 << 7, true)
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = self.rp_id_hash;
        out.push(self.flags);
        out.extend_from_slice(&self.counter.to_be_bytes());
        if let Some((aaguid, credential_id, key_bytes)) = self.attested {
            out.extend_from_slice(&aaguid);
            out.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
            out.extend_from_slice(&credential_id);
            out.extend_from_slice(&key_bytes);
        }
        if let Some(extensions) = self.extensions {
            out.extend_from_slice(&encode_cbor(&extensions).unwrap());
        }
        out
    }
}

/// Registration material for driving a single attestation verifier.
pub(crate) struct VerifierFixture {
    pub key: TestKey,
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub auth_data: Vec<u8>,
    pub client_data_hash: [u8; 32],
    pub att_stmt: CborMap,
    pub anchors: Vec<Vec<u8>>,
}

impl VerifierFixture {
    pub fn new(key: TestKey, aaguid: [u8; 16]) -> Self {
        let credential_id = vec![0xC0, 0xFF, 0xEE];
        let auth_data = AuthDataBuilder::new("example.com")
            .attested(aaguid, credential_id.clone(), &key.cose)
            .build();
        let mut client_data_hash = [0u8; 32];
        client_data_hash.copy_from_slice(&sha256(b"{\"type\":\"webauthn.create\"}"));
        Self {
            key,
            aaguid,
            credential_id,
            auth_data,
            client_data_hash,
            att_stmt: Vec::new(),
            anchors: Vec::new(),
        }
    }

    pub fn p256(att_stmt: CborMap) -> Self {
        Self::new(TestKey::p256(), [0u8; 16]).with_stmt(att_stmt)
    }

    pub fn with_stmt(mut self, att_stmt: CborMap) -> Self {
        self.att_stmt = att_stmt;
        self
    }

    /// `authenticatorData || clientDataHash`
    pub fn signed_data(&self) -> Vec<u8> {
        let mut out = self.auth_data.clone();
        out.extend_from_slice(&self.client_data_hash);
        out
    }

    pub fn input(&self) -> VerifierInput<'_> {
        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&self.auth_data[..32]);
        VerifierInput {
            aaguid: self.aaguid,
            att_stmt: &self.att_stmt,
            auth_data_bytes: &self.auth_data,
            rp_id_hash,
            client_data_hash: self.client_data_hash,
            credential_id: &self.credential_id,
            credential_public_key: &self.key.cose,
            trust: TrustContext {
                metadata: None,
                anchors: self.anchors.clone(),
                revocation: &NoRevocation,
                safetynet: SafetyNetPolicy::default(),
                now: Utc::now(),
            },
        }
    }
}

pub(crate) fn text_entry(key: &str, value: CborValue) -> (CborValue, CborValue) {
    (CborValue::Text(key.to_string()), value)
}

/// DER writers for building extension and signature inputs.
pub(crate) mod der {
    use std::borrow::Cow;

    pub(crate) use x509_parser::asn1_rs::{Class, Tag};
    use x509_parser::asn1_rs::{Any, Header, Integer, Length, Sequence, ToDer};

    pub(crate) fn encode_tagged(class: Class, constructed: bool, tag: u32, value: &[u8]) -> Vec<u8> {
        let header = Header::new(class, constructed, Tag(tag), Length::Definite(value.len()));
        Any::new(header, value).to_der_vec().unwrap()
    }

    pub(crate) fn encode_tlv(tag: Tag, value: &[u8]) -> Vec<u8> {
        let constructed = matches!(tag, Tag::Sequence | Tag::Set);
        encode_tagged(Class::Universal, constructed, tag.0, value)
    }

    pub(crate) fn encode_sequence(items: &[Vec<u8>]) -> Vec<u8> {
        Sequence::new(Cow::Owned(items.concat())).to_der_vec().unwrap()
    }

    /// Non-negative INTEGER from a big-endian magnitude.
    pub(crate) fn encode_integer(magnitude: &[u8]) -> Vec<u8> {
        let start = magnitude.iter().position(|&b| b != 0).unwrap_or(magnitude.len());
        let mut content = magnitude[start..].to_vec();
        if content.first().is_none_or(|&b| b & 0x80 != 0) {
            content.insert(0, 0x00);
        }
        Integer::new(&content).to_der_vec().unwrap()
    }
}
