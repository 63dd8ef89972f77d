mod android_key;
mod android_safetynet;
mod apple;
mod core;
mod none;
mod packed;
mod tpm;
mod u2f;
mod utils;

pub use self::core::{
    AttestationFormat, AttestationType, AttestationVerifier, TrustContext, VerifierInput,
    verify_attestation,
};
