pub mod constants;
pub mod der;
pub mod fixtures;

pub use certificates::{CertificateBuilder, RsaSigningKey, SigningKey, TestCa};
pub use constants::*;
pub use fixtures::*;
