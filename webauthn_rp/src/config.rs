use std::{env, time::Duration};

use crate::errors::WebauthnError;
use crate::main::CoseAlgorithm;

const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SAFETYNET_WINDOW_SECS: u64 = 60;

/// Whether ceremonies require the User Verified flag.
///
/// Only `Required` changes verification; `Preferred` and `Discouraged` are
/// carried for callers that echo the policy into ceremony options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserVerification {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl UserVerification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }

    pub fn is_required(self) -> bool {
        self == Self::Required
    }

    fn from_env_value(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "required" => Self::Required,
            "preferred" => Self::Preferred,
            "discouraged" => Self::Discouraged,
            invalid => {
                tracing::warn!(
                    "Invalid user verification: {}. Using default 'preferred'",
                    invalid
                );
                Self::Preferred
            }
        }
    }
}

/// Freshness policy for SafetyNet attestation payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyNetPolicy {
    /// Accepted distance between `timestampMs` and the verification time
    pub window: Duration,
    pub verify_timestamp: bool,
}

impl Default for SafetyNetPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_SAFETYNET_WINDOW_SECS),
            verify_timestamp: true,
        }
    }
}

/// Relying party settings shared by registration and authentication.
#[derive(Debug, Clone)]
pub struct RpConfig {
    /// Accepted RP IDs; the authenticator's rpIdHash must match one of them
    pub rp_ids: Vec<String>,
    /// Accepted `clientDataJSON.origin` values
    pub origins: Vec<String>,
    pub user_verification: UserVerification,
    /// Credential algorithms accepted at registration
    pub supported_algorithms: Vec<CoseAlgorithm>,
    /// Upper bound on a metadata lookup
    pub metadata_timeout: Duration,
    pub safetynet: SafetyNetPolicy,
}

/// Every algorithm with a working verifier, in preference order.
fn default_algorithms() -> Vec<CoseAlgorithm> {
    vec![
        CoseAlgorithm::ES256,
        CoseAlgorithm::EdDSA,
        CoseAlgorithm::ES384,
        CoseAlgorithm::PS256,
        CoseAlgorithm::PS384,
        CoseAlgorithm::PS512,
        CoseAlgorithm::RS256,
        CoseAlgorithm::RS384,
        CoseAlgorithm::RS512,
        CoseAlgorithm::RS1,
    ]
}

impl RpConfig {
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            rp_ids: vec![rp_id.into()],
            origins: vec![origin.into()],
            user_verification: UserVerification::default(),
            supported_algorithms: default_algorithms(),
            metadata_timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
            safetynet: SafetyNetPolicy::default(),
        }
    }

    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_ids.push(rp_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    pub fn with_user_verification(mut self, user_verification: UserVerification) -> Self {
        self.user_verification = user_verification;
        self
    }

    pub fn with_supported_algorithms(mut self, algorithms: Vec<CoseAlgorithm>) -> Self {
        self.supported_algorithms = algorithms;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn with_safetynet_policy(mut self, policy: SafetyNetPolicy) -> Self {
        self.safetynet = policy;
        self
    }

    /// Builds the configuration from the environment, after loading `.env`
    /// if one exists.
    ///
    /// # Errors
    /// * `WebauthnError::Config` if `ORIGIN` is missing or empty, or no RP ID
    ///   can be derived from it
    pub fn from_env() -> Result<Self, WebauthnError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }

        let origins = env::var("ORIGIN")
            .map(|v| split_list(&v))
            .unwrap_or_default();
        let Some(first_origin) = origins.first() else {
            tracing::error!("ORIGIN must be set");
            return Err(WebauthnError::Config("ORIGIN must be set".to_string()));
        };

        let rp_ids = match env::var("PASSKEY_RP_ID") {
            Ok(v) if !v.trim().is_empty() => split_list(&v),
            _ => vec![rp_id_from_origin(first_origin)?],
        };

        let user_verification = env::var("PASSKEY_USER_VERIFICATION")
            .map_or(UserVerification::default(), |v| {
                UserVerification::from_env_value(&v)
            });

        let metadata_timeout = Duration::from_secs(env_u64(
            "PASSKEY_METADATA_TIMEOUT",
            DEFAULT_METADATA_TIMEOUT_SECS,
        ));

        let safetynet = SafetyNetPolicy {
            window: Duration::from_secs(env_u64(
                "PASSKEY_SAFETYNET_WINDOW",
                DEFAULT_SAFETYNET_WINDOW_SECS,
            )),
            verify_timestamp: env::var("PASSKEY_SAFETYNET_VERIFY_TIMESTAMP")
                .map(|v| v.parse::<bool>().unwrap_or(true))
                .unwrap_or(true),
        };

        tracing::debug!("RP IDs: {:?}, origins: {:?}", rp_ids, origins);
        Ok(Self {
            rp_ids,
            origins,
            user_verification,
            supported_algorithms: default_algorithms(),
            metadata_timeout,
            safetynet,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .map(|v| v.parse::<u64>().unwrap_or(default))
        .unwrap_or(default)
}

/// Host part of an origin, e.g. `https://example.com:8443` → `example.com`.
fn rp_id_from_origin(origin: &str) -> Result<String, WebauthnError> {
    let url = url::Url::parse(origin)
        .map_err(|e| WebauthnError::Config(format!("Invalid ORIGIN '{origin}': {e}")))?;
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| WebauthnError::Config(format!("Could not extract RP ID from '{origin}'")))
}
