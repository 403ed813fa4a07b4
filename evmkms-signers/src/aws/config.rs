use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::KmsError;

/// Settings for an [`AwsSigner`](super::AwsSigner), as stored in a JSON config file.
///
/// Without static credentials the client falls back to rusoto's default credential chain
/// (environment, profile, instance metadata).
///
/// ```json
/// {
///   "KeyID": "5b6d3ab5-2f4c-4c5a-8a0b-0b6a3f2b9f10",
///   "ChainID": 1,
///   "Region": "us-west-2"
/// }
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    /// KMS key id or ARN
    #[serde(rename = "KeyID")]
    pub key_id: String,
    /// Chain the signer signs for
    #[serde(rename = "ChainID")]
    pub chain_id: u64,
    /// AWS region name, e.g. `us-east-1`
    #[serde(rename = "Region", default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Endpoint override, e.g. a local KMS emulator
    #[serde(rename = "Endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Static access key id
    #[serde(rename = "AccessKeyID", default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    /// Static secret access key
    #[serde(rename = "SecretAccessKey", default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    /// Optional session token for temporary credentials
    #[serde(rename = "SessionToken", default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("key_id", &self.key_id)
            .field("chain_id", &self.chain_id)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsConfig {
    /// Reads and validates a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KmsError> {
        let raw = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns true if static credentials are configured
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() || self.secret_access_key.is_some()
    }

    /// Checks that the key id and chain id are set, and that static credentials come with a
    /// region, an access key id and a secret.
    pub fn validate(&self) -> Result<(), KmsError> {
        if self.key_id.is_empty() {
            return Err(KmsError::config("empty KeyID"))
        }
        if self.chain_id == 0 {
            return Err(KmsError::config("empty ChainID"))
        }
        if self.has_static_credentials() {
            if is_blank(&self.region) {
                return Err(KmsError::config("empty Region"))
            }
            if is_blank(&self.access_key_id) {
                return Err(KmsError::config("empty AccessKeyID"))
            }
            if is_blank(&self.secret_access_key) {
                return Err(KmsError::config("empty SecretAccessKey"))
            }
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}
