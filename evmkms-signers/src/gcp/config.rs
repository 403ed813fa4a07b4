use serde::{Deserialize, Serialize};
use std::path::Path;

use super::KeyVersionName;
use crate::KmsError;

/// Environment variable consulted when the config carries no access token
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Environment variable consulted when the config carries no credential file
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Key ring, key and version of a Cloud KMS key
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpKey {
    /// Key ring id
    #[serde(rename = "Keyring")]
    pub key_ring: String,
    /// Crypto key id
    #[serde(rename = "Name")]
    pub name: String,
    /// Crypto key version
    #[serde(rename = "Version")]
    pub version: String,
}

/// Settings for a [`GcpSigner`](super::GcpSigner), as stored in a JSON config file.
///
/// ```json
/// {
///   "ProjectID": "my-project",
///   "LocationID": "global",
///   "CredentialLocation": "/etc/evmkms/service-account.json",
///   "Key": { "Keyring": "evm", "Name": "deployer", "Version": "1" },
///   "ChainID": 137
/// }
/// ```
///
/// An `AccessToken` takes precedence over the service account key file.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpConfig {
    /// GCP project id
    #[serde(rename = "ProjectID")]
    pub project_id: String,
    /// Location of the key ring
    #[serde(rename = "LocationID")]
    pub location_id: String,
    /// Key to sign with
    #[serde(rename = "Key")]
    pub key: GcpKey,
    /// Chain the signer signs for
    #[serde(rename = "ChainID")]
    pub chain_id: u64,
    /// Service account key file. Falls back to `GOOGLE_APPLICATION_CREDENTIALS` when unset.
    #[serde(rename = "CredentialLocation", default, skip_serializing_if = "Option::is_none")]
    pub credential_location: Option<String>,
    /// OAuth2 access token. Falls back to `GOOGLE_OAUTH_ACCESS_TOKEN` when unset.
    #[serde(rename = "AccessToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Endpoint override
    #[serde(rename = "Endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for GcpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpConfig")
            .field("project_id", &self.project_id)
            .field("location_id", &self.location_id)
            .field("key", &self.key)
            .field("chain_id", &self.chain_id)
            .field("credential_location", &self.credential_location)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GcpConfig {
    /// Reads and validates a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KmsError> {
        let raw = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured access token, or the one from the environment
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok().filter(|token| !token.is_empty()))
    }

    /// The configured service account key file, or the one from the environment
    pub fn credential_location(&self) -> Option<String> {
        self.credential_location
            .clone()
            .filter(|path| !path.is_empty())
            .or_else(|| std::env::var(CREDENTIALS_ENV).ok().filter(|path| !path.is_empty()))
    }

    /// The key version resource this config points at
    pub fn key_version_name(&self) -> KeyVersionName {
        KeyVersionName {
            project: self.project_id.clone(),
            location: self.location_id.clone(),
            key_ring: self.key.key_ring.clone(),
            key: self.key.name.clone(),
            version: self.key.version.clone(),
        }
    }

    /// Checks that every identifier and a credential source are present
    pub fn validate(&self) -> Result<(), KmsError> {
        self.key_version_name().validate()?;
        if self.chain_id == 0 {
            return Err(KmsError::config("empty ChainID"))
        }
        if self.access_token().is_none() && self.credential_location().is_none() {
            return Err(KmsError::config("empty CredentialLocation"))
        }
        Ok(())
    }
}
