//! Minimal Cloud KMS v1 REST client covering the calls a signer needs.

use base64::{engine::general_purpose::STANDARD, Engine};
use ethers_core::types::H256;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::{fmt, path::Path, sync::Arc};
use tracing::{debug, instrument, trace};

use crate::KmsError;

/// Public Cloud KMS endpoint
pub const DEFAULT_ENDPOINT: &str = "https://cloudkms.googleapis.com/v1";

/// OAuth2 scope requested for service account tokens
pub const CLOUDKMS_SCOPE: &str = "https://www.googleapis.com/auth/cloudkms";

/// Fully qualified name of a crypto key version
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeyVersionName {
    /// GCP project id
    pub project: String,
    /// Location of the key ring, e.g. `global` or `us-east1`
    pub location: String,
    /// Key ring id
    pub key_ring: String,
    /// Crypto key id
    pub key: String,
    /// Crypto key version
    pub version: String,
}

impl KeyVersionName {
    /// Returns an error naming the first empty component
    pub fn validate(&self) -> Result<(), KmsError> {
        for (value, field) in [
            (&self.project, "ProjectID"),
            (&self.location, "LocationID"),
            (&self.key_ring, "Key.Keyring"),
            (&self.key, "Key.Name"),
            (&self.version, "Key.Version"),
        ] {
            if value.is_empty() {
                return Err(KmsError::config(format!("empty {field}")))
            }
        }
        Ok(())
    }
}

impl fmt::Display for KeyVersionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}/cryptoKeyVersions/{}",
            self.project, self.location, self.key_ring, self.key, self.version
        )
    }
}

/// `projects.locations.keyRings.cryptoKeys.cryptoKeyVersions.getPublicKey` response
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// PEM encoded SubjectPublicKeyInfo
    pub pem: String,
    /// Signing algorithm of the key version
    pub algorithm: String,
    /// CRC32C of `pem`
    #[serde(default, deserialize_with = "deserialize_int64")]
    pub pem_crc32c: Option<u32>,
    /// Key version the key belongs to
    #[serde(default)]
    pub name: Option<String>,
}

/// `projects.locations.keyRings.cryptoKeys.cryptoKeyVersions.asymmetricSign` response
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsymmetricSignResponse {
    /// Base64 encoded DER signature
    pub signature: String,
    /// CRC32C of the decoded signature
    #[serde(default, deserialize_with = "deserialize_int64")]
    pub signature_crc32c: Option<u32>,
    /// Whether the service checked the request's digest checksum
    #[serde(default)]
    pub verified_digest_crc32c: bool,
    /// Key version used for signing
    #[serde(default)]
    pub name: Option<String>,
}

/// A key ring as listed by `projects.locations.keyRings.list`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRing {
    /// Resource name of the key ring
    pub name: String,
    /// Creation time, RFC 3339
    #[serde(default)]
    pub create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListKeyRingsResponse {
    #[serde(default)]
    key_rings: Vec<KeyRing>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AsymmetricSignRequest {
    digest: Digest,
    // int64 values travel as strings in the REST API
    digest_crc32c: String,
}

#[derive(Debug, Serialize)]
struct Digest {
    sha256: String,
}

/// Accepts both the string and the number form of a protobuf int64
fn deserialize_int64<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Str(String),
        Num(u64),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Num(n)) => u32::try_from(n).map(Some).map_err(D::Error::custom),
        Some(Int64::Str(s)) => s.parse::<u32>().map(Some).map_err(D::Error::custom),
    }
}

fn unavailable<E: std::error::Error + Send + Sync + 'static>(err: E) -> KmsError {
    KmsError::ProviderUnavailable(Box::new(err))
}

/// `google.rpc.Status` error body
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ErrorStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Client errors that a retry cannot fix: a missing key, a bad resource name or a key in the
/// wrong state. Authentication, permission and quota errors stay retryable.
fn is_fatal_status(status: StatusCode) -> bool {
    status.is_client_error() &&
        !matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
        )
}

/// Where the bearer token of each request comes from
#[derive(Clone)]
enum Credentials {
    AccessToken(String),
    ServiceAccount(Arc<CustomServiceAccount>),
}

/// Cloud KMS client authenticating with an OAuth2 bearer token, either fixed or minted from a
/// service account key file
#[derive(Clone)]
pub struct GcpKmsClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl fmt::Debug for GcpKmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credentials = match self.credentials {
            Credentials::AccessToken(_) => "access token",
            Credentials::ServiceAccount(_) => "service account",
        };
        f.debug_struct("GcpKmsClient")
            .field("endpoint", &self.endpoint)
            .field("credentials", &credentials)
            .finish()
    }
}

impl GcpKmsClient {
    /// Creates a client for the public Cloud KMS endpoint using a fixed access token
    pub fn new(access_token: impl Into<String>) -> Result<Self, KmsError> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(KmsError::config("empty AccessToken"))
        }
        Self::with_credentials(Credentials::AccessToken(access_token))
    }

    /// Creates a client minting tokens for the `cloudkms` scope from a service account key
    /// file. Tokens are cached and refreshed before they expire.
    pub fn from_service_account(path: impl AsRef<Path>) -> Result<Self, KmsError> {
        let path = path.as_ref();
        let account = CustomServiceAccount::from_file(path).map_err(|e| {
            KmsError::config(format!("cannot load credentials {}: {e}", path.display()))
        })?;
        Self::with_credentials(Credentials::ServiceAccount(Arc::new(account)))
    }

    fn with_credentials(credentials: Credentials) -> Result<Self, KmsError> {
        let http = reqwest::Client::builder().use_rustls_tls().build().map_err(unavailable)?;
        Ok(Self { http, endpoint: DEFAULT_ENDPOINT.to_owned(), credentials })
    }

    /// Sends requests to `endpoint` instead, e.g. a regional endpoint or a test server
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
        self
    }

    /// The base URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches the public key of a key version
    #[instrument(err, skip(self), fields(key = %name))]
    pub async fn get_public_key(&self, name: &KeyVersionName) -> Result<PublicKey, KmsError> {
        debug!("Dispatching get_public_key");
        let url = format!("{}/{}/publicKey", self.endpoint, name);
        self.send(self.http.get(url)).await
    }

    /// Signs a SHA-256 sized digest with a key version. The digest's CRC32C is attached so the
    /// service can detect corruption of the request.
    #[instrument(err, skip(self, digest), fields(key = %name, digest = %hex::encode(digest)))]
    pub async fn asymmetric_sign(
        &self,
        name: &KeyVersionName,
        digest: H256,
    ) -> Result<AsymmetricSignResponse, KmsError> {
        debug!("Dispatching asymmetric_sign");
        let body = AsymmetricSignRequest {
            digest: Digest { sha256: STANDARD.encode(digest) },
            digest_crc32c: crc32c::crc32c(digest.as_bytes()).to_string(),
        };
        trace!("{:?}", &body);
        let url = format!("{}/{}:asymmetricSign", self.endpoint, name);
        self.send(self.http.post(url).json(&body)).await
    }

    /// Lists every key ring of a project location, following pagination
    #[instrument(err, skip(self))]
    pub async fn list_key_rings(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<KeyRing>, KmsError> {
        let url = format!("{}/projects/{}/locations/{}/keyRings", self.endpoint, project, location);
        let mut rings = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            debug!(page_token = ?page_token, "Dispatching list_key_rings");
            let mut req = self.http.get(&url);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: ListKeyRingsResponse = self.send(req).await?;
            rings.extend(page.key_rings);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(rings)
    }

    async fn bearer_token(&self) -> Result<String, KmsError> {
        match &self.credentials {
            Credentials::AccessToken(token) => Ok(token.clone()),
            Credentials::ServiceAccount(account) => {
                let token = account.token(&[CLOUDKMS_SCOPE]).await.map_err(unavailable)?;
                Ok(token.as_str().to_owned())
            }
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, KmsError> {
        let token = self.bearer_token().await?;
        let resp = req.bearer_auth(token).send().await.map_err(unavailable)?;

        let status = resp.status();
        if is_fatal_status(status) {
            let body = resp.bytes().await.map_err(unavailable)?;
            let err: ErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
            return Err(KmsError::config(format!(
                "key service rejected request ({status} {}): {}",
                err.error.status, err.error.message
            )))
        }

        let resp = resp.error_for_status().map_err(unavailable)?;
        let body = resp.bytes().await.map_err(unavailable)?;
        trace!(body = %String::from_utf8_lossy(&body), "response");
        serde_json::from_slice(&body).map_err(|e| KmsError::malformed(e.to_string()))
    }
}
