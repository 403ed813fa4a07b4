//! Google Cloud KMS-based Signer

use base64::{engine::general_purpose::STANDARD, Engine};
use ethers_core::{
    k256::{ecdsa::VerifyingKey, pkcs8::DecodePublicKey},
    types::{Address, Signature as EthSig, H256},
};
use tracing::{debug, info, instrument};

use crate::{
    bridge::{self, public_key_to_address},
    KmsError, Signer, SigningRules,
};

mod client;
pub use client::{
    AsymmetricSignResponse, GcpKmsClient, KeyRing, KeyVersionName, PublicKey, CLOUDKMS_SCOPE,
    DEFAULT_ENDPOINT,
};

mod config;
pub use config::{GcpConfig, GcpKey, ACCESS_TOKEN_ENV, CREDENTIALS_ENV};

/// The only Cloud KMS algorithm producing Ethereum compatible signatures
pub const SECP256K1_ALGORITHM: &str = "EC_SIGN_SECP256K1_SHA256";

/// An ethers Signer that uses a secp256k1 key version held in Google Cloud KMS.
///
/// The public key is fetched and checked on instantiation, so `new` is `async`.
#[derive(Clone)]
pub struct GcpSigner {
    client: GcpKmsClient,
    key: KeyVersionName,
    chain_id: u64,
    pubkey: VerifyingKey,
    address: Address,
    rules: SigningRules,
}

impl std::fmt::Debug for GcpSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSigner")
            .field("key", &self.key.to_string())
            .field("chain_id", &self.chain_id)
            .field("pubkey", &hex::encode(self.pubkey.to_encoded_point(true)))
            .field("address", &self.address)
            .finish()
    }
}

impl std::fmt::Display for GcpSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GcpSigner {{ address: {}, chain_id: {}, key: {} }}",
            self.address, self.chain_id, self.key
        )
    }
}

/// Checks algorithm and checksum of a public key response before parsing the PEM
fn decode_pubkey(resp: &PublicKey) -> Result<VerifyingKey, KmsError> {
    if resp.algorithm != SECP256K1_ALGORITHM {
        return Err(KmsError::config(format!(
            "key algorithm {} is not {SECP256K1_ALGORITHM}",
            resp.algorithm
        )))
    }
    if let Some(expected) = resp.pem_crc32c {
        if crc32c::crc32c(resp.pem.as_bytes()) != expected {
            return Err(KmsError::ChecksumMismatch("public key corrupted in-transit"))
        }
    }
    VerifyingKey::from_public_key_pem(&resp.pem)
        .map_err(|e| KmsError::malformed(format!("cannot decode public key: {e}")))
}

/// Checks both integrity checksums of a sign response and returns the DER signature
fn decode_signature(resp: AsymmetricSignResponse) -> Result<Vec<u8>, KmsError> {
    if !resp.verified_digest_crc32c {
        return Err(KmsError::ChecksumMismatch("request corrupted in-transit"))
    }
    let der = STANDARD
        .decode(&resp.signature)
        .map_err(|e| KmsError::malformed(format!("signature is not base64: {e}")))?;
    match resp.signature_crc32c {
        Some(expected) if crc32c::crc32c(&der) == expected => Ok(der),
        _ => Err(KmsError::ChecksumMismatch("response corrupted in-transit")),
    }
}

impl GcpSigner {
    /// Instantiate a new signer for a key version.
    ///
    /// This function retrieves the public key from Cloud KMS, checks that the key is a
    /// secp256k1 signing key and calculates the Ethereum address.
    #[instrument(err, skip(client, key, chain_id), fields(key = %key))]
    pub async fn new(
        client: GcpKmsClient,
        key: KeyVersionName,
        chain_id: u64,
    ) -> Result<GcpSigner, KmsError> {
        key.validate()?;
        if chain_id == 0 {
            return Err(KmsError::config("empty ChainID"))
        }

        let resp = client.get_public_key(&key).await?;
        let pubkey = decode_pubkey(&resp)?;
        let address = public_key_to_address(&pubkey);

        debug!(
            "Instantiated GCP signer with pubkey 0x{} and address 0x{}",
            hex::encode(pubkey.to_encoded_point(true)),
            hex::encode(address)
        );

        Ok(Self { client, key, chain_id, pubkey, address, rules: SigningRules::default() })
    }

    /// Instantiate a signer from a validated [`GcpConfig`].
    ///
    /// An access token is used as is. Otherwise tokens are minted from the service account key
    /// file at `CredentialLocation`.
    pub async fn from_config(config: &GcpConfig) -> Result<GcpSigner, KmsError> {
        config.validate()?;
        let mut client = match (config.access_token(), config.credential_location()) {
            (Some(token), _) => GcpKmsClient::new(token)?,
            (None, Some(path)) => GcpKmsClient::from_service_account(path)?,
            (None, None) => return Err(KmsError::config("empty CredentialLocation")),
        };
        if let Some(endpoint) = &config.endpoint {
            client = client.with_endpoint(endpoint);
        }

        Self::new(client, config.key_version_name(), config.chain_id).await
    }

    /// Use a different domain separation for legacy transactions
    #[must_use]
    pub fn with_signing_rules(mut self, rules: SigningRules) -> Self {
        self.rules = rules;
        self
    }

    /// The key version this signer signs with
    pub fn key(&self) -> &KeyVersionName {
        &self.key
    }

    /// Fetch the checked public key of a key version
    pub async fn get_pubkey_for_key(&self, key: &KeyVersionName) -> Result<VerifyingKey, KmsError> {
        let resp = self.client.get_public_key(key).await?;
        decode_pubkey(&resp)
    }

    /// Sign a digest with a key version and return the checksum-verified DER signature
    pub async fn sign_digest_with_key(
        &self,
        key: &KeyVersionName,
        digest: H256,
    ) -> Result<Vec<u8>, KmsError> {
        self.client.asymmetric_sign(key, digest).await.and_then(decode_signature)
    }

    /// Logs and returns the key rings in the signer's project location
    pub async fn list_key_rings(&self) -> Result<Vec<KeyRing>, KmsError> {
        let rings = self.client.list_key_rings(&self.key.project, &self.key.location).await?;
        for ring in &rings {
            info!(name = %ring.name, "Key ring");
        }
        Ok(rings)
    }
}

#[async_trait::async_trait]
impl Signer for GcpSigner {
    type Error = KmsError;

    #[instrument(err, skip(digest), fields(digest = %hex::encode(digest)))]
    async fn sign_digest(&self, digest: H256) -> Result<EthSig, Self::Error> {
        let der = self.sign_digest_with_key(&self.key, digest).await?;
        Ok(bridge::normalize(&self.pubkey, digest, &der)?)
    }

    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> &VerifyingKey {
        &self.pubkey
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn with_chain_id<T: Into<u64>>(mut self, chain_id: T) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    fn signing_rules(&self) -> SigningRules {
        self.rules
    }
}
