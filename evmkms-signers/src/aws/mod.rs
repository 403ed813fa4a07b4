//! AWS KMS-based Signer

use ethers_core::{
    k256::ecdsa::VerifyingKey,
    types::{Address, Signature as EthSig, H256},
};
use rusoto_core::{credential::StaticProvider, HttpClient, Region, RusotoError};
use rusoto_kms::{
    GetPublicKeyError, GetPublicKeyRequest, GetPublicKeyResponse, Kms, KmsClient, SignError,
    SignRequest, SignResponse,
};
use std::str::FromStr;
use tracing::{debug, instrument, trace};

use crate::{
    bridge::{self, public_key_to_address},
    KmsError, Signer, SigningRules,
};

mod config;
pub use config::AwsConfig;

mod utils;

const SIGNING_ALGORITHM: &str = "ECDSA_SHA_256";
const MESSAGE_TYPE: &str = "DIGEST";

/// An ethers Signer that uses keys held in Amazon AWS KMS.
///
/// The AWS Signer passes signing requests to the cloud service. AWS KMS keys
/// are identified by a UUID, the `key_id`.
///
/// Because the public key is unknown, we retrieve it on instantiation of the
/// signer. This means that the new function is `async` and must be called
/// within some runtime.
///
/// ```no_run
/// use evmkms_signers::{AwsSigner, Signer};
/// use ethers_core::types::H256;
/// use rusoto_core::Region;
/// use rusoto_kms::KmsClient;
///
/// # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = KmsClient::new(Region::UsWest1);
/// let key_id = "...";
/// let chain_id = 1;
///
/// let signer = AwsSigner::new(client, key_id, chain_id).await?;
/// let sig = signer.sign_message(H256::zero()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AwsSigner {
    kms: KmsClient,
    chain_id: u64,
    key_id: String,
    pubkey: VerifyingKey,
    address: Address,
    rules: SigningRules,
}

impl std::fmt::Debug for AwsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSigner")
            .field("key_id", &self.key_id)
            .field("chain_id", &self.chain_id)
            .field("pubkey", &hex::encode(self.pubkey.to_encoded_point(true)))
            .field("address", &self.address)
            .finish()
    }
}

impl std::fmt::Display for AwsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AwsSigner {{ address: {}, chain_id: {}, key_id: {} }}",
            self.address, self.chain_id, self.key_id
        )
    }
}

/// Classifies the service errors of a KMS operation. Rejections that no retry can fix map to
/// [`KmsError::ConfigInvalid`], everything else to [`KmsError::ProviderUnavailable`].
pub trait ServiceRejection {
    /// True when the key reference or the key's state is wrong
    fn is_fatal(&self) -> bool;
}

impl ServiceRejection for GetPublicKeyError {
    fn is_fatal(&self) -> bool {
        use GetPublicKeyError::*;
        matches!(
            self,
            Disabled(_) |
                InvalidArn(_) |
                InvalidGrantToken(_) |
                InvalidKeyUsage(_) |
                KMSInvalidState(_) |
                NotFound(_) |
                UnsupportedOperation(_)
        )
    }
}

impl ServiceRejection for SignError {
    fn is_fatal(&self) -> bool {
        use SignError::*;
        matches!(
            self,
            Disabled(_) | InvalidGrantToken(_) | InvalidKeyUsage(_) | KMSInvalidState(_) | NotFound(_)
        )
    }
}

impl<E> From<RusotoError<E>> for KmsError
where
    E: ServiceRejection + std::error::Error + Send + Sync + 'static,
{
    fn from(err: RusotoError<E>) -> Self {
        match err {
            RusotoError::Service(e) if e.is_fatal() => KmsError::config(e.to_string()),
            RusotoError::Validation(msg) => KmsError::config(msg),
            RusotoError::ParseError(msg) => KmsError::malformed(msg),
            err => KmsError::ProviderUnavailable(Box::new(err)),
        }
    }
}

#[instrument(err, skip(kms, key_id), fields(key_id = %key_id.as_ref()))]
async fn request_get_pubkey<T>(kms: &KmsClient, key_id: T) -> Result<GetPublicKeyResponse, KmsError>
where
    T: AsRef<str>,
{
    debug!("Dispatching get_public_key");

    let req = GetPublicKeyRequest { grant_tokens: None, key_id: key_id.as_ref().to_owned() };
    trace!("{:?}", &req);
    let resp = kms.get_public_key(req).await;
    trace!("{:?}", &resp);
    Ok(resp?)
}

#[instrument(err, skip(kms, digest, key_id), fields(digest = %hex::encode(digest), key_id = %key_id.as_ref()))]
async fn request_sign_digest<T>(
    kms: &KmsClient,
    key_id: T,
    digest: H256,
) -> Result<SignResponse, KmsError>
where
    T: AsRef<str>,
{
    debug!("Dispatching sign");
    let req = SignRequest {
        key_id: key_id.as_ref().to_owned(),
        message: digest.as_bytes().to_vec().into(),
        message_type: Some(MESSAGE_TYPE.to_owned()),
        signing_algorithm: SIGNING_ALGORITHM.to_owned(),
        ..Default::default()
    };
    trace!("{:?}", &req);
    let resp = kms.sign(req).await;
    trace!("{:?}", &resp);
    Ok(resp?)
}

/// Region for a config: an endpoint override becomes a custom region, otherwise the region
/// name is parsed, falling back to rusoto's environment lookup.
fn region_for(config: &AwsConfig) -> Result<Region, KmsError> {
    match (&config.endpoint, &config.region) {
        (Some(endpoint), region) => Ok(Region::Custom {
            name: region.clone().unwrap_or_else(|| Region::default().name().to_owned()),
            endpoint: endpoint.clone(),
        }),
        (None, Some(region)) => Region::from_str(region)
            .map_err(|e| KmsError::config(format!("invalid Region {region}: {e}"))),
        (None, None) => Ok(Region::default()),
    }
}

impl AwsSigner {
    /// Instantiate a new signer from an existing `KmsClient` and Key ID.
    ///
    /// This function retrieves the public key from AWS and calculates the
    /// Etheruem address. It is therefore `async`.
    #[instrument(err, skip(kms, key_id, chain_id), fields(key_id = %key_id.as_ref()))]
    pub async fn new<T>(kms: KmsClient, key_id: T, chain_id: u64) -> Result<AwsSigner, KmsError>
    where
        T: AsRef<str>,
    {
        if key_id.as_ref().is_empty() {
            return Err(KmsError::config("empty KeyID"))
        }
        if chain_id == 0 {
            return Err(KmsError::config("empty ChainID"))
        }

        let pubkey = request_get_pubkey(&kms, &key_id).await.and_then(utils::decode_pubkey)?;
        let address = public_key_to_address(&pubkey);

        debug!(
            "Instantiated AWS signer with pubkey 0x{} and address 0x{}",
            hex::encode(pubkey.to_encoded_point(true)),
            hex::encode(address)
        );

        Ok(Self {
            kms,
            chain_id,
            key_id: key_id.as_ref().to_owned(),
            pubkey,
            address,
            rules: SigningRules::default(),
        })
    }

    /// Instantiate a signer from a validated [`AwsConfig`].
    ///
    /// Static credentials in the config are used as is, otherwise rusoto's default credential
    /// chain is consulted.
    pub async fn from_config(config: &AwsConfig) -> Result<AwsSigner, KmsError> {
        config.validate()?;
        let region = region_for(config)?;

        let kms = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret)) => {
                let credentials = StaticProvider::new(
                    access_key.clone(),
                    secret.clone(),
                    config.session_token.clone(),
                    None,
                );
                let dispatcher =
                    HttpClient::new().map_err(|e| KmsError::ProviderUnavailable(Box::new(e)))?;
                KmsClient::new_with(dispatcher, credentials, region)
            }
            _ => KmsClient::new(region),
        };

        Self::new(kms, &config.key_id, config.chain_id).await
    }

    /// Use a different domain separation for legacy transactions
    #[must_use]
    pub fn with_signing_rules(mut self, rules: SigningRules) -> Self {
        self.rules = rules;
        self
    }

    /// The KMS key id this signer signs with
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Fetch the pubkey associated with a key id
    pub async fn get_pubkey_for_key<T>(&self, key_id: T) -> Result<VerifyingKey, KmsError>
    where
        T: AsRef<str>,
    {
        request_get_pubkey(&self.kms, key_id).await.and_then(utils::decode_pubkey)
    }

    /// Fetch the pubkey associated with this signer's key ID
    pub async fn get_pubkey(&self) -> Result<VerifyingKey, KmsError> {
        self.get_pubkey_for_key(&self.key_id).await
    }

    /// Sign a digest with the key associated with a key id and return the raw DER signature
    pub async fn sign_digest_with_key<T>(
        &self,
        key_id: T,
        digest: H256,
    ) -> Result<bytes::Bytes, KmsError>
    where
        T: AsRef<str>,
    {
        request_sign_digest(&self.kms, key_id, digest).await.and_then(utils::decode_signature)
    }
}

#[async_trait::async_trait]
impl Signer for AwsSigner {
    type Error = KmsError;

    #[instrument(err, skip(digest), fields(digest = %hex::encode(digest)))]
    async fn sign_digest(&self, digest: H256) -> Result<EthSig, Self::Error> {
        let der = self.sign_digest_with_key(&self.key_id, digest).await?;
        Ok(bridge::normalize(&self.pubkey, digest, &der)?)
    }

    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> &VerifyingKey {
        &self.pubkey
    }

    /// Returns the signer's chain id
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sets the signer's chain id
    fn with_chain_id<T: Into<u64>>(mut self, chain_id: T) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    fn signing_rules(&self) -> SigningRules {
        self.rules
    }
}
