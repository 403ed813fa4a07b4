use ethers_core::{
    k256::ecdsa::Error as K256Error,
    types::{Address, SignatureError as EthSignatureError},
};
use thiserror::Error;

/// Errors raised while turning a provider signature into a recoverable Ethereum signature,
/// or while checking the signer of a signed transaction.
///
/// None of these are retryable: they mean the key service returned data that does not belong
/// to the key the signer was created with.
#[derive(Error, Debug)]
pub enum SignatureError {
    /// The provider signature is not a valid DER `(r, s)` pair
    #[error("malformed provider signature: {0}")]
    Malformed(K256Error),
    /// The signature does not verify against the cached public key
    #[error("signature does not verify against the signer's public key")]
    VerificationFailed,
    /// Neither recovery id recovers the cached public key
    #[error("no recovery id recovers the signer's public key")]
    RecoveryFailed,
    /// The signed transaction recovers to a different sender
    #[error("expected signer {expected:?}, got {recovered:?}")]
    UnauthorizedSigner {
        /// The address of the signer
        expected: Address,
        /// The address recovered from the signed transaction
        recovered: Address,
    },
    /// Public key recovery from a finished signature failed
    #[error(transparent)]
    Recovery(#[from] EthSignatureError),
}

/// Errors produced by the KMS backed signers
#[derive(Error, Debug)]
pub enum KmsError {
    /// Required identifiers or credentials are missing or malformed
    #[error("invalid config: {0}")]
    ConfigInvalid(String),
    /// Transport or authentication failure talking to the key service. The caller may retry.
    #[error("key service unavailable: {0}")]
    ProviderUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The key service answered, but without the expected fields or with undecodable key
    /// material
    #[error("malformed key service response: {0}")]
    MalformedResponse(String),
    /// An integrity checksum attached to a request or response did not match
    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(&'static str),
    /// The returned signature could not be bridged to the signer's key
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// Config file could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KmsError {
    /// Returns true for failures the caller may retry, i.e. transport or auth errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KmsError::ProviderUnavailable(_))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        KmsError::ConfigInvalid(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        KmsError::MalformedResponse(msg.into())
    }
}
