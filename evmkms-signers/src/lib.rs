#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! Provides a unified interface for signing transactions with keys held in a remote
//! key-management service.
//!
//! KMS providers expose a generic "sign this SHA-256 digest with ECDSA" operation and return
//! a DER encoded `(r, s)` pair. The [`bridge`] module turns that output into a recoverable
//! Ethereum signature bound to the key's public key, and the [`Signer`] trait builds
//! transaction signing on top of a single `sign_digest` primitive.
//!
//! Supported backends:
//! - AWS KMS ([`AwsSigner`], feature `aws`)
//! - Google Cloud KMS ([`GcpSigner`], feature `gcp`)
//!
//! ```no_run
//! # use evmkms_signers::{aws::AwsConfig, AwsSigner, Signer};
//! # use ethers_core::types::TransactionRequest;
//! # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AwsConfig::from_file("aws-kms.json")?;
//! let signer = AwsSigner::from_config(&config).await?;
//!
//! let tx = TransactionRequest::new()
//!     .to(signer.address())
//!     .value(10_000)
//!     .gas(21_000)
//!     .gas_price(1_000_000_000u64)
//!     .nonce(0);
//!
//! let signed = signer.sign_transaction(&tx.into()).await?;
//! assert_eq!(signed.recover_from()?, signer.address());
//! # Ok(())
//! # }
//! ```

pub mod bridge;

mod error;
pub use error::{KmsError, SignatureError};

mod transaction;
pub use transaction::SignedTransaction;

#[cfg(feature = "aws")]
#[cfg_attr(docsrs, doc(cfg(feature = "aws")))]
pub mod aws;
#[cfg(feature = "aws")]
pub use aws::AwsSigner;

#[cfg(feature = "gcp")]
#[cfg_attr(docsrs, doc(cfg(feature = "gcp")))]
pub mod gcp;
#[cfg(feature = "gcp")]
pub use gcp::GcpSigner;

use async_trait::async_trait;
use ethers_core::{
    k256::ecdsa::VerifyingKey,
    types::{transaction::eip2718::TypedTransaction, Address, Signature, H256},
    utils::hash_message,
};
use std::error::Error;

/// Applies [EIP155](https://github.com/ethereum/EIPs/blob/master/EIPS/eip-155.md)
pub fn to_eip155_v<T: Into<u8>>(recovery_id: T, chain_id: Option<u64>) -> u64 {
    let standard_v: u8 = recovery_id.into();
    if let Some(chain_id) = chain_id {
        // When signing with a chain ID, add chain replay protection.
        (standard_v as u64) + 35 + chain_id * 2
    } else {
        // Otherwise, convert to 'Electrum' notation.
        (standard_v as u64) + 27
    }
}

/// The domain separation applied when hashing a transaction for signing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SigningRules {
    /// Bind the chain id into every transaction hash (EIP-155 for legacy transactions,
    /// the `chainId` field for typed transactions).
    #[default]
    Eip155,
    /// Sign legacy transactions without a chain id and with a `{27, 28}` recovery byte.
    /// Typed transactions always carry a chain id and are unaffected.
    Homestead,
}

/// Trait for signing transactions and messages with a remotely held key.
///
/// Implementors only provide [`sign_digest`](Signer::sign_digest) and access to the cached
/// key material; transaction hashing, the `v` convention and the sender self-check are
/// shared by every backend.
#[async_trait]
pub trait Signer: std::fmt::Debug + Send + Sync {
    /// Error returned by the backend.
    type Error: Error + Send + Sync + From<SignatureError>;

    /// Signs a 32 byte digest and returns the canonical signature with `v` in `{0, 1}`.
    async fn sign_digest(&self, digest: H256) -> Result<Signature, Self::Error>;

    /// Signs the hash of the provided message after prefixing it
    async fn sign_message<S: Send + Sync + AsRef<[u8]>>(
        &self,
        message: S,
    ) -> Result<Signature, Self::Error> {
        let message_hash = hash_message(message);
        let mut signature = self.sign_digest(message_hash).await?;
        signature.v = to_eip155_v(signature.v as u8, None);
        Ok(signature)
    }

    /// Signs the transaction and checks that the signature recovers to [`Signer::address`].
    ///
    /// The transaction's own chain id is kept if present, otherwise the signer's chain id is
    /// set. A signature that recovers to any other address is rejected with
    /// [`SignatureError::UnauthorizedSigner`].
    async fn sign_transaction(
        &self,
        tx: &TypedTransaction,
    ) -> Result<SignedTransaction, Self::Error> {
        let mut tx = tx.clone();

        let chain_id = match (self.signing_rules(), &mut tx) {
            (SigningRules::Homestead, TypedTransaction::Legacy(inner)) => {
                inner.chain_id = None;
                None
            }
            (_, tx) => {
                let chain_id =
                    tx.chain_id().map(|id| id.as_u64()).unwrap_or_else(|| self.chain_id());
                tx.set_chain_id(chain_id);
                Some(chain_id)
            }
        };

        let sighash = tx.sighash();
        let mut signature = self.sign_digest(sighash).await?;
        signature.v = to_eip155_v(signature.v as u8, chain_id);

        let signed = SignedTransaction::new(tx, signature);
        let expected = self.address();
        let recovered = signed.recover_from()?;
        if recovered != expected {
            return Err(SignatureError::UnauthorizedSigner { expected, recovered }.into())
        }

        Ok(signed)
    }

    /// Returns the signer's Ethereum Address
    fn address(&self) -> Address;

    /// Returns the public key fetched from the key service when the signer was created
    fn public_key(&self) -> &VerifyingKey;

    /// Returns the signer's chain id
    fn chain_id(&self) -> u64;

    /// Sets the signer's chain id
    #[must_use]
    fn with_chain_id<T: Into<u64>>(self, chain_id: T) -> Self;

    /// Returns the domain separation used by [`Signer::sign_transaction`]
    fn signing_rules(&self) -> SigningRules {
        SigningRules::Eip155
    }
}
