#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # evmkms
//!
//! Sign, send and confirm EVM transactions with secp256k1 keys that never leave a cloud
//! key-management service.
//!
//! ```no_run
//! use evmkms::{
//!     middleware::{ConfirmationWaiter, TransactionBuilder, TxIntent},
//!     providers::{Http, Provider},
//!     signers::{gcp::GcpConfig, GcpSigner},
//! };
//! use std::time::Duration;
//!
//! # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Provider::<Http>::try_from("http://localhost:8545")?;
//! let config = GcpConfig::from_file("gcp-kms.json")?;
//! let signer = GcpSigner::from_config(&config).await?;
//!
//! let intent = TxIntent::new()
//!     .to("0xd8da6bf26964af9d7eed9e03e53415d37aa96045".parse::<evmkms::core::types::Address>()?)
//!     .value(10_000u64)
//!     .gas(21_000u64);
//! let tx = TransactionBuilder::new(provider.clone(), signer).build(intent).await?;
//!
//! let receipt = ConfirmationWaiter::new(&provider)
//!     .await_mined(tx.hash(), Duration::from_secs(120))
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Ethereum types, RLP and hashing utilities re-exported from `ethers-core`.
pub mod core {
    pub use ethers_core::*;
}

/// JSON-RPC clients re-exported from `ethers-providers`.
pub mod providers {
    pub use ethers_providers::*;
}

/// # evmkms-signers
///
/// The [`Signer`](signers::Signer) capability, the signature bridge turning a KMS DER
/// signature into a recoverable Ethereum signature, and the AWS / Google Cloud backends.
pub mod signers {
    pub use evmkms_signers::*;
}

/// # evmkms-middleware
///
/// Transaction building with fee-market selection, fee reservation for plain transfers,
/// confirmation waiting and CREATE2 address derivation.
pub mod middleware {
    pub use evmkms_middleware::*;
}
