#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! Builds, signs, submits and confirms transactions for a [`Signer`](evmkms_signers::Signer).
//!
//! - [`TransactionBuilder`] picks legacy or EIP-1559 pricing, resolves nonce and gas limit
//!   and submits the signed transaction. [`TransactionBuilder::build_transfer`] reserves the
//!   transfer fee out of the sent value.
//! - [`ConfirmationWaiter`] waits for a transaction to become visible and then for its receipt.
//! - [`create2`] derives deterministic deployment addresses.
//!
//! Chain access goes through the [`ChainClient`] trait, implemented for
//! [`Provider`](ethers_providers::Provider).

mod builder;
pub use builder::{TransactionBuilder, TxIntent};

mod client;
pub use client::ChainClient;

pub mod create2;
pub use create2::{compute_create2_address, create2_address_for};

mod error;
pub use error::{EstimationFailure, TxBuilderError, WaitError};

pub mod fees;
pub use fees::GasPriority;

/// Waiting for transactions to be seen and mined
pub mod pending;
pub use pending::ConfirmationWaiter;
