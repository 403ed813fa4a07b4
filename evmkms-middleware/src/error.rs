use ethers_core::types::{Address, TxHash, U256};
use evmkms_signers::Signer;
use std::time::Duration;
use thiserror::Error;

use crate::ChainClient;

#[derive(Error, Debug)]
/// Error thrown while building, signing or submitting a transaction
pub enum TxBuilderError<C: ChainClient, S: Signer> {
    #[error("{0}")]
    /// Thrown when a node call fails
    ClientError(C::Error),

    #[error("{0}")]
    /// Thrown when the internal call to the signer fails
    SignerError(S::Error),

    /// Thrown when the intent mixes legacy and fee-market pricing, or asks for fee-market
    /// pricing on a chain without a base fee
    #[error("conflicting fee fields: {0}")]
    FeeConflict(&'static str),

    /// Thrown when the fee cap is below the priority fee
    #[error("maxFeePerGas ({max_fee_per_gas}) < maxPriorityFeePerGas ({max_priority_fee_per_gas})")]
    InvalidFeeBounds {
        /// The fee cap
        max_fee_per_gas: U256,
        /// The priority fee
        max_priority_fee_per_gas: U256,
    },

    /// Thrown when no gas limit was supplied and none could be estimated
    #[error("failed to estimate gas: {0}")]
    GasEstimationFailure(EstimationFailure<C::Error>),

    /// Thrown when a transfer's value does not cover its own fee
    #[error("not enough funds: value {value} does not cover fee {fee}")]
    InsufficientFunds {
        /// The value the caller asked to transfer
        value: U256,
        /// The fee reserved out of the value
        fee: U256,
    },

    /// Thrown when a transfer is requested on a chain whose latest block has no base fee
    #[error("latest block has no base fee")]
    BaseFeeUnavailable,
}

/// Why a gas estimate could not be produced
#[derive(Error, Debug)]
pub enum EstimationFailure<E> {
    /// The call target has no code, so estimating a call to it is meaningless
    #[error("no contract code at {0:?}")]
    NoCode(Address),
    /// The node rejected the simulation
    #[error("simulation failed: {0}")]
    Simulation(E),
}

/// Error thrown while waiting for a transaction to be seen or mined
#[derive(Error, Debug)]
pub enum WaitError<E> {
    /// The zero hash was passed
    #[error("malformed transaction hash {0:?}")]
    MalformedHash(TxHash),
    /// The transaction did not show up within the configured attempts
    #[error("transaction not found after {0} attempts")]
    RetriesExhausted(usize),
    /// No receipt within the deadline. The transaction may still be mined later.
    #[error("transaction not mined within {0:?}")]
    TransactionTimeout(Duration),
    /// A node call failed while polling for the receipt
    #[error("{0}")]
    ClientError(E),
}
