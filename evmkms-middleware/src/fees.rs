//! Fee-market constants and the fee reserved by value transfers.

use ethers_core::types::U256;

/// Gas used by a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Base fee multiplier in the default fee cap, `cap = tip + 2 * base_fee`
pub const BASE_FEE_WIGGLE_MULTIPLIER: u64 = 2;

/// How aggressively a transfer over-reserves for base fee growth.
///
/// Each level multiplies the current base fee before the tip is added.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GasPriority {
    /// base fee × 2.0
    #[default]
    Low,
    /// base fee × 2.1
    Average,
    /// base fee × 2.2
    High,
}

impl GasPriority {
    /// The base fee multiplier in thousandths
    pub fn per_mille(&self) -> u64 {
        match self {
            GasPriority::Low => 2_000,
            GasPriority::Average => 2_100,
            GasPriority::High => 2_200,
        }
    }

    /// The base fee scaled by this priority's multiplier
    pub fn scale_base_fee(&self, base_fee: U256) -> U256 {
        base_fee.saturating_mul(self.per_mille().into()) / 1_000
    }
}

/// Default EIP-1559 fee cap for a tip and base fee
pub fn max_fee_per_gas(base_fee: U256, tip: U256) -> U256 {
    tip.saturating_add(base_fee.saturating_mul(BASE_FEE_WIGGLE_MULTIPLIER.into()))
}

/// Fee a transfer reserves out of its value: `21000 * (scaled base fee + tip)`
pub fn estimate_transfer_fee(base_fee: U256, tip: U256, priority: GasPriority) -> U256 {
    priority
        .scale_base_fee(base_fee)
        .saturating_add(tip)
        .saturating_mul(TRANSFER_GAS.into())
}
