//! Deterministic deployment addresses as defined by
//! [EIP-1014](https://eips.ethereum.org/EIPS/eip-1014).

use ethers_core::{
    abi::{self, Token},
    types::{Address, H256},
    utils::{get_create2_address, get_create2_address_from_hash},
};

/// Returns the address a `CREATE2` from `deployer` with `salt` and the given init code hash
/// deploys to: `keccak256(0xff ++ deployer ++ salt ++ init_code_hash)[12..]`.
pub fn compute_create2_address(deployer: Address, salt: H256, init_code_hash: H256) -> Address {
    get_create2_address_from_hash(deployer, salt, init_code_hash)
}

/// Like [`compute_create2_address`], with `bytecode ++ abi_encode(constructor_args)` as the
/// init code.
pub fn create2_address_for(
    deployer: Address,
    salt: H256,
    bytecode: impl AsRef<[u8]>,
    constructor_args: &[Token],
) -> Address {
    let args = abi::encode(constructor_args);
    let init_code = [bytecode.as_ref(), args.as_slice()].concat();
    get_create2_address(deployer, salt, init_code)
}
