//! Turns the DER encoded ECDSA output of a key service into an Ethereum signature.
//!
//! KMS providers sign with secp256k1 but return neither a canonical `s` nor the recovery id
//! Ethereum needs to recover the sender. Both are reconstructed here against the public key
//! fetched when the signer was created.

use ethers_core::{
    k256::ecdsa::{
        signature::hazmat::PrehashVerifier, RecoveryId, Signature as KSig, VerifyingKey,
    },
    types::{Address, Signature as EthSig, H256, U256},
    utils::keccak256,
};
use tracing::trace;

use crate::SignatureError;

/// Converts a DER `(r, s)` pair produced for `digest` into a recoverable signature with
/// `v` in `{0, 1}`.
///
/// The `s` value is folded into the lower half of the curve order before anything else, the
/// signature is then verified against `public_key`, and the recovery id is found by trial
/// recovery. Applying it twice yields the same signature.
pub fn normalize(
    public_key: &VerifyingKey,
    digest: H256,
    der: &[u8],
) -> Result<EthSig, SignatureError> {
    let sig = KSig::from_der(der).map_err(SignatureError::Malformed)?;
    let sig = sig.normalize_s().unwrap_or(sig);

    public_key
        .verify_prehash(digest.as_bytes(), &sig)
        .map_err(|_| SignatureError::VerificationFailed)?;

    let recovery_id = recovery_id(&sig, digest, public_key)?;
    trace!(v = recovery_id.to_byte(), "recovered signature parity");

    let (r, s) = sig.split_bytes();
    Ok(EthSig {
        r: U256::from_big_endian(r.as_slice()),
        s: U256::from_big_endian(s.as_slice()),
        v: recovery_id.to_byte() as u64,
    })
}

/// Finds the recovery id under which `sig` recovers to `public_key`.
///
/// Only ids 0 and 1 are tried. Ids 2 and 3 would need the nonce point's `x` coordinate to be
/// at least the curve order `n`, which has negligible probability on secp256k1.
pub fn recovery_id(
    sig: &KSig,
    digest: H256,
    public_key: &VerifyingKey,
) -> Result<RecoveryId, SignatureError> {
    [RecoveryId::new(false, false), RecoveryId::new(true, false)]
        .into_iter()
        .find(|id| check_candidate(sig, *id, digest, public_key))
        .ok_or(SignatureError::RecoveryFailed)
}

/// Makes a trial recovery to check whether a signature corresponds to a known key
fn check_candidate(sig: &KSig, recovery_id: RecoveryId, digest: H256, vk: &VerifyingKey) -> bool {
    VerifyingKey::recover_from_prehash(digest.as_bytes(), sig, recovery_id)
        .map(|key| key == *vk)
        .unwrap_or(false)
}

/// Convert a verifying key to an ethereum address
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    // false for uncompressed
    let uncompressed_pub_key = key.to_encoded_point(false);
    let public_key = uncompressed_pub_key.as_bytes();
    debug_assert_eq!(public_key[0], 0x04);
    let hash = keccak256(&public_key[1..]);
    Address::from_slice(&hash[12..])
}
