//! Decoding helpers for rusoto KMS responses. Only meant for use within this module.

use std::convert::TryFrom;

use bytes::Bytes;
use ethers_core::k256::ecdsa::VerifyingKey;
use rusoto_kms::{GetPublicKeyResponse, SignResponse};

use crate::KmsError;

/// Decode an AWS KMS Pubkey response
pub(super) fn decode_pubkey(resp: GetPublicKeyResponse) -> Result<VerifyingKey, KmsError> {
    let raw = resp.public_key.ok_or_else(|| KmsError::malformed("Pubkey not found in response"))?;

    let spki = spki::SubjectPublicKeyInfoRef::try_from(raw.as_ref())
        .map_err(|e| KmsError::malformed(format!("invalid SubjectPublicKeyInfo: {e}")))?;
    let key = VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
        .map_err(|e| KmsError::malformed(format!("not a secp256k1 public key: {e}")))?;

    Ok(key)
}

/// Decode an AWS KMS Signature response into the raw DER signature
pub(super) fn decode_signature(resp: SignResponse) -> Result<Bytes, KmsError> {
    resp.signature.ok_or_else(|| KmsError::malformed("Signature not found in response"))
}
