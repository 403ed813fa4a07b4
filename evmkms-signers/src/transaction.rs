use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Signature, H256,
};

use crate::SignatureError;

/// A transaction together with the signature produced for it.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedTransaction {
    tx: TypedTransaction,
    signature: Signature,
}

impl SignedTransaction {
    /// Pairs a transaction with its signature. The signature's `v` must already follow the
    /// transaction's convention (EIP-155 or `{27, 28}` for legacy transactions).
    pub fn new(tx: TypedTransaction, signature: Signature) -> Self {
        Self { tx, signature }
    }

    /// The unsigned transaction, with the chain id that was bound into its hash
    pub fn tx(&self) -> &TypedTransaction {
        &self.tx
    }

    /// The transaction signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// RLP encoding of the signed transaction, as accepted by `eth_sendRawTransaction`
    pub fn rlp(&self) -> Bytes {
        self.tx.rlp_signed(&self.signature)
    }

    /// Hash of the signed transaction
    pub fn hash(&self) -> H256 {
        self.tx.hash(&self.signature)
    }

    /// Recovers the sender from the signature and the transaction's signing hash
    pub fn recover_from(&self) -> Result<Address, SignatureError> {
        Ok(self.signature.recover(self.tx.sighash())?)
    }

    /// Splits into the transaction and its signature
    pub fn into_parts(self) -> (TypedTransaction, Signature) {
        (self.tx, self.signature)
    }
}
