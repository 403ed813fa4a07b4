use async_trait::async_trait;
use ethers_core::{
    k256::ecdsa::{signature::hazmat::PrehashSigner, Signature as KSig, SigningKey, VerifyingKey},
    types::{
        transaction::eip2718::TypedTransaction, Address, Block, Bytes, Signature, Transaction,
        TransactionReceipt, TxHash, H256, U256,
    },
};
use evmkms_signers::{
    bridge::{normalize, public_key_to_address},
    SignatureError, Signer,
};
use std::sync::{Arc, Mutex};

/// Error returned by [`FakeChain`]
#[derive(Debug, thiserror::Error)]
#[error("fake chain: {0}")]
pub struct FakeError(pub &'static str);

#[derive(Debug, Default)]
pub struct ChainState {
    pub base_fee: Option<U256>,
    pub tip: U256,
    pub gas_price: U256,
    pub gas_estimate: Option<U256>,
    pub code: Bytes,
    pub nonce: U256,
    pub transaction: Option<Transaction>,
    pub receipt: Option<TransactionReceipt>,
    pub fail_lookups: bool,
    pub calls: Vec<&'static str>,
    pub sent: Vec<Bytes>,
}

/// In-memory [`ChainClient`](evmkms_middleware::ChainClient) recording every call
#[derive(Clone, Debug, Default)]
pub struct FakeChain(pub Arc<Mutex<ChainState>>);

impl FakeChain {
    pub fn london(base_fee: u64, tip: u64) -> Self {
        let chain = Self::default();
        chain.update(|state| {
            state.base_fee = Some(base_fee.into());
            state.tip = tip.into();
            state.gas_estimate = Some(50_000u64.into());
            state.code = vec![0x60, 0x80].into();
        });
        chain
    }

    pub fn pre_london(gas_price: u64) -> Self {
        let chain = Self::default();
        chain.update(|state| {
            state.gas_price = gas_price.into();
            state.gas_estimate = Some(50_000u64.into());
            state.code = vec![0x60, 0x80].into();
        });
        chain
    }

    pub fn update(&self, f: impl FnOnce(&mut ChainState)) {
        f(&mut self.0.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.0.lock().unwrap().sent.clone()
    }

    fn record(&self, call: &'static str) -> std::sync::MutexGuard<'_, ChainState> {
        let mut state = self.0.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl evmkms_middleware::ChainClient for FakeChain {
    type Error = FakeError;

    async fn latest_block(&self) -> Result<Option<Block<TxHash>>, Self::Error> {
        let state = self.record("latest_block");
        Ok(Some(Block { base_fee_per_gas: state.base_fee, ..Default::default() }))
    }

    async fn suggest_tip(&self) -> Result<U256, Self::Error> {
        Ok(self.record("suggest_tip").tip)
    }

    async fn suggest_gas_price(&self) -> Result<U256, Self::Error> {
        Ok(self.record("suggest_gas_price").gas_price)
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256, Self::Error> {
        self.record("estimate_gas").gas_estimate.ok_or(FakeError("execution reverted"))
    }

    async fn pending_code(&self, _address: Address) -> Result<Bytes, Self::Error> {
        Ok(self.record("pending_code").code.clone())
    }

    async fn pending_nonce(&self, _address: Address) -> Result<U256, Self::Error> {
        Ok(self.record("pending_nonce").nonce)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, Self::Error> {
        let mut state = self.record("send_raw_transaction");
        let hash = H256::from(ethers_core::utils::keccak256(&raw));
        state.sent.push(raw);
        Ok(hash)
    }

    async fn transaction_by_hash(&self, _hash: TxHash) -> Result<Option<Transaction>, Self::Error> {
        let state = self.record("transaction_by_hash");
        if state.fail_lookups {
            return Err(FakeError("connection reset"))
        }
        Ok(state.transaction.clone())
    }

    async fn receipt_by_hash(
        &self,
        _hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, Self::Error> {
        let state = self.record("receipt_by_hash");
        if state.fail_lookups {
            return Err(FakeError("connection reset"))
        }
        Ok(state.receipt.clone())
    }
}

/// Signs with a local key through the same bridge the KMS backends use
#[derive(Debug)]
pub struct LocalKeySigner {
    key: SigningKey,
    address: Address,
    chain_id: u64,
}

impl LocalKeySigner {
    pub fn new(seed: u8, chain_id: u64) -> Self {
        let key = SigningKey::from_slice(&[seed; 32]).unwrap();
        let address = public_key_to_address(key.verifying_key());
        Self { key, address, chain_id }
    }

    /// Claims `address` while still signing with the seeded key
    pub fn claiming(mut self, address: Address) -> Self {
        self.address = address;
        self
    }
}

#[async_trait]
impl Signer for LocalKeySigner {
    type Error = SignatureError;

    async fn sign_digest(&self, digest: H256) -> Result<Signature, Self::Error> {
        let sig: KSig =
            self.key.sign_prehash(digest.as_bytes()).map_err(SignatureError::Malformed)?;
        normalize(self.key.verifying_key(), digest, sig.to_der().as_bytes())
    }

    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn with_chain_id<T: Into<u64>>(mut self, chain_id: T) -> Self {
        self.chain_id = chain_id.into();
        self
    }
}
