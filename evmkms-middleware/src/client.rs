use async_trait::async_trait;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Block, BlockId, BlockNumber, Bytes,
    Transaction, TransactionReceipt, TxHash, U256,
};
use ethers_providers::{JsonRpcClient, Middleware, Provider, ProviderError};
use std::{error::Error, fmt::Debug};

/// The chain RPC surface needed to build, submit and confirm transactions.
///
/// Implemented for [`Provider`] over any JSON-RPC transport. Tests and alternative node
/// clients can implement it directly.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Error returned by the node or the transport
    type Error: Error + Send + Sync + 'static;

    /// The latest block header (`eth_getBlockByNumber("latest", false)`)
    async fn latest_block(&self) -> Result<Option<Block<TxHash>>, Self::Error>;

    /// Suggested priority fee per gas (`eth_maxPriorityFeePerGas`)
    async fn suggest_tip(&self) -> Result<U256, Self::Error>;

    /// Suggested legacy gas price (`eth_gasPrice`)
    async fn suggest_gas_price(&self) -> Result<U256, Self::Error>;

    /// Simulates the transaction and returns the gas it uses (`eth_estimateGas`)
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, Self::Error>;

    /// Code deployed at `address` in the pending state
    async fn pending_code(&self, address: Address) -> Result<Bytes, Self::Error>;

    /// Next nonce of `address`, counting pending transactions
    async fn pending_nonce(&self, address: Address) -> Result<U256, Self::Error>;

    /// Broadcasts a signed, RLP encoded transaction and returns its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, Self::Error>;

    /// Looks a transaction up by hash, `None` if the node does not know it yet
    async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<Transaction>, Self::Error>;

    /// Receipt of a transaction, `None` while it is not mined
    async fn receipt_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, Self::Error>;
}

#[async_trait]
impl<P: JsonRpcClient> ChainClient for Provider<P> {
    type Error = ProviderError;

    async fn latest_block(&self) -> Result<Option<Block<TxHash>>, Self::Error> {
        self.get_block(BlockNumber::Latest).await
    }

    async fn suggest_tip(&self) -> Result<U256, Self::Error> {
        self.request("eth_maxPriorityFeePerGas", ()).await
    }

    async fn suggest_gas_price(&self) -> Result<U256, Self::Error> {
        self.get_gas_price().await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, Self::Error> {
        Middleware::estimate_gas(self, tx, None).await
    }

    async fn pending_code(&self, address: Address) -> Result<Bytes, Self::Error> {
        self.get_code(address, Some(BlockId::Number(BlockNumber::Pending))).await
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256, Self::Error> {
        self.get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending))).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, Self::Error> {
        let pending = Middleware::send_raw_transaction(self, raw).await?;
        Ok(*pending)
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> Result<Option<Transaction>, Self::Error> {
        self.get_transaction(hash).await
    }

    async fn receipt_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, Self::Error> {
        self.get_transaction_receipt(hash).await
    }
}
