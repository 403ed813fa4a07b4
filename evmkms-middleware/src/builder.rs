use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest,
    TransactionRequest, U256,
};
use evmkms_signers::{SignedTransaction, Signer};
use tracing::{debug, instrument, trace};

use crate::{
    fees::{estimate_transfer_fee, max_fee_per_gas, GasPriority, TRANSFER_GAS},
    ChainClient, EstimationFailure, TxBuilderError,
};

/// What the caller wants to send. Every unset field is filled in by [`TransactionBuilder`].
///
/// Setting `gas_price` asks for a legacy transaction, setting either fee-market field asks
/// for an EIP-1559 transaction. Mixing the two is rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxIntent {
    /// Recipient, `None` for contract deployments
    pub to: Option<Address>,
    /// Transferred value in wei
    pub value: U256,
    /// Call data or init code
    pub data: Bytes,
    /// Explicit nonce, used verbatim
    pub nonce: Option<U256>,
    /// Explicit gas limit
    pub gas: Option<U256>,
    /// Legacy gas price
    pub gas_price: Option<U256>,
    /// EIP-1559 priority fee
    pub max_priority_fee_per_gas: Option<U256>,
    /// EIP-1559 fee cap
    pub max_fee_per_gas: Option<U256>,
}

impl TxIntent {
    /// Creates an empty intent
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a contract deployment intent
    pub fn deploy<T: Into<Bytes>>(init_code: T) -> Self {
        Self { data: init_code.into(), ..Default::default() }
    }

    /// Sets the `to` field
    #[must_use]
    pub fn to<T: Into<Address>>(mut self, to: T) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sets the `value` field
    #[must_use]
    pub fn value<T: Into<U256>>(mut self, value: T) -> Self {
        self.value = value.into();
        self
    }

    /// Sets the `data` field
    #[must_use]
    pub fn data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = data.into();
        self
    }

    /// Sets the `nonce` field
    #[must_use]
    pub fn nonce<T: Into<U256>>(mut self, nonce: T) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Sets the `gas` field
    #[must_use]
    pub fn gas<T: Into<U256>>(mut self, gas: T) -> Self {
        self.gas = Some(gas.into());
        self
    }

    /// Sets the `gas_price` field
    #[must_use]
    pub fn gas_price<T: Into<U256>>(mut self, gas_price: T) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    /// Sets the `max_priority_fee_per_gas` field
    #[must_use]
    pub fn max_priority_fee_per_gas<T: Into<U256>>(mut self, tip: T) -> Self {
        self.max_priority_fee_per_gas = Some(tip.into());
        self
    }

    /// Sets the `max_fee_per_gas` field
    #[must_use]
    pub fn max_fee_per_gas<T: Into<U256>>(mut self, fee_cap: T) -> Self {
        self.max_fee_per_gas = Some(fee_cap.into());
        self
    }
}

/// Pricing chosen for a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pricing {
    Legacy { gas_price: U256 },
    Dynamic { max_fee_per_gas: U256, max_priority_fee_per_gas: U256 },
}

#[derive(Clone, Debug)]
/// Turns a [`TxIntent`] into a signed, submitted transaction.
///
/// The builder resolves the fee model, gas limit and nonce against a [`ChainClient`], signs
/// with any [`Signer`] and broadcasts the result. Nothing is submitted unless it was signed
/// and recovered to the signer's address.
///
/// ```no_run
/// use evmkms_middleware::{GasPriority, TransactionBuilder, TxIntent};
/// use evmkms_signers::Signer;
/// use ethers_core::types::Address;
/// use ethers_providers::{Http, Provider};
///
/// # async fn foo<S: Signer + 'static>(signer: S) -> Result<(), Box<dyn std::error::Error>> {
/// let provider = Provider::<Http>::try_from("http://localhost:8545")?;
/// let builder = TransactionBuilder::new(provider, signer);
///
/// // a contract call priced by the node
/// let to = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045".parse::<Address>()?;
/// let call = builder.build(TxIntent::new().to(to).data(vec![0xd0, 0xe3, 0x0d, 0xb0])).await?;
///
/// // sweep 1 ether minus its own fee
/// let sweep = builder.build_transfer(to, 1_000_000_000_000_000_000u64, GasPriority::Average).await?;
/// # Ok(())
/// # }
/// ```
pub struct TransactionBuilder<C, S> {
    client: C,
    signer: S,
    no_send: bool,
}

impl<C, S> TransactionBuilder<C, S>
where
    C: ChainClient,
    S: Signer,
{
    /// Creates a builder submitting through `client` and signing with `signer`
    pub fn new(client: C, signer: S) -> Self {
        Self { client, signer, no_send: false }
    }

    /// When set, transactions are signed but never submitted
    #[must_use]
    pub fn no_send(mut self, no_send: bool) -> Self {
        self.no_send = no_send;
        self
    }

    /// Returns a reference to the builder's client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns a reference to the builder's signer
    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Returns the sender address
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Resolves, signs and (unless dry-running) submits the transaction for `intent`
    #[instrument(err, skip(self))]
    pub async fn build(&self, intent: TxIntent) -> Result<SignedTransaction, TxBuilderError<C, S>> {
        let tx = self.prepare(intent).await?;
        self.sign_and_send(tx).await
    }

    /// Resolves pricing, nonce and gas limit for `intent` without signing
    pub async fn prepare(&self, intent: TxIntent) -> Result<TypedTransaction, TxBuilderError<C, S>> {
        let from = self.address();
        let pricing = self.pricing(&intent).await?;

        let mut tx: TypedTransaction = match pricing {
            Pricing::Legacy { gas_price } => {
                let mut tx =
                    TransactionRequest::new().from(from).value(intent.value).data(intent.data);
                tx.to = intent.to.map(Into::into);
                tx.gas_price(gas_price).into()
            }
            Pricing::Dynamic { max_fee_per_gas, max_priority_fee_per_gas } => {
                let mut tx = Eip1559TransactionRequest::new()
                    .from(from)
                    .value(intent.value)
                    .data(intent.data);
                tx.to = intent.to.map(Into::into);
                tx.max_fee_per_gas(max_fee_per_gas)
                    .max_priority_fee_per_gas(max_priority_fee_per_gas)
                    .into()
            }
        };
        tx.set_chain_id(self.signer.chain_id());

        let nonce = match intent.nonce {
            Some(nonce) => nonce,
            None => self.client.pending_nonce(from).await.map_err(TxBuilderError::ClientError)?,
        };
        tx.set_nonce(nonce);

        let gas = match intent.gas {
            Some(gas) => gas,
            None => self.estimate_gas(&tx).await?,
        };
        tx.set_gas(gas);

        trace!(?tx, "prepared transaction");
        Ok(tx)
    }

    /// Signs `tx` and, unless dry-running, submits it
    pub async fn sign_and_send(
        &self,
        tx: TypedTransaction,
    ) -> Result<SignedTransaction, TxBuilderError<C, S>> {
        let signed =
            self.signer.sign_transaction(&tx).await.map_err(TxBuilderError::SignerError)?;

        if self.no_send {
            debug!(hash = ?signed.hash(), "dry run, not submitting");
            return Ok(signed)
        }

        let hash = self
            .client
            .send_raw_transaction(signed.rlp())
            .await
            .map_err(TxBuilderError::ClientError)?;
        debug!(?hash, "submitted transaction");
        Ok(signed)
    }

    /// Sends `value` to `to` minus the fee the transfer itself costs.
    ///
    /// The fee is reserved as `21000 * (base_fee * priority + tip)`, so the sender's balance
    /// only needs to cover `value`. Requires an EIP-1559 chain.
    #[instrument(err, skip(self))]
    pub async fn build_transfer<T: Into<U256> + std::fmt::Debug>(
        &self,
        to: Address,
        value: T,
        priority: GasPriority,
    ) -> Result<SignedTransaction, TxBuilderError<C, S>> {
        let value = value.into();
        let base_fee = self
            .client
            .latest_block()
            .await
            .map_err(TxBuilderError::ClientError)?
            .and_then(|block| block.base_fee_per_gas)
            .ok_or(TxBuilderError::BaseFeeUnavailable)?;
        let tip = self.client.suggest_tip().await.map_err(TxBuilderError::ClientError)?;
        let fee_cap = max_fee_per_gas(base_fee, tip);
        check_fee_bounds(fee_cap, tip)?;

        let fee = estimate_transfer_fee(base_fee, tip, priority);
        if value <= fee {
            return Err(TxBuilderError::InsufficientFunds { value, fee })
        }
        debug!(%base_fee, %tip, %fee, "reserving transfer fee");

        let from = self.address();
        let nonce = self.client.pending_nonce(from).await.map_err(TxBuilderError::ClientError)?;
        let tx = Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .value(value - fee)
            .gas(TRANSFER_GAS)
            .max_fee_per_gas(fee_cap)
            .max_priority_fee_per_gas(tip)
            .nonce(nonce)
            .chain_id(self.signer.chain_id());

        self.sign_and_send(tx.into()).await
    }

    async fn pricing(&self, intent: &TxIntent) -> Result<Pricing, TxBuilderError<C, S>> {
        let tip = intent.max_priority_fee_per_gas;
        let fee_cap = intent.max_fee_per_gas;

        if let Some(gas_price) = intent.gas_price {
            if tip.is_some() || fee_cap.is_some() {
                return Err(TxBuilderError::FeeConflict(
                    "both gasPrice and (maxFeePerGas or maxPriorityFeePerGas) specified",
                ))
            }
            debug!(%gas_price, "legacy pricing requested");
            return Ok(Pricing::Legacy { gas_price })
        }

        if let (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) = (fee_cap, tip) {
            check_fee_bounds(max_fee_per_gas, max_priority_fee_per_gas)?;
            debug!("fee-market pricing requested");
            return Ok(Pricing::Dynamic { max_fee_per_gas, max_priority_fee_per_gas })
        }

        let head = self.client.latest_block().await.map_err(TxBuilderError::ClientError)?;
        match head.and_then(|block| block.base_fee_per_gas) {
            Some(base_fee) => {
                let max_priority_fee_per_gas = match tip {
                    Some(tip) => tip,
                    None => self.client.suggest_tip().await.map_err(TxBuilderError::ClientError)?,
                };
                let max_fee_per_gas =
                    fee_cap.unwrap_or_else(|| max_fee_per_gas(base_fee, max_priority_fee_per_gas));
                check_fee_bounds(max_fee_per_gas, max_priority_fee_per_gas)?;
                debug!(%base_fee, %max_fee_per_gas, %max_priority_fee_per_gas, "fee-market pricing");
                Ok(Pricing::Dynamic { max_fee_per_gas, max_priority_fee_per_gas })
            }
            None => {
                if tip.is_some() || fee_cap.is_some() {
                    return Err(TxBuilderError::FeeConflict(
                        "maxFeePerGas or maxPriorityFeePerGas specified but london is not active yet",
                    ))
                }
                let gas_price =
                    self.client.suggest_gas_price().await.map_err(TxBuilderError::ClientError)?;
                debug!(%gas_price, "no base fee, legacy pricing");
                Ok(Pricing::Legacy { gas_price })
            }
        }
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, TxBuilderError<C, S>> {
        if let Some(to) = tx.to_addr() {
            let code = self.client.pending_code(*to).await.map_err(TxBuilderError::ClientError)?;
            if code.is_empty() {
                return Err(TxBuilderError::GasEstimationFailure(EstimationFailure::NoCode(*to)))
            }
        }
        self.client
            .estimate_gas(tx)
            .await
            .map_err(|e| TxBuilderError::GasEstimationFailure(EstimationFailure::Simulation(e)))
    }
}

fn check_fee_bounds<C: ChainClient, S: Signer>(
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
) -> Result<(), TxBuilderError<C, S>> {
    if max_fee_per_gas < max_priority_fee_per_gas {
        return Err(TxBuilderError::InvalidFeeBounds { max_fee_per_gas, max_priority_fee_per_gas })
    }
    Ok(())
}
