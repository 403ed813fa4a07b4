use ethers_core::types::{Transaction, TransactionReceipt, TxHash};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{ChainClient, WaitError};

/// Default number of lookups before a transaction is considered lost
pub const DEFAULT_ATTEMPTS: usize = 20;

/// Default pause between transaction lookups
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Default pause between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for a transaction to be mined
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(720);

/// Waits for a submitted transaction in two phases.
///
/// First the transaction has to become visible to the node, which is retried a bounded
/// number of times. Then its receipt is polled until a wall-clock deadline passes. A timeout
/// only means the wait gave up: the transaction may still be mined afterwards.
#[derive(Clone, Debug)]
pub struct ConfirmationWaiter<'a, C> {
    client: &'a C,
    attempts: usize,
    delay: Duration,
    poll_interval: Duration,
}

impl<'a, C: ChainClient> ConfirmationWaiter<'a, C> {
    /// Creates a waiter with the default attempts, delay and poll interval
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the number of transaction lookups
    #[must_use]
    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the pause between transaction lookups
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the pause between receipt polls
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Waits until the node knows the transaction.
    ///
    /// Both "not found" and failed lookups use up an attempt.
    #[instrument(err, skip(self))]
    pub async fn await_transaction(&self, hash: TxHash) -> Result<Transaction, WaitError<C::Error>> {
        if hash.is_zero() {
            return Err(WaitError::MalformedHash(hash))
        }

        for attempt in 1..=self.attempts {
            match self.client.transaction_by_hash(hash).await {
                Ok(Some(tx)) => {
                    debug!(attempt, "transaction visible");
                    return Ok(tx)
                }
                Ok(None) => trace!(attempt, "transaction not found"),
                Err(err) => trace!(attempt, %err, "transaction lookup failed"),
            }
            if attempt < self.attempts {
                sleep(self.delay).await;
            }
        }

        Err(WaitError::RetriesExhausted(self.attempts))
    }

    /// Polls for the receipt until `timeout` passes.
    ///
    /// A missing receipt means "not mined yet" and is polled again after the poll interval.
    /// Any other failure aborts the wait.
    #[instrument(err, skip(self))]
    pub async fn await_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WaitError<C::Error>> {
        if hash.is_zero() {
            return Err(WaitError::MalformedHash(hash))
        }

        let token = CancellationToken::new();

        let timer = async {
            tokio::select! {
                _ = sleep(timeout) => token.cancel(),
                _ = token.cancelled() => {}
            }
        };
        let poll = async {
            let result = self.poll_receipt(hash, timeout, &token).await;
            token.cancel();
            result
        };

        let ((), result) = tokio::join!(timer, poll);
        if let Err(WaitError::TransactionTimeout(timeout)) = &result {
            warn!(?hash, ?timeout, "gave up waiting for receipt");
        }
        result
    }

    /// Waits for the transaction to become visible, then for its receipt
    pub async fn await_mined(
        &self,
        hash: TxHash,
        timeout: Duration,
    ) -> Result<TransactionReceipt, WaitError<C::Error>> {
        self.await_transaction(hash).await?;
        self.await_receipt(hash, timeout).await
    }

    async fn poll_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<TransactionReceipt, WaitError<C::Error>> {
        loop {
            let receipt = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WaitError::TransactionTimeout(timeout)),
                receipt = self.client.receipt_by_hash(hash) => receipt.map_err(WaitError::ClientError)?,
            };
            if let Some(receipt) = receipt {
                debug!(block = ?receipt.block_number, "transaction mined");
                return Ok(receipt)
            }
            trace!("receipt not available");

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WaitError::TransactionTimeout(timeout)),
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}
