use crate::common::FakeChain;
use ethers_core::types::{Transaction, TransactionReceipt, TxHash, U64};
use evmkms_middleware::{pending::DEFAULT_TIMEOUT, ConfirmationWaiter, WaitError};
use std::time::Duration;
use tokio::time::Instant;

fn hash() -> TxHash {
    TxHash::repeat_byte(0xaa)
}

#[tokio::test(start_paused = true)]
async fn receipt_wait_times_out_after_deadline() {
    let chain = FakeChain::default();
    let waiter = ConfirmationWaiter::new(&chain).poll_interval(Duration::from_secs(1));

    let start = Instant::now();
    let err = waiter.await_receipt(hash(), Duration::from_secs(2)).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(
        err,
        WaitError::TransactionTimeout(timeout) if timeout == Duration::from_secs(2)
    ));
    assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");

    // one poll per interval, not a busy loop
    let polls = chain.calls().iter().filter(|call| **call == "receipt_by_hash").count();
    assert!((2..=3).contains(&polls), "{polls} polls");
}

#[tokio::test(start_paused = true)]
async fn receipt_is_returned_once_mined() {
    let chain = FakeChain::default();
    let receipt = TransactionReceipt {
        transaction_hash: hash(),
        block_number: Some(U64::from(7)),
        ..Default::default()
    };
    chain.update(|state| state.receipt = Some(receipt.clone()));

    let got = ConfirmationWaiter::new(&chain).await_receipt(hash(), DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(got, receipt);
}

#[tokio::test(start_paused = true)]
async fn receipt_errors_abort_the_wait() {
    let chain = FakeChain::default();
    chain.update(|state| state.fail_lookups = true);

    let start = Instant::now();
    let err =
        ConfirmationWaiter::new(&chain).await_receipt(hash(), DEFAULT_TIMEOUT).await.unwrap_err();

    assert!(matches!(err, WaitError::ClientError(_)));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn visibility_phase_is_bounded() {
    let chain = FakeChain::default();
    chain.update(|state| state.fail_lookups = true);

    let err = ConfirmationWaiter::new(&chain)
        .attempts(5)
        .delay(Duration::from_millis(500))
        .await_transaction(hash())
        .await
        .unwrap_err();

    assert!(matches!(err, WaitError::RetriesExhausted(5)));
    assert_eq!(chain.calls().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn visible_transaction_is_returned() {
    let chain = FakeChain::default();
    let tx = Transaction { hash: hash(), ..Default::default() };
    chain.update(|state| state.transaction = Some(tx.clone()));

    let got = ConfirmationWaiter::new(&chain).await_transaction(hash()).await.unwrap();
    assert_eq!(got.hash, hash());
}

#[tokio::test(start_paused = true)]
async fn mined_waits_for_both_phases() {
    let chain = FakeChain::default();
    chain.update(|state| {
        state.transaction = Some(Transaction { hash: hash(), ..Default::default() });
        state.receipt = Some(TransactionReceipt { transaction_hash: hash(), ..Default::default() });
    });

    let receipt =
        ConfirmationWaiter::new(&chain).await_mined(hash(), Duration::from_secs(10)).await.unwrap();
    assert_eq!(receipt.transaction_hash, hash());
    assert_eq!(chain.calls(), vec!["transaction_by_hash", "receipt_by_hash"]);
}

#[tokio::test]
async fn zero_hash_is_rejected_before_any_query() {
    let chain = FakeChain::default();
    let waiter = ConfirmationWaiter::new(&chain);

    let err = waiter.await_transaction(TxHash::zero()).await.unwrap_err();
    assert!(matches!(err, WaitError::MalformedHash(_)));
    let err = waiter.await_receipt(TxHash::zero(), DEFAULT_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, WaitError::MalformedHash(_)));
    assert!(chain.calls().is_empty());
}
