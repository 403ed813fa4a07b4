use crate::common::{FakeChain, LocalKeySigner};
use ethers_core::types::{transaction::eip2718::TypedTransaction, Address, U256};
use evmkms_middleware::{
    fees::{estimate_transfer_fee, TRANSFER_GAS},
    EstimationFailure, GasPriority, TransactionBuilder, TxBuilderError, TxIntent,
};
use evmkms_signers::{SignatureError, Signer};

const GWEI: u64 = 1_000_000_000;

fn contract() -> Address {
    Address::repeat_byte(0xc0)
}

fn builder(chain: &FakeChain) -> TransactionBuilder<FakeChain, LocalKeySigner> {
    TransactionBuilder::new(chain.clone(), LocalKeySigner::new(0x11, 1))
}

#[tokio::test]
async fn base_fee_selects_eip1559() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    let builder = builder(&chain);

    let signed = builder.build(TxIntent::new().to(contract()).data(vec![0x01])).await.unwrap();

    let TypedTransaction::Eip1559(tx) = signed.tx() else { panic!("expected eip1559 tx") };
    assert_eq!(tx.max_priority_fee_per_gas, Some(U256::from(2 * GWEI)));
    assert_eq!(tx.max_fee_per_gas, Some(U256::from(22 * GWEI)));
    assert!(tx.max_fee_per_gas >= tx.max_priority_fee_per_gas);
    assert_eq!(tx.chain_id.map(|id| id.as_u64()), Some(1));
    assert_eq!(tx.gas, Some(U256::from(50_000)));
    assert_eq!(signed.recover_from().unwrap(), builder.address());
    assert_eq!(chain.sent(), vec![signed.rlp()]);
}

#[tokio::test]
async fn no_base_fee_selects_legacy() {
    let chain = FakeChain::pre_london(7 * GWEI);
    let signed =
        builder(&chain).build(TxIntent::new().to(contract()).data(vec![0x01])).await.unwrap();

    let TypedTransaction::Legacy(tx) = signed.tx() else { panic!("expected legacy tx") };
    assert_eq!(tx.gas_price, Some(U256::from(7 * GWEI)));
    assert!(signed.signature().v == 37 || signed.signature().v == 38);
}

#[tokio::test]
async fn explicit_gas_price_skips_fee_discovery() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    let intent = TxIntent::new().to(contract()).gas_price(3 * GWEI).gas(30_000u64).nonce(4u64);
    let signed = builder(&chain).build(intent).await.unwrap();

    assert!(matches!(signed.tx(), TypedTransaction::Legacy(_)));
    assert_eq!(signed.tx().nonce(), Some(&U256::from(4)));
    assert_eq!(chain.calls(), vec!["send_raw_transaction"]);
}

#[tokio::test]
async fn explicit_fee_market_fields_skip_base_fee() {
    let chain = FakeChain::pre_london(GWEI);
    let intent = TxIntent::new()
        .to(contract())
        .max_fee_per_gas(5 * GWEI)
        .max_priority_fee_per_gas(GWEI)
        .gas(30_000u64)
        .nonce(0u64);
    let signed = builder(&chain).no_send(true).build(intent).await.unwrap();

    assert!(matches!(signed.tx(), TypedTransaction::Eip1559(_)));
    assert!(chain.calls().is_empty());
}

#[tokio::test]
async fn gas_price_with_tip_conflicts_before_any_call() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    let intent = TxIntent::new().to(contract()).gas_price(GWEI).max_priority_fee_per_gas(GWEI);

    let err = builder(&chain).build(intent).await.unwrap_err();
    assert!(matches!(err, TxBuilderError::FeeConflict(_)));
    assert!(chain.calls().is_empty());
}

#[tokio::test]
async fn tip_on_pre_london_chain_conflicts() {
    let chain = FakeChain::pre_london(GWEI);
    let intent = TxIntent::new().to(contract()).max_priority_fee_per_gas(GWEI);

    let err = builder(&chain).build(intent).await.unwrap_err();
    assert!(matches!(err, TxBuilderError::FeeConflict(_)));
}

#[tokio::test]
async fn fee_cap_below_tip_is_rejected() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    let intent =
        TxIntent::new().to(contract()).max_fee_per_gas(GWEI).max_priority_fee_per_gas(2 * GWEI);

    let err = builder(&chain).build(intent).await.unwrap_err();
    match err {
        TxBuilderError::InvalidFeeBounds { max_fee_per_gas, max_priority_fee_per_gas } => {
            assert_eq!(max_fee_per_gas, U256::from(GWEI));
            assert_eq!(max_priority_fee_per_gas, U256::from(2 * GWEI));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(chain.calls().is_empty());
}

#[tokio::test]
async fn call_to_address_without_code_fails_estimation() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    chain.update(|state| state.code = Default::default());

    let err = builder(&chain).build(TxIntent::new().to(contract())).await.unwrap_err();
    assert!(matches!(
        err,
        TxBuilderError::GasEstimationFailure(EstimationFailure::NoCode(addr)) if addr == contract()
    ));
    assert!(!chain.calls().contains(&"estimate_gas"));
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn reverted_simulation_fails_estimation() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    chain.update(|state| state.gas_estimate = None);

    let err = builder(&chain).build(TxIntent::new().to(contract())).await.unwrap_err();
    assert!(matches!(err, TxBuilderError::GasEstimationFailure(EstimationFailure::Simulation(_))));
}

#[tokio::test]
async fn deployments_skip_code_check() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    let signed = builder(&chain).build(TxIntent::deploy(vec![0x60, 0x80])).await.unwrap();

    assert!(signed.tx().to().is_none());
    assert!(!chain.calls().contains(&"pending_code"));
}

#[tokio::test]
async fn pending_nonce_is_used_when_unset() {
    let chain = FakeChain::london(10 * GWEI, 2 * GWEI);
    chain.update(|state| state.nonce = 42u64.into());

    let tx = builder(&chain).prepare(TxIntent::new().to(contract())).await.unwrap();
    assert_eq!(tx.nonce(), Some(&U256::from(42)));
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn transfer_reserves_its_own_fee() {
    let chain = FakeChain::london(20 * GWEI, 50 * GWEI);
    let value = U256::exp10(18);
    let signed = builder(&chain)
        .build_transfer(Address::repeat_byte(0x01), value, GasPriority::Low)
        .await
        .unwrap();

    // 21000 * (20 gwei * 2.0 + 50 gwei)
    let fee = U256::from(21_000u64 * 90 * GWEI);
    assert_eq!(estimate_transfer_fee((20 * GWEI).into(), (50 * GWEI).into(), GasPriority::Low), fee);

    let TypedTransaction::Eip1559(tx) = signed.tx() else { panic!("expected eip1559 tx") };
    assert_eq!(tx.value, Some(value - fee));
    assert_eq!(tx.gas, Some(U256::from(TRANSFER_GAS)));
    assert_eq!(tx.max_fee_per_gas, Some(U256::from(90 * GWEI)));
    assert_eq!(chain.sent().len(), 1);
}

#[tokio::test]
async fn transfer_smaller_than_fee_is_rejected() {
    let chain = FakeChain::london(20 * GWEI, 50 * GWEI);
    let err = builder(&chain)
        .build_transfer(Address::repeat_byte(0x01), 1_000u64, GasPriority::High)
        .await
        .unwrap_err();

    assert!(matches!(err, TxBuilderError::InsufficientFunds { .. }));
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn transfer_requires_base_fee() {
    let chain = FakeChain::pre_london(GWEI);
    let err = builder(&chain)
        .build_transfer(Address::repeat_byte(0x01), U256::exp10(18), GasPriority::Average)
        .await
        .unwrap_err();

    assert!(matches!(err, TxBuilderError::BaseFeeUnavailable));
}

#[tokio::test]
async fn signer_chain_id_is_bound() {
    let chain = FakeChain::london(GWEI, GWEI);
    let signer = LocalKeySigner::new(0x22, 1).with_chain_id(137u64);
    let builder = TransactionBuilder::new(chain, signer).no_send(true);

    let signed = builder.build(TxIntent::new().to(contract())).await.unwrap();
    assert_eq!(signed.tx().chain_id().map(|id| id.as_u64()), Some(137));
}

#[tokio::test]
async fn foreign_signature_is_never_submitted() {
    let chain = FakeChain::london(GWEI, GWEI);
    let claimed = Address::repeat_byte(0xaa);
    let signer = LocalKeySigner::new(0x11, 1).claiming(claimed);
    let builder = TransactionBuilder::new(chain.clone(), signer);

    let err = builder.build(TxIntent::new().to(contract()).data(vec![0x01])).await.unwrap_err();
    match err {
        TxBuilderError::SignerError(SignatureError::UnauthorizedSigner { expected, recovered }) => {
            assert_eq!(expected, claimed);
            assert_eq!(recovered, LocalKeySigner::new(0x11, 1).address());
        }
        err => panic!("unexpected error {err:?}"),
    }
    assert!(chain.sent().is_empty());
    assert!(!chain.calls().contains(&"send_raw_transaction"));
}
