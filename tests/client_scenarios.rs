//! End-to-end client sessions against the in-memory ledger, on paused time.

use std::sync::Arc;
use std::time::Duration;

use campus_root::economics::{
    AccountId, ActionOutcome, AssetId, ErrorKind, FixedPointAmount, LedgerAction, Scale, TrackId,
};
use campus_root::wallet::{
    CampusClient, ClientConfig, Fault, InMemoryLedger, LedgerService, MemoryLedgerConfig, Snapshot, StateKey,
};
use tokio_test::{assert_err, assert_ok};

fn eth(n: u128) -> FixedPointAmount {
    FixedPointAmount::from_units(n, Scale::STANDARD).unwrap()
}

fn yd(n: u128) -> FixedPointAmount {
    FixedPointAmount::from_units(n, Scale::STANDARD).unwrap()
}

fn usdt(n: u128) -> FixedPointAmount {
    FixedPointAmount::from_units(n, Scale::STABLE).unwrap()
}

fn alice() -> AccountId {
    AccountId::new("alice")
}

fn operator() -> AccountId {
    AccountId::new("operator")
}

fn usdt_track() -> TrackId {
    TrackId::new("usdt")
}

fn usdt_pool() -> AccountId {
    AccountId::new("staking-usdt")
}

/// Reserves of 10 ETH and 1,000,000 YD; alice holds 5 ETH and 1000 USDT
fn ledger(read_lag: Duration) -> InMemoryLedger {
    let ledger = InMemoryLedger::new(MemoryLedgerConfig {
        confirmation_delay: Duration::from_millis(500),
        read_lag,
    });
    ledger.credit(&operator(), &AssetId::new("eth"), eth(10)).unwrap();
    ledger
        .apply_now(&operator(), &LedgerAction::AddCurrencyReserve { amount: eth(10) })
        .unwrap();
    ledger
        .apply_now(&operator(), &LedgerAction::MintTokenReserve { amount: yd(1_000_000) })
        .unwrap();
    ledger.credit(&alice(), &AssetId::new("eth"), eth(5)).unwrap();
    ledger.credit(&alice(), &AssetId::new("usdt"), usdt(1000)).unwrap();
    ledger
}

fn client(ledger: &InMemoryLedger, actor: AccountId, config: ClientConfig) -> CampusClient {
    let shared: Arc<dyn LedgerService> = Arc::new(ledger.clone());
    CampusClient::new(shared, actor, config).unwrap()
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_approve_then_stake() {
    let ledger = ledger(Duration::ZERO);
    let alice_client = client(&ledger, alice(), ClientConfig::default());

    assert_ok!(alice_client.approve(&usdt_pool(), &AssetId::new("usdt"), usdt(500)).await);
    let staked = assert_ok!(alice_client.stake(&usdt_track(), usdt(500)).await);
    match staked.outcome {
        ActionOutcome::Staked { record, .. } => {
            assert_eq!(record.staked_amount, usdt(500).raw());
            assert_eq!(record.receipt_token_balance, usdt(500).raw());
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let state = ledger.snapshot();
    assert_eq!(state.allowance(&alice(), &usdt_pool(), &AssetId::new("usdt")), 0);
    assert_eq!(state.balance(&alice(), &AssetId::new("usdt")), usdt(500).raw());
    assert_eq!(ledger.block_height(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dependent_state_refreshes_after_grace_period() {
    let ledger = ledger(Duration::ZERO);
    let alice_client = client(&ledger, alice(), ClientConfig::default());
    let balance_key = StateKey::Balance {
        owner: alice(),
        asset: AssetId::new("usdt"),
    };

    assert_ok!(alice_client.approve(&usdt_pool(), &AssetId::new("usdt"), usdt(500)).await);
    assert_ok!(alice_client.stake(&usdt_track(), usdt(500)).await);

    // Still the value read while validating the stake
    let cache = alice_client.session().cache();
    assert_eq!(cache.peek(&balance_key), Some(Snapshot::Amount(usdt(1000).raw())));

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(cache.peek(&balance_key), Some(Snapshot::Amount(usdt(1000).raw())));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.peek(&balance_key), Some(Snapshot::Amount(usdt(500).raw())));
    assert_eq!(alice_client.refresh_scheduler().pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lagging_allowance_fails_closed() {
    let ledger = ledger(Duration::from_millis(1000));
    let alice_client = client(&ledger, alice(), ClientConfig::default());

    assert_ok!(alice_client.approve(&usdt_pool(), &AssetId::new("usdt"), usdt(500)).await);
    assert_eq!(ledger.block_height(), 1);

    let err = assert_err!(alice_client.stake(&usdt_track(), usdt(500)).await);
    assert_eq!(err.kind, ErrorKind::NeedsApproval);
    assert_eq!(ledger.block_height(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_ok!(alice_client.stake(&usdt_track(), usdt(500)).await);
    assert_eq!(ledger.block_height(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_user_rejection_releases_lock() {
    let ledger = ledger(Duration::ZERO);
    let alice_client = client(&ledger, alice(), ClientConfig::default());

    ledger.inject_fault(Fault::UserRejected);
    let err = assert_err!(alice_client.buy(eth(1)).await);
    assert_eq!(err.kind, ErrorKind::UserRejected);
    assert!(err.is_retryable());
    assert_eq!(ledger.block_height(), 0);

    assert_ok!(alice_client.buy(eth(1)).await);
    assert_eq!(ledger.snapshot().balance(&alice(), &AssetId::new("yd")), yd(4000).raw());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_duplicate_action_is_rejected() {
    let ledger = ledger(Duration::ZERO);
    let alice_client = client(&ledger, alice(), ClientConfig::default());
    assert_ok!(alice_client.approve(&usdt_pool(), &AssetId::new("usdt"), usdt(500)).await);

    let track = usdt_track();
    let (first, second) = tokio::join!(
        alice_client.stake(&track, usdt(100)),
        alice_client.stake(&track, usdt(100)),
    );
    assert_ok!(first);
    assert_eq!(assert_err!(second).kind, ErrorKind::ActionInFlight);
    assert_eq!(ledger.snapshot().pool(&usdt_track()).unwrap().record(&alice()).staked_amount, usdt(100).raw());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_action_times_out() {
    let ledger = ledger(Duration::ZERO);
    let config = ClientConfig {
        confirmation_timeout_ms: 5000,
        ..ClientConfig::default()
    };
    let alice_client = client(&ledger, alice(), config);

    ledger.inject_fault(Fault::Stall);
    let err = assert_err!(alice_client.buy(eth(1)).await);
    assert_eq!(err.kind, ErrorKind::Timeout);
    // The client dropped its handle, so the ledger holds nothing for it
    assert_eq!(ledger.stalled_actions(), 0);
    assert!(!alice_client.session().is_in_flight(&LedgerAction::Buy { currency_amount: eth(1) }));
}

#[tokio::test(start_paused = true)]
async fn test_course_purchase_once() {
    let ledger = ledger(Duration::ZERO);
    let alice_client = client(&ledger, alice(), ClientConfig::default());
    let bob_client = client(&ledger, AccountId::new("bob"), ClientConfig::default());

    let created = assert_ok!(bob_client.create_course("  Rust 101 ", "Traits and generics", yd(100)).await);
    let course_id = match created.outcome {
        ActionOutcome::CourseCreated(record) => {
            assert_eq!(record.title, "Rust 101");
            assert!(record.id.as_str().ends_with("_bob"));
            record.id
        }
        other => panic!("unexpected outcome {:?}", other),
    };

    assert_ok!(alice_client.buy(eth(1)).await);
    let gate = AccountId::new("course-gate");
    let err = assert_err!(alice_client.purchase(&course_id).await);
    assert_eq!(err.kind, ErrorKind::NeedsApproval);

    assert_ok!(alice_client.approve(&gate, &AssetId::new("yd"), yd(200)).await);
    assert_ok!(alice_client.purchase(&course_id).await);
    assert_eq!(alice_client.session().profile().purchased_courses, vec![course_id.clone()]);

    // Cached purchases catch up once the refresh runs
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(assert_ok!(alice_client.has_purchased(&course_id).await));

    let height = ledger.block_height();
    let err = assert_err!(alice_client.purchase(&course_id).await);
    assert_eq!(err.kind, ErrorKind::AlreadyPurchased);
    assert_eq!(ledger.block_height(), height);

    let state = ledger.snapshot();
    assert_eq!(state.balance(&AccountId::new("bob"), &AssetId::new("yd")), yd(100).raw());
    assert_eq!(state.allowance(&alice(), &gate, &AssetId::new("yd")), yd(100).raw());
}

#[tokio::test(start_paused = true)]
async fn test_paused_track_reports_pause_before_balance() {
    let ledger = ledger(Duration::ZERO);
    let operator_client = client(&ledger, operator(), ClientConfig::default());
    let capability = operator_client.operator_capability().cloned().unwrap();
    assert_ok!(operator_client.set_paused(&capability, &usdt_track(), true).await);

    // bob holds no USDT and has approved nothing
    let bob_client = client(&ledger, AccountId::new("bob"), ClientConfig::default());
    let err = assert_err!(bob_client.stake(&usdt_track(), usdt(10)).await);
    assert_eq!(err.kind, ErrorKind::PoolPaused);

    // The other track is unaffected
    let err = assert_err!(bob_client.stake(&TrackId::new("link"), eth(1)).await);
    assert_eq!(err.kind, ErrorKind::InsufficientBalance);
}

#[tokio::test(start_paused = true)]
async fn test_yield_claim_and_history() {
    let ledger = ledger(Duration::ZERO);
    let alice_client = client(&ledger, alice(), ClientConfig::default());
    let operator_client = client(&ledger, operator(), ClientConfig::default());
    let capability = operator_client.operator_capability().cloned().unwrap();

    let err = assert_err!(alice_client.claim_rewards(&usdt_track()).await);
    assert_eq!(err.kind, ErrorKind::NoRewardsAvailable);

    assert_ok!(alice_client.approve(&usdt_pool(), &AssetId::new("usdt"), usdt(500)).await);
    assert_ok!(alice_client.stake(&usdt_track(), usdt(500)).await);
    assert_ok!(operator_client.accrue_yield(&capability, &usdt_track(), usdt(25)).await);
    let claimed = assert_ok!(alice_client.claim_rewards(&usdt_track()).await);
    assert!(matches!(claimed.outcome, ActionOutcome::RewardsClaimed { amount, .. } if amount == usdt(25).raw()));

    assert_ok!(alice_client.buy(eth(1)).await);
    let page = assert_ok!(alice_client.history(None).await);
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.next_cursor, None);
}
