//! End-to-end scenarios through the host-facing ports.

use flowshares_core::constants::{SECONDS_PER_MONTH, SHARE_SCALE, TOKEN};
use flowshares_core::error::{FlowSharesError, LedgerError};
use flowshares_core::traits::{FlowCallbacks, FlowSharesView};
use flowshares_core::types::{IndexTotals, Subscription};
use flowshares_engine::{EngineSnapshot, FlowSharesEngine};
use flowshares_tests::helpers::{monthly_rate, pid, Harness};

const T0: u64 = 1_700_000_000;

#[test]
fn thirty_day_stream_then_double_rate() {
    let mut h = Harness::new();
    let alice = pid(0xA1);
    let rate = monthly_rate(100);
    assert_eq!(rate, 38_580_246_913_580);

    assert_eq!(h.engine.notify_flow_started(alice, rate, T0).unwrap(), 0);
    assert_eq!(h.shares(&alice), 38_580);
    assert_eq!(h.engine.index_totals(), IndexTotals { approved: 0, pending: 38_580 });

    let at = T0 + SECONDS_PER_MONTH;
    assert_eq!(h.engine.calc_uninvested(&alice, at).unwrap(), 99_999_999_999_999_360_000);

    let uninvested = h.engine.notify_flow_updated(alice, 2 * rate, at).unwrap();
    assert_eq!(uninvested, 99_999_999_999_999_360_000);
    assert_eq!(h.shares(&alice), 77_160);
    assert_eq!(h.engine.calc_uninvested(&alice, at).unwrap(), 0);
    h.engine.check_invariants().unwrap();
}

#[test]
fn two_to_one_split_of_one_hundred_tokens() {
    let mut h = Harness::new();
    let (a, b) = (pid(1), pid(2));
    h.join(a, 2 * SHARE_SCALE, T0).unwrap();
    h.join(b, SHARE_SCALE, T0).unwrap();
    h.deposit(100 * TOKEN);

    let receipt = h.engine.distribute(&mut h.asset).unwrap();
    assert_eq!(receipt.sequence, 1);
    assert_eq!(receipt.total_approved_units, 3);
    assert_eq!(h.asset.balance_of(&a), 66_666_666_666_666_666_666);
    assert_eq!(h.asset.balance_of(&b), 33_333_333_333_333_333_333);
    assert_eq!(receipt.dust, 1);
    h.assert_conserved();
    h.assert_credits_match_payouts();
}

#[test]
fn pending_subscriber_receives_nothing_until_approval() {
    let mut h = Harness::new();
    let (a, b) = (pid(1), pid(2));
    h.join(a, SHARE_SCALE, T0).unwrap();
    h.engine.notify_flow_started(b, SHARE_SCALE, T0).unwrap();
    h.deposit(1_000);

    h.engine.distribute(&mut h.asset).unwrap();
    assert_eq!(h.asset.balance_of(&a), 1_000);
    assert_eq!(h.asset.balance_of(&b), 0);

    h.engine.notify_subscription_approved(b).unwrap();
    h.deposit(1_000);
    h.engine.distribute(&mut h.asset).unwrap();
    assert_eq!(h.asset.balance_of(&a), 1_500);
    assert_eq!(h.asset.balance_of(&b), 500);
    h.assert_conserved();
}

#[test]
fn revoked_subscriber_stops_receiving() {
    let mut h = Harness::new();
    let (a, b) = (pid(1), pid(2));
    h.join(a, SHARE_SCALE, T0).unwrap();
    h.join(b, SHARE_SCALE, T0).unwrap();
    h.engine.notify_subscription_revoked(b).unwrap();
    assert_eq!(h.engine.index_totals(), IndexTotals { approved: 1, pending: 1 });

    h.deposit(10);
    h.engine.distribute(&mut h.asset).unwrap();
    assert_eq!(h.asset.balance_of(&a), 10);
    assert_eq!(
        h.engine.subscription(&b),
        Some(Subscription { units: 1, approved: false, credited: 0 })
    );
}

#[test]
fn stopped_flow_keeps_subscription_with_zero_units() {
    let mut h = Harness::new();
    let a = pid(1);
    h.join(a, 5 * SHARE_SCALE, T0).unwrap();
    let uninvested = h.engine.notify_flow_stopped(a, T0 + 10).unwrap();
    assert_eq!(uninvested, 50 * SHARE_SCALE);
    assert_eq!(h.shares(&a), 0);
    assert_eq!(h.engine.index_totals(), IndexTotals::default());
    assert!(h.engine.subscription(&a).unwrap().approved);

    h.deposit(7);
    assert!(h.engine.distribute(&mut h.asset).unwrap().is_noop());
    assert_eq!(h.asset.total_paid(), 0);
}

#[test]
fn dust_accumulates_into_next_distribution() {
    let mut h = Harness::new();
    for seed in 1..=3 {
        h.join(pid(seed), SHARE_SCALE, T0).unwrap();
    }
    h.deposit(10);
    let first = h.engine.distribute(&mut h.asset).unwrap();
    assert_eq!((first.distributed, first.dust), (9, 1));

    h.deposit(2);
    let second = h.engine.distribute(&mut h.asset).unwrap();
    assert_eq!(second.pool_balance, 3);
    assert_eq!((second.distributed, second.dust), (3, 0));
    for seed in 1..=3 {
        assert_eq!(h.asset.balance_of(&pid(seed)), 4);
    }
}

#[test]
fn out_of_order_update_rejected_without_side_effects() {
    let mut h = Harness::new();
    let a = pid(1);
    h.join(a, SHARE_SCALE, T0).unwrap();
    let before = h.engine.snapshot();

    let err = h.engine.notify_flow_updated(a, 3 * SHARE_SCALE, T0 - 1).unwrap_err();
    assert!(matches!(err, FlowSharesError::Ledger(LedgerError::OutOfOrder { .. })));
    assert_eq!(h.engine.snapshot(), before);
}

#[test]
fn snapshot_file_restores_identical_queries() {
    let mut h = Harness::new();
    h.join(pid(1), monthly_rate(100), T0).unwrap();
    h.join(pid(2), monthly_rate(50), T0 + 5).unwrap();
    h.engine.notify_flow_started(pid(3), monthly_rate(10), T0 + 9).unwrap();
    h.deposit(3 * TOKEN);
    h.engine.distribute(&mut h.asset).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.bin");
    std::fs::write(&path, h.engine.snapshot().encode().unwrap()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let restored = FlowSharesEngine::restore(&EngineSnapshot::decode(&bytes).unwrap()).unwrap();
    let now = T0 + SECONDS_PER_MONTH;
    for seed in 1..=3 {
        let p = pid(seed);
        assert_eq!(restored.current_shares(&p), h.engine.current_shares(&p));
        assert_eq!(restored.subscription(&p), h.engine.subscription(&p));
        assert_eq!(
            restored.calc_uninvested(&p, now).unwrap(),
            h.engine.calc_uninvested(&p, now).unwrap()
        );
    }
    assert_eq!(restored.index_totals(), h.engine.index_totals());
    assert_eq!(restored.distributor_state(), h.engine.distributor_state());
}
