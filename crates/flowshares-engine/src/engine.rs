//! The composed accounting engine.
//!
//! [`FlowSharesEngine`] wires the share converter, flow ledger, subscription
//! index and distribution engine together, and exposes them to the host
//! through the [`FlowCallbacks`] and [`FlowSharesView`] ports.
//!
//! Every mutation takes `&mut self` and runs to completion; a rejected call
//! leaves the engine exactly as it was.

use flowshares_core::error::{AssetError, FlowSharesError};
use flowshares_core::traits::{FlowCallbacks, FlowSharesView, OutputAsset, ShareConverter};
use flowshares_core::types::{
    DistributionReceipt, FlowRecord, FlowUpdate, IndexTotals, ParticipantId, Subscription,
};
use tracing::info;

use crate::config::EngineConfig;
use crate::distribution::{DistributionEngine, DistributorState, PendingDistribution};
use crate::index::SubscriptionIndex;
use crate::ledger::FlowLedger;
use crate::shares::ScaledConverter;

/// Flow-to-share accounting engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSharesEngine {
    pub(crate) converter: ScaledConverter,
    pub(crate) ledger: FlowLedger,
    pub(crate) index: SubscriptionIndex,
    pub(crate) distributor: DistributionEngine,
}

impl FlowSharesEngine {
    /// Create an engine with the default share scale.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a custom share scale.
    pub fn with_scale(scale: u128) -> Result<Self, FlowSharesError> {
        Ok(Self { converter: ScaledConverter::new(scale)?, ..Self::default() })
    }

    /// Create an engine from a validated configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, FlowSharesError> {
        Self::with_scale(config.share_scale)
    }

    /// Apply a flow-rate change and push the new share count to the index.
    ///
    /// If the index rejects the new units, the ledger record is restored
    /// before the error is returned.
    pub fn on_flow_changed(
        &mut self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<FlowUpdate, FlowSharesError> {
        let previous = self.ledger.record(&participant).copied();
        let update = self
            .ledger
            .on_flow_changed(participant, flow_rate, now, &self.converter)?;
        if let Err(e) = self.index.set_units(participant, update.new_shares) {
            self.ledger.restore(participant, previous);
            return Err(e.into());
        }
        Ok(update)
    }

    /// Opt `participant` in to payouts. Returns `false` if already approved.
    pub fn approve(&mut self, participant: ParticipantId) -> Result<bool, FlowSharesError> {
        Ok(self.index.approve(participant)?)
    }

    /// Withdraw `participant`'s opt-in. Returns `false` if it was not approved.
    pub fn revoke(&mut self, participant: ParticipantId) -> Result<bool, FlowSharesError> {
        Ok(self.index.revoke(participant)?)
    }

    /// Distribute the whole pool held in `asset` across approved subscribers.
    ///
    /// Permissionless and safe to repeat: with no approved units or an empty
    /// pool the call is a no-op, and a second call without new inflow pays
    /// nothing. If the payout fails, all engine state is left unchanged.
    pub fn distribute<A: OutputAsset + ?Sized>(
        &mut self,
        asset: &mut A,
    ) -> Result<DistributionReceipt, FlowSharesError> {
        let held = asset.held_balance()?;
        let Some(pending) = self.prepare_distribution(held)? else {
            return Ok(DistributionReceipt::noop(
                self.distributor.pool_balance(held),
                self.index.totals().approved,
            ));
        };
        let outcome = asset.pay(pending.payouts());
        self.settle_distribution(pending, outcome)
    }

    /// Phase 1 of a distribution of `held`; see [`DistributionEngine::prepare`].
    pub fn prepare_distribution(
        &mut self,
        held: u128,
    ) -> Result<Option<PendingDistribution>, FlowSharesError> {
        Ok(self.distributor.prepare(&mut self.index, held)?)
    }

    /// Phase 2 of a distribution; see [`DistributionEngine::settle`].
    pub fn settle_distribution(
        &mut self,
        pending: PendingDistribution,
        outcome: Result<(), AssetError>,
    ) -> Result<DistributionReceipt, FlowSharesError> {
        Ok(self.distributor.settle(&mut self.index, pending, outcome)?)
    }

    /// The flow ledger.
    pub fn ledger(&self) -> &FlowLedger {
        &self.ledger
    }

    /// The subscription index.
    pub fn index(&self) -> &SubscriptionIndex {
        &self.index
    }

    /// The share converter.
    pub fn converter(&self) -> &ScaledConverter {
        &self.converter
    }

    /// Distribution counters.
    pub fn distributor_state(&self) -> DistributorState {
        self.distributor.state()
    }

    /// Flow checkpoint of `participant`.
    pub fn flow_record(&self, participant: &ParticipantId) -> Option<FlowRecord> {
        self.ledger.record(participant).copied()
    }

    /// Verify the cross-component invariants:
    /// - ledger shares equal the converter applied to the stored rate;
    /// - index units equal ledger shares (zero for index-only entries);
    /// - bucket totals equal the sums over their subscribers.
    pub fn check_invariants(&self) -> Result<(), FlowSharesError> {
        for (participant, record) in self.ledger.participants() {
            let expected = self.converter.shares(record.flow_rate)?;
            if record.shares != expected {
                return Err(FlowSharesError::InvariantViolation(format!(
                    "{participant}: shares {} != converter({}) = {expected}",
                    record.shares, record.flow_rate
                )));
            }
            let units = self.index.units(participant);
            if units != record.shares {
                return Err(FlowSharesError::InvariantViolation(format!(
                    "{participant}: index units {units} != ledger shares {}",
                    record.shares
                )));
            }
        }
        for (participant, sub) in self.index.subscribers() {
            if self.ledger.record(participant).is_none() && sub.units != 0 {
                return Err(FlowSharesError::InvariantViolation(format!(
                    "{participant}: {} units without a flow record",
                    sub.units
                )));
            }
        }
        let recomputed = self.index.recompute_totals()?;
        if recomputed != self.index.totals() {
            return Err(FlowSharesError::InvariantViolation(format!(
                "index totals {:?} != recomputed {recomputed:?}",
                self.index.totals()
            )));
        }
        Ok(())
    }
}

impl FlowCallbacks for FlowSharesEngine {
    fn notify_flow_started(
        &mut self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<u128, FlowSharesError> {
        let update = self.on_flow_changed(participant, flow_rate, now)?;
        info!(%participant, flow_rate, shares = update.new_shares, now, "flow started");
        Ok(update.uninvested)
    }

    fn notify_flow_updated(
        &mut self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<u128, FlowSharesError> {
        let update = self.on_flow_changed(participant, flow_rate, now)?;
        info!(
            %participant,
            previous_rate = update.previous_rate,
            flow_rate,
            uninvested = update.uninvested,
            shares = update.new_shares,
            now,
            "flow updated"
        );
        Ok(update.uninvested)
    }

    fn notify_flow_stopped(
        &mut self,
        participant: ParticipantId,
        now: u64,
    ) -> Result<u128, FlowSharesError> {
        let update = self.on_flow_changed(participant, 0, now)?;
        info!(%participant, uninvested = update.uninvested, now, "flow stopped");
        Ok(update.uninvested)
    }

    fn notify_subscription_approved(
        &mut self,
        participant: ParticipantId,
    ) -> Result<(), FlowSharesError> {
        if self.approve(participant)? {
            info!(%participant, units = self.index.units(&participant), "subscription approved");
        }
        Ok(())
    }

    fn notify_subscription_revoked(
        &mut self,
        participant: ParticipantId,
    ) -> Result<(), FlowSharesError> {
        if self.revoke(participant)? {
            info!(%participant, units = self.index.units(&participant), "subscription revoked");
        }
        Ok(())
    }
}

impl FlowSharesView for FlowSharesEngine {
    fn calc_uninvested(&self, participant: &ParticipantId, now: u64) -> Result<u128, FlowSharesError> {
        Ok(self.ledger.calc_uninvested(participant, now)?)
    }

    fn current_shares(&self, participant: &ParticipantId) -> u128 {
        self.ledger.current_shares(participant)
    }

    fn index_totals(&self) -> IndexTotals {
        self.index.totals()
    }

    fn subscription(&self, participant: &ParticipantId) -> Option<Subscription> {
        self.index.subscription(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MemoryAsset;
    use flowshares_core::constants::{SECONDS_PER_MONTH, SHARE_SCALE, TOKEN};
    use flowshares_core::error::{DistributionError, LedgerError};

    fn pid(seed: u8) -> ParticipantId {
        ParticipantId([seed; 20])
    }

    const MONTHLY_100: u128 = 100 * TOKEN / SECONDS_PER_MONTH as u128;

    #[test]
    fn flow_change_updates_ledger_and_index() {
        let mut engine = FlowSharesEngine::new();
        engine.notify_flow_started(pid(1), 5 * SHARE_SCALE, 0).unwrap();
        assert_eq!(engine.current_shares(&pid(1)), 5);
        assert_eq!(engine.index_totals(), IndexTotals { approved: 0, pending: 5 });
        engine.notify_subscription_approved(pid(1)).unwrap();
        assert_eq!(engine.index_totals(), IndexTotals { approved: 5, pending: 0 });
        engine.notify_flow_updated(pid(1), 2 * SHARE_SCALE, 10).unwrap();
        assert_eq!(engine.index_totals(), IndexTotals { approved: 2, pending: 0 });
        engine.check_invariants().unwrap();
    }

    #[test]
    fn stream_lifecycle_uninvested() {
        let mut engine = FlowSharesEngine::new();
        let month = SECONDS_PER_MONTH;
        assert_eq!(engine.notify_flow_started(pid(1), MONTHLY_100, 0).unwrap(), 0);

        let accrued = engine.calc_uninvested(&pid(1), month).unwrap();
        assert!(100 * TOKEN - accrued < TOKEN, "accrued {accrued}");

        let reported = engine.notify_flow_updated(pid(1), MONTHLY_100 / 2, month).unwrap();
        assert_eq!(reported, accrued);
        assert_eq!(engine.calc_uninvested(&pid(1), month).unwrap(), 0);

        let accrued = engine.calc_uninvested(&pid(1), 2 * month).unwrap();
        assert!(50 * TOKEN - accrued < TOKEN, "accrued {accrued}");

        engine.notify_flow_stopped(pid(1), 2 * month).unwrap();
        assert_eq!(engine.calc_uninvested(&pid(1), 2 * month).unwrap(), 0);
        assert_eq!(engine.calc_uninvested(&pid(1), 10 * month).unwrap(), 0);
        assert_eq!(engine.current_shares(&pid(1)), 0);
        assert!(engine.flow_record(&pid(1)).is_some());
    }

    #[test]
    fn rejected_update_leaves_engine_untouched() {
        let mut engine = FlowSharesEngine::new();
        engine.notify_flow_started(pid(1), 5 * SHARE_SCALE, 100).unwrap();
        let before = engine.clone();
        let err = engine.notify_flow_updated(pid(1), SHARE_SCALE, 50).unwrap_err();
        assert!(matches!(err, FlowSharesError::Ledger(LedgerError::OutOfOrder { .. })));
        assert_eq!(engine, before);
    }

    #[test]
    fn index_rejection_restores_ledger() {
        let mut engine = FlowSharesEngine::with_scale(1).unwrap();
        engine.notify_flow_started(pid(1), u128::MAX / 2, 0).unwrap_err();
        // Rate above the host maximum never reaches the index.
        assert!(engine.ledger().is_empty());

        // Drive the index to its limit through a tiny scale so the second
        // participant's units overflow the pending bucket.
        let max = flowshares_core::constants::MAX_FLOW_RATE;
        let mut engine = FlowSharesEngine::with_scale(1).unwrap();
        engine.index.set_units(pid(9), u128::MAX - max + 1).unwrap();
        let before = engine.clone();
        let err = engine.notify_flow_started(pid(1), max, 0).unwrap_err();
        assert!(matches!(err, FlowSharesError::Index(_)));
        assert_eq!(engine, before);
    }

    #[test]
    fn two_to_one_distribution() {
        let mut engine = FlowSharesEngine::new();
        let mut asset = MemoryAsset::new();
        engine.notify_flow_started(pid(1), 2 * MONTHLY_100, 0).unwrap();
        engine.notify_flow_started(pid(2), MONTHLY_100, 0).unwrap();
        engine.notify_subscription_approved(pid(1)).unwrap();
        engine.notify_subscription_approved(pid(2)).unwrap();

        asset.deposit(100 * TOKEN).unwrap();
        let receipt = engine.distribute(&mut asset).unwrap();

        let a = asset.balance_of(&pid(1));
        let b = asset.balance_of(&pid(2));
        assert!(a.abs_diff(66_666_666_666_666_666_666) < TOKEN);
        assert!(b.abs_diff(33_333_333_333_333_333_333) < TOKEN);
        assert_eq!(a + b + asset.held_balance().unwrap(), 100 * TOKEN);
        assert!(receipt.dust < engine.index_totals().approved);
        assert_eq!(engine.subscription(&pid(1)).unwrap().credited, a);

        let again = engine.distribute(&mut asset).unwrap();
        assert!(again.is_noop());
        assert_eq!(asset.balance_of(&pid(1)), a);
    }

    #[test]
    fn distribution_without_shareholders_is_noop() {
        let mut engine = FlowSharesEngine::new();
        let mut asset = MemoryAsset::new();
        asset.deposit(500).unwrap();
        let r = engine.distribute(&mut asset).unwrap();
        assert!(r.is_noop());
        assert_eq!(r.pool_balance, 500);
        assert_eq!(asset.held_balance().unwrap(), 500);
    }

    #[test]
    fn failed_payout_leaves_engine_untouched() {
        let mut engine = FlowSharesEngine::new();
        let mut asset = MemoryAsset::new();
        engine.notify_flow_started(pid(1), SHARE_SCALE, 0).unwrap();
        engine.notify_subscription_approved(pid(1)).unwrap();
        asset.deposit(1_000).unwrap();
        asset.set_paused(true);

        let before = engine.clone();
        let err = engine.distribute(&mut asset).unwrap_err();
        assert!(matches!(err, FlowSharesError::Distribution(DistributionError::Asset(_))));
        assert_eq!(engine, before);
        assert_eq!(asset.held_balance().unwrap(), 1_000);
    }

    #[test]
    fn revoked_subscriber_not_paid() {
        let mut engine = FlowSharesEngine::new();
        let mut asset = MemoryAsset::new();
        engine.notify_flow_started(pid(1), SHARE_SCALE, 0).unwrap();
        engine.notify_flow_started(pid(2), SHARE_SCALE, 0).unwrap();
        engine.notify_subscription_approved(pid(1)).unwrap();
        engine.notify_subscription_approved(pid(2)).unwrap();
        engine.notify_subscription_revoked(pid(2)).unwrap();
        asset.deposit(90).unwrap();
        engine.distribute(&mut asset).unwrap();
        assert_eq!(asset.balance_of(&pid(1)), 90);
        assert_eq!(asset.balance_of(&pid(2)), 0);
        assert_eq!(engine.index_totals(), IndexTotals { approved: 1, pending: 1 });
    }

    #[test]
    fn approve_before_flow_keeps_invariants() {
        let mut engine = FlowSharesEngine::new();
        engine.notify_subscription_approved(pid(1)).unwrap();
        engine.check_invariants().unwrap();
        engine.notify_flow_started(pid(1), 3 * SHARE_SCALE, 0).unwrap();
        assert_eq!(engine.index_totals(), IndexTotals { approved: 3, pending: 0 });
        engine.check_invariants().unwrap();
    }

    #[test]
    fn invariant_check_detects_drift() {
        let mut engine = FlowSharesEngine::new();
        engine.notify_flow_started(pid(1), 3 * SHARE_SCALE, 0).unwrap();
        engine.index.set_units(pid(1), 4).unwrap();
        assert!(matches!(
            engine.check_invariants(),
            Err(FlowSharesError::InvariantViolation(_))
        ));
    }

    #[test]
    fn from_config_uses_scale() {
        let config = EngineConfig { share_scale: 10, ..EngineConfig::default() };
        let mut engine = FlowSharesEngine::from_config(&config).unwrap();
        engine.notify_flow_started(pid(1), 100, 0).unwrap();
        assert_eq!(engine.current_shares(&pid(1)), 10);
    }

    #[test]
    fn zero_scale_rejected() {
        assert_eq!(
            FlowSharesEngine::with_scale(0).unwrap_err(),
            FlowSharesError::Ledger(LedgerError::InvalidScale)
        );
    }
}
