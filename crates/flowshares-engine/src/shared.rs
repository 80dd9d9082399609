//! Lock-guarded engine handle for concurrent hosts.
//!
//! [`SharedEngine`] wraps a [`FlowSharesEngine`] in a `parking_lot::Mutex`.
//! Distributions hold the lock only while planning/committing and while
//! settling; the external payout runs with the lock released. A callback
//! fired by the payout may therefore call back into the engine (including
//! another `distribute`) without deadlocking, and it observes the committed
//! state: the outer distribution's amount is already in flight and is not
//! paid a second time.

use std::sync::Arc;

use flowshares_core::error::FlowSharesError;
use flowshares_core::traits::{FlowCallbacks, FlowSharesView, OutputAsset};
use flowshares_core::types::{DistributionReceipt, IndexTotals, ParticipantId, Subscription};
use parking_lot::Mutex;

use crate::engine::FlowSharesEngine;
use crate::snapshot::EngineSnapshot;

/// Cloneable, thread-safe handle to one engine.
#[derive(Debug, Clone, Default)]
pub struct SharedEngine {
    inner: Arc<Mutex<FlowSharesEngine>>,
}

impl SharedEngine {
    /// Share `engine` behind a lock.
    pub fn new(engine: FlowSharesEngine) -> Self {
        Self { inner: Arc::new(Mutex::new(engine)) }
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut FlowSharesEngine) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Distribute the pool held in `asset`.
    ///
    /// The balance read and the plan are taken under one lock, so no flow
    /// update can be half-observed. The lock is released around
    /// [`OutputAsset::pay`], so `pay` may call back into this handle.
    /// [`OutputAsset::held_balance`] runs under the lock and must not.
    pub fn distribute<A: OutputAsset + ?Sized>(
        &self,
        asset: &mut A,
    ) -> Result<DistributionReceipt, FlowSharesError> {
        let pending = {
            let mut engine = self.inner.lock();
            let held = asset.held_balance()?;
            match engine.prepare_distribution(held)? {
                Some(pending) => pending,
                None => {
                    return Ok(DistributionReceipt::noop(
                        engine.distributor.pool_balance(held),
                        engine.index_totals().approved,
                    ));
                }
            }
        };

        let outcome = asset.pay(pending.payouts());

        self.inner.lock().settle_distribution(pending, outcome)
    }

    /// Flow-rate change; returns the uninvested amount.
    pub fn notify_flow_updated(
        &self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<u128, FlowSharesError> {
        self.inner.lock().notify_flow_updated(participant, flow_rate, now)
    }

    /// Flow opened; returns the uninvested amount.
    pub fn notify_flow_started(
        &self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<u128, FlowSharesError> {
        self.inner.lock().notify_flow_started(participant, flow_rate, now)
    }

    /// Flow closed; returns the uninvested amount.
    pub fn notify_flow_stopped(&self, participant: ParticipantId, now: u64) -> Result<u128, FlowSharesError> {
        self.inner.lock().notify_flow_stopped(participant, now)
    }

    /// Opt-in signal.
    pub fn notify_subscription_approved(&self, participant: ParticipantId) -> Result<(), FlowSharesError> {
        self.inner.lock().notify_subscription_approved(participant)
    }

    /// Opt-out signal.
    pub fn notify_subscription_revoked(&self, participant: ParticipantId) -> Result<(), FlowSharesError> {
        self.inner.lock().notify_subscription_revoked(participant)
    }

    /// Input accrued by `participant` since its last checkpoint.
    pub fn calc_uninvested(&self, participant: &ParticipantId, now: u64) -> Result<u128, FlowSharesError> {
        self.inner.lock().calc_uninvested(participant, now)
    }

    /// Shares currently held by `participant`.
    pub fn current_shares(&self, participant: &ParticipantId) -> u128 {
        self.inner.lock().current_shares(participant)
    }

    /// Approved and pending unit totals.
    pub fn index_totals(&self) -> IndexTotals {
        self.inner.lock().index_totals()
    }

    /// Subscription entry of `participant`, if it has ever been seen.
    pub fn subscription(&self, participant: &ParticipantId) -> Option<Subscription> {
        self.inner.lock().subscription(participant)
    }

    /// Consistent snapshot of the whole engine.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.inner.lock().snapshot()
    }
}
