//! Pro-rata distribution of the pooled output-asset balance.
//!
//! A distribution runs in two phases around the external payout primitive:
//!
//! 1. [`DistributionEngine::prepare`] computes the plan from one consistent
//!    view of `(pool, approved units, per-participant units)`, credits every
//!    payee in the index and marks the total as in flight.
//! 2. [`DistributionEngine::settle`] either finalizes the plan or, if the
//!    payout failed, reverses every credit and the in-flight amount.
//!
//! All engine state is committed before the payout is attempted, so any
//! call that re-enters the engine while the payout is running observes the
//! post-commit state: the in-flight amount is no longer part of the pool.

use flowshares_core::error::{AssetError, DistributionError};
use flowshares_core::types::{DistributionReceipt, Payout};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::index::SubscriptionIndex;

/// Persistent counters of the distribution engine.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct DistributorState {
    /// Number of completed distributions.
    pub sequence: u64,
    /// Amount committed to a payout that has not settled yet.
    pub in_flight: u128,
    /// Lifetime amount paid out.
    pub total_distributed: u128,
}

/// A committed distribution awaiting its payout outcome.
///
/// Must be passed back to [`DistributionEngine::settle`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a prepared distribution must be settled"]
pub struct PendingDistribution {
    receipt: DistributionReceipt,
}

impl PendingDistribution {
    /// Payout instructions for the external primitive.
    pub fn payouts(&self) -> &[Payout] {
        &self.receipt.payouts
    }

    /// The receipt as planned (sequence assigned on settle).
    pub fn receipt(&self) -> &DistributionReceipt {
        &self.receipt
    }
}

/// Splits the pool across approved subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionEngine {
    state: DistributorState,
}

impl DistributionEngine {
    /// Create an engine with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored counters.
    pub fn from_state(state: DistributorState) -> Self {
        Self { state }
    }

    /// Current counters.
    pub fn state(&self) -> DistributorState {
        self.state
    }

    /// Amount of `held` not already committed to an in-flight payout.
    pub fn pool_balance(&self, held: u128) -> u128 {
        held.saturating_sub(self.state.in_flight)
    }

    /// Compute the payout plan for the current pool without changing state.
    ///
    /// The pool is split into a whole per-unit amount,
    /// `pool / total_approved_units` (floored), and each approved subscriber
    /// receives `units * per_unit`. The remainder stays in the pool; it is
    /// below `total_approved_units`, so distributing it again pays nothing.
    pub fn plan(&self, index: &SubscriptionIndex, held: u128) -> Result<DistributionReceipt, DistributionError> {
        let pool = self.pool_balance(held);
        let total_units = index.totals().approved;
        if pool == 0 || total_units == 0 {
            return Ok(DistributionReceipt::noop(pool, total_units));
        }

        let per_unit = pool / total_units;
        if per_unit == 0 {
            return Ok(DistributionReceipt::noop(pool, total_units));
        }

        let mut payouts = Vec::new();
        let mut distributed: u128 = 0;
        for (participant, sub) in index.approved_subscribers() {
            let amount = sub
                .units
                .checked_mul(per_unit)
                .ok_or(DistributionError::ArithmeticOverflow)?;
            distributed = distributed
                .checked_add(amount)
                .ok_or(DistributionError::ArithmeticOverflow)?;
            payouts.push(Payout { participant: *participant, amount });
        }

        let dust = pool
            .checked_sub(distributed)
            .ok_or(DistributionError::ArithmeticOverflow)?;

        Ok(DistributionReceipt {
            sequence: 0,
            pool_balance: pool,
            total_approved_units: total_units,
            payouts,
            distributed,
            dust,
        })
    }

    /// Phase 1: plan and commit a distribution of `held`.
    ///
    /// Returns `None` when there is nothing to pay (empty pool, no approved
    /// units, or a pool smaller than the approved unit total). Otherwise every payee is
    /// credited and the total is marked in flight before returning.
    pub fn prepare(
        &mut self,
        index: &mut SubscriptionIndex,
        held: u128,
    ) -> Result<Option<PendingDistribution>, DistributionError> {
        let receipt = self.plan(index, held)?;
        if receipt.is_noop() {
            return Ok(None);
        }

        let in_flight = self
            .state
            .in_flight
            .checked_add(receipt.distributed)
            .ok_or(DistributionError::ArithmeticOverflow)?;

        for (i, payout) in receipt.payouts.iter().enumerate() {
            if let Err(e) = index.credit(&payout.participant, payout.amount) {
                for done in &receipt.payouts[..i] {
                    index.debit(&done.participant, done.amount)?;
                }
                return Err(e.into());
            }
        }
        self.state.in_flight = in_flight;

        Ok(Some(PendingDistribution { receipt }))
    }

    /// Phase 2: finalize `pending` with the payout primitive's `outcome`.
    ///
    /// On failure every credit made by [`prepare`](Self::prepare) is reversed
    /// and the asset error is returned.
    pub fn settle(
        &mut self,
        index: &mut SubscriptionIndex,
        pending: PendingDistribution,
        outcome: Result<(), AssetError>,
    ) -> Result<DistributionReceipt, DistributionError> {
        let mut receipt = pending.receipt;
        self.state.in_flight = self
            .state
            .in_flight
            .checked_sub(receipt.distributed)
            .ok_or(DistributionError::ArithmeticOverflow)?;

        match outcome {
            Ok(()) => {
                self.state.sequence += 1;
                self.state.total_distributed =
                    self.state.total_distributed.saturating_add(receipt.distributed);
                receipt.sequence = self.state.sequence;
                info!(
                    sequence = receipt.sequence,
                    pool = receipt.pool_balance,
                    units = receipt.total_approved_units,
                    payees = receipt.payouts.len(),
                    distributed = receipt.distributed,
                    dust = receipt.dust,
                    "distribution settled"
                );
                Ok(receipt)
            }
            Err(e) => {
                for payout in &receipt.payouts {
                    index.debit(&payout.participant, payout.amount)?;
                }
                warn!(
                    distributed = receipt.distributed,
                    error = %e,
                    "payout failed, distribution rolled back"
                );
                Err(e.into())
            }
        }
    }
}
