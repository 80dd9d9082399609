//! Subscription index: per-participant units and opt-in state, plus the
//! aggregate approved/pending unit totals used for pro-rata splits.
//!
//! The index never tracks flow rates; it only receives the share counts the
//! flow ledger derives. After every call the approved bucket equals the sum
//! of units over approved subscribers and the pending bucket the sum over
//! the rest.

use std::collections::BTreeMap;

use flowshares_core::error::IndexError;
use flowshares_core::types::{IndexTotals, ParticipantId, Subscription};
use tracing::debug;

/// Aggregate share registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionIndex {
    subscriptions: BTreeMap<ParticipantId, Subscription>,
    totals: IndexTotals,
}

/// `bucket - old + new`, checked.
fn rebalance(bucket: u128, old: u128, new: u128) -> Result<u128, IndexError> {
    bucket
        .checked_sub(old)
        .and_then(|b| b.checked_add(new))
        .ok_or(IndexError::ArithmeticOverflow)
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `participant`'s unit count, adjusting the bucket matching its
    /// opt-in state. Unknown participants are created as pending.
    ///
    /// Returns the previous unit count.
    pub fn set_units(&mut self, participant: ParticipantId, units: u128) -> Result<u128, IndexError> {
        let sub = self.subscriptions.get(&participant).copied().unwrap_or_default();

        let mut totals = self.totals;
        if sub.approved {
            totals.approved = rebalance(totals.approved, sub.units, units)?;
        } else {
            totals.pending = rebalance(totals.pending, sub.units, units)?;
        }
        totals.total().ok_or(IndexError::ArithmeticOverflow)?;

        self.totals = totals;
        self.subscriptions.insert(participant, Subscription { units, ..sub });
        debug!(%participant, previous = sub.units, units, approved = sub.approved, "units set");
        Ok(sub.units)
    }

    /// Opt `participant` in to payouts, moving its units from pending to
    /// approved. Unknown participants become approved with zero units.
    ///
    /// Returns `false` if it was already approved.
    pub fn approve(&mut self, participant: ParticipantId) -> Result<bool, IndexError> {
        let sub = self.subscriptions.get(&participant).copied().unwrap_or_default();
        if sub.approved {
            return Ok(false);
        }

        let pending = rebalance(self.totals.pending, sub.units, 0)?;
        let approved = rebalance(self.totals.approved, 0, sub.units)?;

        self.totals = IndexTotals { approved, pending };
        self.subscriptions
            .insert(participant, Subscription { approved: true, ..sub });
        debug!(%participant, units = sub.units, "subscription approved");
        Ok(true)
    }

    /// Withdraw `participant`'s opt-in, moving its units back to pending.
    ///
    /// Returns `false` if it was not approved.
    pub fn revoke(&mut self, participant: ParticipantId) -> Result<bool, IndexError> {
        let sub = match self.subscriptions.get(&participant) {
            Some(sub) if sub.approved => *sub,
            _ => return Ok(false),
        };

        let approved = rebalance(self.totals.approved, sub.units, 0)?;
        let pending = rebalance(self.totals.pending, 0, sub.units)?;

        self.totals = IndexTotals { approved, pending };
        self.subscriptions
            .insert(participant, Subscription { approved: false, ..sub });
        debug!(%participant, units = sub.units, "subscription revoked");
        Ok(true)
    }

    /// Record `amount` as paid to `participant`.
    pub fn credit(&mut self, participant: &ParticipantId, amount: u128) -> Result<(), IndexError> {
        let sub = self
            .subscriptions
            .get_mut(participant)
            .ok_or(IndexError::UnknownSubscriber { participant: *participant })?;
        sub.credited = sub
            .credited
            .checked_add(amount)
            .ok_or(IndexError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Reverse a prior [`credit`](Self::credit).
    pub fn debit(&mut self, participant: &ParticipantId, amount: u128) -> Result<(), IndexError> {
        let sub = self
            .subscriptions
            .get_mut(participant)
            .ok_or(IndexError::UnknownSubscriber { participant: *participant })?;
        sub.credited = sub
            .credited
            .checked_sub(amount)
            .ok_or(IndexError::CreditUnderflow { participant: *participant })?;
        Ok(())
    }

    /// Subscription entry of `participant`.
    pub fn subscription(&self, participant: &ParticipantId) -> Option<Subscription> {
        self.subscriptions.get(participant).copied()
    }

    /// Units of `participant` (0 if unknown).
    pub fn units(&self, participant: &ParticipantId) -> u128 {
        self.subscriptions.get(participant).map_or(0, |s| s.units)
    }

    /// Whether `participant` has opted in.
    pub fn is_approved(&self, participant: &ParticipantId) -> bool {
        self.subscriptions.get(participant).is_some_and(|s| s.approved)
    }

    /// Aggregate approved and pending units.
    pub fn totals(&self) -> IndexTotals {
        self.totals
    }

    /// Approved subscribers holding units, in participant order.
    pub fn approved_subscribers(&self) -> impl Iterator<Item = (&ParticipantId, &Subscription)> {
        self.subscriptions
            .iter()
            .filter(|(_, s)| s.approved && s.units > 0)
    }

    /// All subscribers in participant order.
    pub fn subscribers(&self) -> impl Iterator<Item = (&ParticipantId, &Subscription)> {
        self.subscriptions.iter()
    }

    /// Number of subscribers ever seen.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the index has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Recompute both buckets from the per-subscriber entries.
    pub fn recompute_totals(&self) -> Result<IndexTotals, IndexError> {
        self.subscriptions
            .values()
            .try_fold(IndexTotals::default(), |mut acc, s| {
                let bucket = if s.approved { &mut acc.approved } else { &mut acc.pending };
                *bucket = bucket.checked_add(s.units).ok_or(IndexError::ArithmeticOverflow)?;
                Ok(acc)
            })
    }

    /// Rebuild an index from stored entries (snapshot restore).
    pub(crate) fn from_entries(
        entries: impl IntoIterator<Item = (ParticipantId, Subscription)>,
    ) -> Result<Self, IndexError> {
        let mut index = Self { subscriptions: entries.into_iter().collect(), totals: IndexTotals::default() };
        index.totals = index.recompute_totals()?;
        Ok(index)
    }
}
