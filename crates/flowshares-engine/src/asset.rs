//! In-memory output asset.
//!
//! Implements the [`OutputAsset`] primitives over plain maps: the engine's
//! holdings, per-participant balances and a running inflow total. Suitable
//! for tests, benches and event replay; a deployment plugs in the host's
//! real token instead.

use std::collections::BTreeMap;

use flowshares_core::error::AssetError;
use flowshares_core::traits::OutputAsset;
use flowshares_core::types::{ParticipantId, Payout};

/// Output-asset balances held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAsset {
    held: u128,
    balances: BTreeMap<ParticipantId, u128>,
    total_received: u128,
    paused: bool,
}

impl MemoryAsset {
    /// Create an asset with zero holdings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inflow of `amount` into the engine's holdings.
    pub fn deposit(&mut self, amount: u128) -> Result<(), AssetError> {
        let held = self.held.checked_add(amount).ok_or_else(overflow)?;
        let received = self.total_received.checked_add(amount).ok_or_else(overflow)?;
        self.held = held;
        self.total_received = received;
        Ok(())
    }

    /// Balance paid out to `participant`.
    pub fn balance_of(&self, participant: &ParticipantId) -> u128 {
        self.balances.get(participant).copied().unwrap_or(0)
    }

    /// Lifetime inflow into the engine's holdings.
    pub fn total_received(&self) -> u128 {
        self.total_received
    }

    /// Participant balances in id order.
    pub fn balances(&self) -> impl Iterator<Item = (&ParticipantId, &u128)> {
        self.balances.iter()
    }

    /// Sum of all participant balances.
    pub fn total_paid(&self) -> u128 {
        self.balances.values().sum()
    }

    /// Make every subsequent [`pay`](OutputAsset::pay) fail until resumed.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}

fn overflow() -> AssetError {
    AssetError::Rejected("balance overflow".into())
}

impl OutputAsset for MemoryAsset {
    fn held_balance(&self) -> Result<u128, AssetError> {
        Ok(self.held)
    }

    fn pay(&mut self, payouts: &[Payout]) -> Result<(), AssetError> {
        if self.paused {
            return Err(AssetError::Rejected("asset paused".into()));
        }
        let need = payouts
            .iter()
            .try_fold(0u128, |acc, p| acc.checked_add(p.amount))
            .ok_or_else(overflow)?;
        if need > self.held {
            return Err(AssetError::InsufficientBalance { have: self.held, need });
        }

        self.held -= need;
        for payout in payouts {
            let balance = self.balances.entry(payout.participant).or_insert(0);
            *balance = balance.saturating_add(payout.amount);
        }
        Ok(())
    }
}
