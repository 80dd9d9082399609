//! Shared helpers for integration tests.

use flowshares_core::constants::{SECONDS_PER_MONTH, TOKEN};
use flowshares_core::error::FlowSharesError;
use flowshares_core::traits::{FlowCallbacks, FlowSharesView, OutputAsset};
use flowshares_core::types::ParticipantId;
use flowshares_engine::{FlowSharesEngine, MemoryAsset};

/// Simple participant id from a seed byte.
pub fn pid(seed: u8) -> ParticipantId {
    ParticipantId([seed; 20])
}

/// Flow rate that streams `tokens` whole tokens over 30 days.
pub fn monthly_rate(tokens: u128) -> u128 {
    tokens * TOKEN / SECONDS_PER_MONTH as u128
}

/// Engine plus in-memory output asset.
#[derive(Debug, Clone, Default)]
pub struct Harness {
    pub engine: FlowSharesEngine,
    pub asset: MemoryAsset,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a flow and opt in at once.
    pub fn join(&mut self, participant: ParticipantId, rate: u128, now: u64) -> Result<u128, FlowSharesError> {
        let uninvested = self.engine.notify_flow_started(participant, rate, now)?;
        self.engine.notify_subscription_approved(participant)?;
        Ok(uninvested)
    }

    pub fn deposit(&mut self, amount: u128) {
        self.asset.deposit(amount).expect("deposit overflow");
    }

    /// Held balance plus everything paid out equals everything received.
    pub fn assert_conserved(&self) {
        let held = self.asset.held_balance().unwrap();
        assert_eq!(held + self.asset.total_paid(), self.asset.total_received());
    }

    /// Sum of `credited` over all subscribers equals what the asset paid.
    pub fn assert_credits_match_payouts(&self) {
        let credited: u128 = self
            .engine
            .index()
            .subscribers()
            .map(|(_, s)| s.credited)
            .sum();
        assert_eq!(credited, self.asset.total_paid());
    }

    pub fn shares(&self, participant: &ParticipantId) -> u128 {
        self.engine.current_shares(participant)
    }
}
