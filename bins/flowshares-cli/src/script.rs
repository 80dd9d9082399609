//! Event scripts for `flowshares-cli replay`.
//!
//! A script is a JSON array of events applied in order to a fresh engine and
//! an in-memory output asset:
//!
//! ```json
//! [
//!   { "flow":    { "at": 0, "participant": "0x01…", "rate": 38580246913580 } },
//!   { "approve": { "participant": "0x01…" } },
//!   { "deposit": { "amount": 100000000000000000000 } },
//!   "distribute",
//!   { "query":   { "at": 2592000, "participant": "0x01…" } }
//! ]
//! ```
//!
//! Rejected events are recorded in the report and leave the engine
//! unchanged; replay continues unless `strict` is set.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use flowshares_core::traits::{FlowCallbacks, FlowSharesView, OutputAsset};
use flowshares_core::types::{DistributionReceipt, IndexTotals, ParticipantId, Subscription};
use flowshares_engine::{DistributorState, FlowSharesEngine, MemoryAsset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One scripted host event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Event {
    /// Open or change a stream.
    Flow { at: u64, participant: ParticipantId, rate: u128 },
    /// Close a stream.
    Stop { at: u64, participant: ParticipantId },
    Approve { participant: ParticipantId },
    Revoke { participant: ParticipantId },
    /// Inflow into the engine's output-asset holdings.
    Deposit { amount: u128 },
    Distribute,
    /// Record the participant's state without changing anything.
    Query { at: u64, participant: ParticipantId },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Flow { .. } => "flow",
            Event::Stop { .. } => "stop",
            Event::Approve { .. } => "approve",
            Event::Revoke { .. } => "revoke",
            Event::Deposit { .. } => "deposit",
            Event::Distribute => "distribute",
            Event::Query { .. } => "query",
        }
    }
}

/// Result of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Flow { event: usize, participant: ParticipantId, uninvested: u128, shares: u128 },
    Subscription { event: usize, participant: ParticipantId, approved: bool },
    Deposit { event: usize, held: u128 },
    Distribution { event: usize, receipt: DistributionReceipt },
    Query {
        event: usize,
        participant: ParticipantId,
        uninvested: u128,
        shares: u128,
        subscription: Option<Subscription>,
    },
    Rejected { event: usize, op: &'static str, error: String },
}

/// Final replay report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
    pub totals: IndexTotals,
    pub distributor: DistributorState,
    pub held: u128,
    pub total_received: u128,
    pub balances: BTreeMap<ParticipantId, u128>,
}

/// Parse a JSON script.
pub fn parse(json: &str) -> Result<Vec<Event>> {
    Ok(serde_json::from_str(json)?)
}

/// Apply `events` to `engine` with a fresh in-memory asset.
pub fn replay(engine: &mut FlowSharesEngine, events: &[Event], strict: bool) -> Result<Report> {
    let mut asset = MemoryAsset::new();
    let mut outcomes = Vec::with_capacity(events.len());

    for (i, event) in events.iter().enumerate() {
        debug!(event = i, op = event.name(), "replaying");
        let outcome = match apply(engine, &mut asset, i, event) {
            Ok(outcome) => outcome,
            Err(e) if strict => bail!("event #{i} ({}) rejected: {e}", event.name()),
            Err(e) => {
                warn!(event = i, op = event.name(), error = %e, "event rejected");
                Outcome::Rejected { event: i, op: event.name(), error: e.to_string() }
            }
        };
        outcomes.push(outcome);
    }

    engine.check_invariants()?;
    Ok(Report {
        outcomes,
        totals: engine.index_totals(),
        distributor: engine.distributor_state(),
        held: asset.held_balance()?,
        total_received: asset.total_received(),
        balances: asset.balances().map(|(p, b)| (*p, *b)).collect(),
    })
}

fn apply(
    engine: &mut FlowSharesEngine,
    asset: &mut MemoryAsset,
    event: usize,
    e: &Event,
) -> Result<Outcome> {
    Ok(match *e {
        Event::Flow { at, participant, rate } => {
            let uninvested = engine.notify_flow_updated(participant, rate, at)?;
            Outcome::Flow { event, participant, uninvested, shares: engine.current_shares(&participant) }
        }
        Event::Stop { at, participant } => {
            let uninvested = engine.notify_flow_stopped(participant, at)?;
            Outcome::Flow { event, participant, uninvested, shares: 0 }
        }
        Event::Approve { participant } => {
            engine.notify_subscription_approved(participant)?;
            Outcome::Subscription { event, participant, approved: true }
        }
        Event::Revoke { participant } => {
            engine.notify_subscription_revoked(participant)?;
            Outcome::Subscription { event, participant, approved: false }
        }
        Event::Deposit { amount } => {
            asset.deposit(amount)?;
            Outcome::Deposit { event, held: asset.held_balance()? }
        }
        Event::Distribute => Outcome::Distribution { event, receipt: engine.distribute(asset)? },
        Event::Query { at, participant } => Outcome::Query {
            event,
            participant,
            uninvested: engine.calc_uninvested(&participant, at)?,
            shares: engine.current_shares(&participant),
            subscription: engine.subscription(&participant),
        },
    })
}
