//! Trait interfaces for the FlowShares engine.
//!
//! These traits define the contracts between the accounting core and the
//! world around it:
//! - [`ShareConverter`] — flow rate to share count (flowshares-engine implements)
//! - [`FlowCallbacks`] — inbound port driven by the host's flow notifications
//! - [`FlowSharesView`] — read-only query surface
//! - [`OutputAsset`] — outbound balance-query and payout primitives (host implements)

use crate::error::{AssetError, FlowSharesError, LedgerError};
use crate::types::{IndexTotals, ParticipantId, Payout, Subscription};

/// Pure mapping from a flow rate to an integer share count.
///
/// Implementations must be deterministic and monotonic non-decreasing in
/// `flow_rate`, must map zero to zero, and must floor rather than round.
pub trait ShareConverter: Send + Sync {
    /// Share count for a flow rate in input-asset units per second.
    fn shares(&self, flow_rate: u128) -> Result<u128, LedgerError>;

    /// The divisor applied to flow rates.
    fn scale(&self) -> u128;
}

/// Inbound port through which the host reports flow and subscription changes.
///
/// The host is the only source of these notifications. `now` is trusted as
/// a monotonically increasing wall-clock value and `flow_rate` as the
/// authoritative current contribution rate.
pub trait FlowCallbacks {
    /// A participant opened a stream. Returns the uninvested amount accrued
    /// before the change (0 on first contact).
    fn notify_flow_started(
        &mut self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<u128, FlowSharesError>;

    /// A participant changed the rate of an open stream.
    fn notify_flow_updated(
        &mut self,
        participant: ParticipantId,
        flow_rate: u128,
        now: u64,
    ) -> Result<u128, FlowSharesError>;

    /// A participant closed its stream.
    ///
    /// Default implementation: an update to rate 0.
    fn notify_flow_stopped(
        &mut self,
        participant: ParticipantId,
        now: u64,
    ) -> Result<u128, FlowSharesError> {
        self.notify_flow_updated(participant, 0, now)
    }

    /// The participant opted in to receive payouts.
    fn notify_subscription_approved(&mut self, participant: ParticipantId)
        -> Result<(), FlowSharesError>;

    /// The participant withdrew its opt-in.
    fn notify_subscription_revoked(&mut self, participant: ParticipantId)
        -> Result<(), FlowSharesError>;
}

/// Read-only query surface exposed to callers.
pub trait FlowSharesView {
    /// Input-asset amount accrued by `participant` since its last share
    /// recalculation, evaluated at `now`.
    fn calc_uninvested(&self, participant: &ParticipantId, now: u64) -> Result<u128, FlowSharesError>;

    /// Current share count of `participant` (0 if unknown).
    fn current_shares(&self, participant: &ParticipantId) -> u128;

    /// Aggregate approved and pending units.
    fn index_totals(&self) -> IndexTotals;

    /// Subscription entry of `participant`, if it has ever been seen.
    fn subscription(&self, participant: &ParticipantId) -> Option<Subscription>;
}

/// Outbound primitives over the output asset held by the engine.
///
/// Both calls are assumed atomic: `pay` either moves every payout or
/// nothing.
pub trait OutputAsset {
    /// The engine's current holdings of the output asset.
    ///
    /// A shared engine handle reads this while holding its lock, so an
    /// implementation must not call back into the engine from here.
    fn held_balance(&self) -> Result<u128, AssetError>;

    /// Transfer each payout from the engine's holdings to its participant.
    ///
    /// Runs outside the shared engine lock, so it may call back into the
    /// engine.
    fn pay(&mut self, payouts: &[Payout]) -> Result<(), AssetError>;
}

impl<T: OutputAsset + ?Sized> OutputAsset for &mut T {
    fn held_balance(&self) -> Result<u128, AssetError> {
        (**self).held_balance()
    }

    fn pay(&mut self, payouts: &[Payout]) -> Result<(), AssetError> {
        (**self).pay(payouts)
    }
}
