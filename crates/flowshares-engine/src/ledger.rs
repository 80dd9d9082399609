//! Per-participant flow ledger.
//!
//! Records each participant's current flow rate, the time that rate became
//! effective, and the share count derived from it. The ledger is the source
//! of truth for how much a participant has contributed since its shares
//! were last recalculated (the "uninvested" amount).
//!
//! Accrual always uses the rate that was in effect over the elapsed
//! interval, so a rate change never rewrites value already earned under the
//! previous rate and never counts it twice.

use std::collections::BTreeMap;

use flowshares_core::constants::MAX_FLOW_RATE;
use flowshares_core::error::LedgerError;
use flowshares_core::traits::ShareConverter;
use flowshares_core::types::{FlowRecord, FlowUpdate, ParticipantId};
use tracing::{debug, warn};

/// Flow checkpoints keyed by participant.
///
/// Records are created lazily on first contact and never removed; a
/// participant whose rate returns to zero keeps a zero-rate record so later
/// queries still see its last checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowLedger {
    records: BTreeMap<ParticipantId, FlowRecord>,
}

/// `rate * (now - checkpoint)`, rejecting negative elapsed time.
fn accrued(participant: &ParticipantId, record: &FlowRecord, now: u64) -> Result<u128, LedgerError> {
    let elapsed = now
        .checked_sub(record.last_update_time)
        .ok_or(LedgerError::OutOfOrder {
            participant: *participant,
            last_update: record.last_update_time,
            now,
        })?;
    record
        .flow_rate
        .checked_mul(elapsed as u128)
        .ok_or(LedgerError::ArithmeticOverflow)
}

impl FlowLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a flow-rate change for `participant` at time `now`.
    ///
    /// Returns the amount accrued under the previous rate since the previous
    /// checkpoint, together with the old and new share counts. A participant
    /// seen for the first time starts from rate 0 checkpointed at `now`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::OutOfOrder`] if `now` precedes the stored checkpoint
    /// - [`LedgerError::RateOutOfRange`] if `new_rate` exceeds [`MAX_FLOW_RATE`]
    /// - [`LedgerError::ArithmeticOverflow`] if the accrual does not fit `u128`
    ///
    /// On error the participant's record is left untouched.
    pub fn on_flow_changed(
        &mut self,
        participant: ParticipantId,
        new_rate: u128,
        now: u64,
        converter: &dyn ShareConverter,
    ) -> Result<FlowUpdate, LedgerError> {
        let previous = self.records.get(&participant).copied().unwrap_or(FlowRecord {
            flow_rate: 0,
            last_update_time: now,
            shares: 0,
        });

        let outcome = accrued(&participant, &previous, now).and_then(|uninvested| {
            if new_rate > MAX_FLOW_RATE {
                return Err(LedgerError::RateOutOfRange { rate: new_rate, max: MAX_FLOW_RATE });
            }
            Ok((uninvested, converter.shares(new_rate)?))
        });
        let (uninvested, new_shares) = match outcome {
            Ok(v) => v,
            Err(e) => {
                warn!(%participant, new_rate, now, error = %e, "flow update rejected");
                return Err(e);
            }
        };

        self.records.insert(
            participant,
            FlowRecord { flow_rate: new_rate, last_update_time: now, shares: new_shares },
        );

        debug!(
            %participant,
            previous_rate = previous.flow_rate,
            new_rate,
            uninvested,
            shares = new_shares,
            now,
            "flow checkpoint"
        );

        Ok(FlowUpdate {
            participant,
            uninvested,
            previous_rate: previous.flow_rate,
            new_rate,
            previous_shares: previous.shares,
            new_shares,
            at: now,
        })
    }

    /// Amount accrued by `participant` since its last checkpoint, at `now`.
    ///
    /// Unknown participants have accrued nothing.
    pub fn calc_uninvested(&self, participant: &ParticipantId, now: u64) -> Result<u128, LedgerError> {
        match self.records.get(participant) {
            Some(record) => accrued(participant, record, now),
            None => Ok(0),
        }
    }

    /// The stored checkpoint of `participant`.
    pub fn record(&self, participant: &ParticipantId) -> Option<&FlowRecord> {
        self.records.get(participant)
    }

    /// Current flow rate of `participant` (0 if unknown).
    pub fn flow_rate(&self, participant: &ParticipantId) -> u128 {
        self.records.get(participant).map_or(0, |r| r.flow_rate)
    }

    /// Current share count of `participant` (0 if unknown).
    pub fn current_shares(&self, participant: &ParticipantId) -> u128 {
        self.records.get(participant).map_or(0, |r| r.shares)
    }

    /// All records in participant order.
    pub fn participants(&self) -> impl Iterator<Item = (&ParticipantId, &FlowRecord)> {
        self.records.iter()
    }

    /// Number of participants ever seen.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no participant has ever been seen.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of participants with a non-zero rate.
    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    /// Sum of all current flow rates.
    pub fn total_flow_rate(&self) -> Result<u128, LedgerError> {
        self.records.values().try_fold(0u128, |acc, r| {
            acc.checked_add(r.flow_rate).ok_or(LedgerError::ArithmeticOverflow)
        })
    }

    /// Put back a record captured before a failed composite update.
    /// `None` removes a record that did not exist before.
    pub(crate) fn restore(&mut self, participant: ParticipantId, previous: Option<FlowRecord>) {
        match previous {
            Some(record) => {
                self.records.insert(participant, record);
            }
            None => {
                self.records.remove(&participant);
            }
        }
    }

    /// Insert a record verbatim (snapshot restore).
    pub(crate) fn insert_record(&mut self, participant: ParticipantId, record: FlowRecord) {
        self.records.insert(participant, record);
    }
}
