//! Engine persistence.
//!
//! An [`EngineSnapshot`] captures every participant's flow checkpoint and
//! subscription together with the distributor counters. Snapshots encode to
//! bincode (standard config) for storage and to JSON for inspection.
//! Restoring re-validates the cross-component invariants, so a tampered or
//! truncated snapshot is rejected instead of producing a drifting engine.

use std::collections::BTreeMap;

use flowshares_core::constants::SNAPSHOT_VERSION;
use flowshares_core::error::{FlowSharesError, SnapshotError};
use flowshares_core::traits::ShareConverter;
use flowshares_core::types::{FlowRecord, IndexTotals, ParticipantId, Subscription};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::{DistributionEngine, DistributorState};
use crate::engine::FlowSharesEngine;
use crate::index::SubscriptionIndex;
use crate::ledger::FlowLedger;
use crate::shares::ScaledConverter;

/// One participant's stored state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ParticipantState {
    pub id: ParticipantId,
    /// Flow checkpoint; `None` for participants known only to the index.
    pub flow: Option<FlowRecord>,
    /// Subscription entry; `None` for participants never pushed to the index.
    pub subscription: Option<Subscription>,
}

/// Serializable image of a [`FlowSharesEngine`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EngineSnapshot {
    pub version: u32,
    pub share_scale: u128,
    /// Sorted by participant id.
    pub participants: Vec<ParticipantState>,
    /// Bucket totals at capture time; checked against the entries on restore.
    pub totals: IndexTotals,
    pub distributor: DistributorState,
}

impl EngineSnapshot {
    /// Encode with the bincode standard config.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    ///
    /// Trailing bytes and unknown versions are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let (snapshot, read): (Self, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if read != bytes.len() {
            return Err(SnapshotError::Decode(format!(
                "{} trailing bytes",
                bytes.len() - read
            )));
        }
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Parse JSON produced by [`to_json`](Self::to_json).
    pub fn from_json(s: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self =
            serde_json::from_str(s).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl FlowSharesEngine {
    /// Capture the engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut participants: BTreeMap<ParticipantId, ParticipantState> = BTreeMap::new();
        for (id, record) in self.ledger.participants() {
            participants
                .entry(*id)
                .or_insert_with(|| ParticipantState { id: *id, flow: None, subscription: None })
                .flow = Some(*record);
        }
        for (id, sub) in self.index.subscribers() {
            participants
                .entry(*id)
                .or_insert_with(|| ParticipantState { id: *id, flow: None, subscription: None })
                .subscription = Some(*sub);
        }

        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            share_scale: self.converter.scale(),
            participants: participants.into_values().collect(),
            totals: self.index.totals(),
            distributor: self.distributor.state(),
        }
    }

    /// Rebuild an engine from `snapshot`.
    ///
    /// Fails with [`SnapshotError::Inconsistent`] when the stored totals,
    /// share counts or units disagree, or when a payout was in flight at
    /// capture time.
    pub fn restore(snapshot: &EngineSnapshot) -> Result<Self, FlowSharesError> {
        snapshot.check_version()?;
        let converter = ScaledConverter::new(snapshot.share_scale)
            .map_err(|e| inconsistent(format!("share_scale: {e}")))?;
        if snapshot.distributor.in_flight != 0 {
            return Err(inconsistent(format!(
                "payout of {} in flight",
                snapshot.distributor.in_flight
            )));
        }

        let mut ledger = FlowLedger::new();
        let mut entries = Vec::with_capacity(snapshot.participants.len());
        let mut previous: Option<ParticipantId> = None;
        for p in &snapshot.participants {
            if previous.is_some_and(|prev| prev >= p.id) {
                return Err(inconsistent(format!("participant {} out of order", p.id)));
            }
            previous = Some(p.id);

            let shares = match p.flow {
                Some(record) => {
                    if converter.shares(record.flow_rate)? != record.shares {
                        return Err(inconsistent(format!("{}: shares do not match rate", p.id)));
                    }
                    ledger.insert_record(p.id, record);
                    record.shares
                }
                None => 0,
            };
            match p.subscription {
                Some(sub) => {
                    if sub.units != shares {
                        return Err(inconsistent(format!(
                            "{}: units {} != shares {shares}",
                            p.id, sub.units
                        )));
                    }
                    entries.push((p.id, sub));
                }
                None if shares != 0 => {
                    return Err(inconsistent(format!("{}: shares without subscription", p.id)));
                }
                None => {}
            }
        }

        let index = SubscriptionIndex::from_entries(entries)?;
        if index.totals() != snapshot.totals {
            return Err(inconsistent(format!(
                "totals {:?} != recomputed {:?}",
                snapshot.totals,
                index.totals()
            )));
        }

        debug!(
            participants = snapshot.participants.len(),
            sequence = snapshot.distributor.sequence,
            "engine restored"
        );
        Ok(Self {
            converter,
            ledger,
            index,
            distributor: DistributionEngine::from_state(snapshot.distributor),
        })
    }
}

fn inconsistent(msg: String) -> FlowSharesError {
    SnapshotError::Inconsistent(msg).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MemoryAsset;
    use flowshares_core::constants::SHARE_SCALE;
    use flowshares_core::traits::FlowCallbacks;

    fn pid(seed: u8) -> ParticipantId {
        ParticipantId([seed; 20])
    }

    fn populated() -> FlowSharesEngine {
        let mut engine = FlowSharesEngine::new();
        engine.notify_flow_started(pid(1), 3 * SHARE_SCALE, 10).unwrap();
        engine.notify_flow_started(pid(2), 5 * SHARE_SCALE, 20).unwrap();
        engine.notify_subscription_approved(pid(1)).unwrap();
        engine.notify_subscription_approved(pid(9)).unwrap();
        let mut asset = MemoryAsset::new();
        asset.deposit(1_000).unwrap();
        engine.distribute(&mut asset).unwrap();
        engine
    }

    #[test]
    fn restore_reproduces_engine() {
        let engine = populated();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.participants.len(), 3);
        let restored = FlowSharesEngine::restore(&snapshot).unwrap();
        assert_eq!(restored, engine);
        restored.check_invariants().unwrap();
    }

    #[test]
    fn bincode_and_json_forms_decode_to_same_snapshot() {
        let snapshot = populated().snapshot();
        let from_bin = EngineSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        let from_json = EngineSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(from_bin, snapshot);
        assert_eq!(from_json, snapshot);
    }

    #[test]
    fn index_only_participant_survives() {
        let snapshot = populated().snapshot();
        let p9 = snapshot.participants.iter().find(|p| p.id == pid(9)).unwrap();
        assert!(p9.flow.is_none());
        assert_eq!(p9.subscription, Some(Subscription { units: 0, approved: true, credited: 0 }));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.version = SNAPSHOT_VERSION + 1;
        let bytes = snapshot.encode().unwrap();
        assert_eq!(
            EngineSnapshot::decode(&bytes),
            Err(SnapshotError::UnsupportedVersion(SNAPSHOT_VERSION + 1))
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = populated().snapshot().encode().unwrap();
        bytes.push(0);
        assert!(matches!(EngineSnapshot::decode(&bytes), Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn tampered_totals_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.totals.approved += 1;
        assert!(matches!(
            FlowSharesEngine::restore(&snapshot),
            Err(FlowSharesError::Snapshot(SnapshotError::Inconsistent(_)))
        ));
    }

    #[test]
    fn tampered_shares_rejected() {
        let mut snapshot = populated().snapshot();
        let flow = snapshot.participants[0].flow.as_mut().unwrap();
        flow.shares += 1;
        assert!(FlowSharesEngine::restore(&snapshot).is_err());
    }

    #[test]
    fn in_flight_payout_rejected() {
        let mut snapshot = populated().snapshot();
        snapshot.distributor.in_flight = 5;
        assert!(FlowSharesEngine::restore(&snapshot).is_err());
    }

    #[test]
    fn zero_scale_rejected() {
        let mut snapshot = FlowSharesEngine::new().snapshot();
        snapshot.share_scale = 0;
        assert!(FlowSharesEngine::restore(&snapshot).is_err());
    }
}
