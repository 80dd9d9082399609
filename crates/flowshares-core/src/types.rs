//! Core engine types: participant identities, ledger records, subscriptions,
//! payouts.
//!
//! Amounts, flow rates and share counts are `u128` in the smallest unit of
//! their asset. Timestamps are unix seconds as `u64`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ParticipantIdError;

/// Stable external identity of a participant (a 20-byte account address).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ParticipantId(pub [u8; 20]);

impl ParticipantId {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create a ParticipantId from a byte array.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a `0x`-prefixed (or bare) 40-character hex string.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowshares_core::types::ParticipantId;
    /// let id = ParticipantId::parse_hex("0x85fcd7dd0a1e1a9fcd5fd886ed522de8221c3ee5").unwrap();
    /// assert_eq!(id.as_bytes()[0], 0x85);
    /// assert_eq!(id.to_string(), "0x85fcd7dd0a1e1a9fcd5fd886ed522de8221c3ee5");
    /// ```
    pub fn parse_hex(s: &str) -> Result<Self, ParticipantIdError> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 40 {
            return Err(ParticipantIdError::InvalidLength(digits.len()));
        }
        let bytes = hex::decode(digits).map_err(|_| ParticipantIdError::InvalidHex)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ParticipantId {
    type Err = ParticipantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl From<[u8; 20]> for ParticipantId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ParticipantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A participant's flow checkpoint, owned by the flow ledger.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct FlowRecord {
    /// Current contribution rate, in input-asset units per second.
    pub flow_rate: u128,
    /// Unix time at which `flow_rate` became effective.
    pub last_update_time: u64,
    /// Share count derived from `flow_rate`.
    pub shares: u128,
}

impl FlowRecord {
    /// Whether the participant is currently streaming.
    pub fn is_active(&self) -> bool {
        self.flow_rate > 0
    }
}

/// Outcome of a single flow-rate change.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowUpdate {
    pub participant: ParticipantId,
    /// Amount accrued under `previous_rate` since the previous checkpoint.
    pub uninvested: u128,
    pub previous_rate: u128,
    pub new_rate: u128,
    pub previous_shares: u128,
    pub new_shares: u128,
    /// New checkpoint time.
    pub at: u64,
}

/// A participant's entry in the subscription index.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Subscription {
    /// Share units counted toward distributions.
    pub units: u128,
    /// Whether the participant has opted in to receive payouts.
    pub approved: bool,
    /// Lifetime output-asset amount credited by distributions.
    pub credited: u128,
}

/// Aggregate unit totals of the subscription index.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct IndexTotals {
    /// Units held by approved subscribers.
    pub approved: u128,
    /// Units held by subscribers that have not opted in.
    pub pending: u128,
}

impl IndexTotals {
    /// Sum of both buckets. `None` on overflow.
    pub fn total(&self) -> Option<u128> {
        self.approved.checked_add(self.pending)
    }
}

/// A single payout instruction for the output asset.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payout {
    pub participant: ParticipantId,
    pub amount: u128,
}

/// Result of a distribution call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct DistributionReceipt {
    /// Sequence number of this distribution (0 for a no-op).
    pub sequence: u64,
    /// Pool balance observed when the plan was made.
    pub pool_balance: u128,
    /// Approved units observed when the plan was made.
    pub total_approved_units: u128,
    /// Per-participant payouts, in participant order. Zero payouts are omitted.
    pub payouts: Vec<Payout>,
    /// Sum of `payouts`.
    pub distributed: u128,
    /// Remainder left in the pool.
    pub dust: u128,
}

impl DistributionReceipt {
    /// A receipt for a distribution that moved nothing.
    pub fn noop(pool_balance: u128, total_approved_units: u128) -> Self {
        Self {
            sequence: 0,
            pool_balance,
            total_approved_units,
            payouts: Vec::new(),
            distributed: 0,
            dust: pool_balance,
        }
    }

    /// Whether any amount was paid out.
    pub fn is_noop(&self) -> bool {
        self.distributed == 0
    }

    /// Amount paid to `participant`, or 0.
    pub fn amount_for(&self, participant: &ParticipantId) -> u128 {
        self.payouts
            .iter()
            .find(|p| &p.participant == participant)
            .map_or(0, |p| p.amount)
    }
}
