//! Error types for the FlowShares engine.
use thiserror::Error;

use crate::types::ParticipantId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParticipantIdError {
    #[error("invalid length: expected 40 hex digits, got {0}")] InvalidLength(usize),
    #[error("invalid hex")] InvalidHex,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("out-of-order update for {participant}: now {now} < last update {last_update}")] OutOfOrder { participant: ParticipantId, last_update: u64, now: u64 },
    #[error("flow rate {rate} exceeds maximum {max}")] RateOutOfRange { rate: u128, max: u128 },
    #[error("share scale must be non-zero")] InvalidScale,
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("credit underflow for {participant}")] CreditUnderflow { participant: ParticipantId },
    #[error("unknown subscriber: {participant}")] UnknownSubscriber { participant: ParticipantId },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("payout rejected: {0}")] Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("asset: {0}")] Asset(#[from] AssetError),
    #[error("index: {0}")] Index(#[from] IndexError),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
    #[error("unsupported snapshot version: {0}")] UnsupportedVersion(u32),
    #[error("inconsistent snapshot: {0}")] Inconsistent(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowSharesError {
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Index(#[from] IndexError),
    #[error(transparent)] Distribution(#[from] DistributionError),
    #[error(transparent)] Snapshot(#[from] SnapshotError),
    #[error("invariant violation: {0}")] InvariantViolation(String),
}

impl From<AssetError> for FlowSharesError {
    fn from(e: AssetError) -> Self {
        DistributionError::from(e).into()
    }
}
