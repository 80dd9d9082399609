//! # flowshares-engine — Continuous-flow share accounting.
//!
//! All calculations use checked integer arithmetic; amounts are `u128`,
//! timestamps are `u64` Unix seconds.
//!
//! The engine turns streaming contributions into proportional payouts:
//! - **Share conversion**: a flow rate maps to `rate / scale` share units.
//! - **Flow ledger**: per-participant rate checkpoints and the amount accrued
//!   since the last checkpoint (the uninvested amount).
//! - **Subscription index**: approved and pending unit buckets with opt-in
//!   and opt-out.
//! - **Distribution**: pro-rata, floored split of the held output balance,
//!   committed before the external payout and rolled back if it fails.

pub mod asset;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod index;
pub mod ledger;
pub mod shared;
pub mod shares;
pub mod snapshot;

pub use asset::MemoryAsset;
pub use config::EngineConfig;
pub use distribution::{DistributionEngine, DistributorState, PendingDistribution};
pub use engine::FlowSharesEngine;
pub use index::SubscriptionIndex;
pub use ledger::FlowLedger;
pub use shared::SharedEngine;
pub use shares::ScaledConverter;
pub use snapshot::{EngineSnapshot, ParticipantState};
