//! # flowshares-core
//! Foundation types and traits for the FlowShares accounting engine.

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
