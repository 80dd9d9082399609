//! Integration test suite for FlowShares.
//!
//! Drives the composed engine through the host-facing ports only, the way a
//! streaming host would: flow notifications, opt-in and opt-out, inflow into
//! the output asset and permissionless distributions.

pub mod helpers;
