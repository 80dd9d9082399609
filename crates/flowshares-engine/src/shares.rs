//! Share converter implementing the [`ShareConverter`] trait.
//!
//! Shares are the flow rate divided by a fixed scale, floored, so the
//! share total never over-allocates relative to contributed value.

use flowshares_core::constants::{MAX_FLOW_RATE, SHARE_SCALE};
use flowshares_core::error::LedgerError;
use flowshares_core::traits::ShareConverter;

/// The production converter: `shares = flow_rate / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledConverter {
    scale: u128,
}

impl ScaledConverter {
    /// Create a converter with a custom scale. Zero is rejected.
    pub fn new(scale: u128) -> Result<Self, LedgerError> {
        if scale == 0 {
            return Err(LedgerError::InvalidScale);
        }
        Ok(Self { scale })
    }
}

impl Default for ScaledConverter {
    fn default() -> Self {
        Self { scale: SHARE_SCALE }
    }
}

impl ShareConverter for ScaledConverter {
    fn shares(&self, flow_rate: u128) -> Result<u128, LedgerError> {
        if flow_rate > MAX_FLOW_RATE {
            return Err(LedgerError::RateOutOfRange { rate: flow_rate, max: MAX_FLOW_RATE });
        }
        Ok(flow_rate / self.scale)
    }

    fn scale(&self) -> u128 {
        self.scale
    }
}
