//! Engine constants. All amounts are in the smallest indivisible unit of
//! their asset (wei for 18-decimal tokens).

/// One whole token with 18 decimals.
pub const TOKEN: u128 = 1_000_000_000_000_000_000;

/// Default divisor mapping a flow rate (units per second) to a share count.
///
/// With 18-decimal tokens, 100 tokens streamed over 30 days is a rate of
/// ~3.858e13 per second, i.e. ~38_580 shares.
///
/// # Examples
///
/// ```
/// use flowshares_core::constants::{SHARE_SCALE, SECONDS_PER_MONTH, TOKEN};
/// let rate = 100 * TOKEN / SECONDS_PER_MONTH as u128;
/// assert_eq!(rate / SHARE_SCALE, 38_580);
/// ```
pub const SHARE_SCALE: u128 = 1_000_000_000;

/// Largest accepted flow rate: the positive range of the host's signed
/// 96-bit flow rate.
pub const MAX_FLOW_RATE: u128 = (1u128 << 95) - 1;

/// Thirty days in seconds.
pub const SECONDS_PER_MONTH: u64 = 30 * 24 * 60 * 60;

/// Current engine snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;
