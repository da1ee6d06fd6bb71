pub mod http;
pub mod range;

use std::time::Duration;

/// Converts a value expressed in `timescale` units per second into a [`Duration`].
///
/// A zero timescale is treated as 1.
pub fn ticks_to_duration(ticks: u64, timescale: u64) -> Duration {
    let timescale = timescale.max(1) as u128;
    let nanos = ticks as u128 * 1_000_000_000 / timescale;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Inverse of [`ticks_to_duration`], rounding down.
pub fn duration_to_ticks(duration: Duration, timescale: u64) -> u64 {
    let ticks = duration.as_nanos() * timescale.max(1) as u128 / 1_000_000_000;
    ticks.min(u64::MAX as u128) as u64
}
