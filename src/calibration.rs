//! Sample-rate calibration against the measured RTC fast clock.
//!
//! The 8 MHz RTC oscillator drifts with supply and temperature, so its
//! frequency is measured at every init and the loop delay derived from it.
//! The achieved rate is an integer division away from the target and must be
//! read back by the caller.

use crate::ulp::program::MAX_DELAY;

/// Fixed cost of one loop iteration in RTC_FAST_CLK cycles, measured on silicon.
pub const LOOP_CYCLES: u32 = 86;

/// Fractional bits of the `rtc_clk_cal` period result.
pub const CAL_FRACT_BITS: u32 = 19;

/// Divider in front of the 8 MHz clock while calibrating.
pub const CAL_DIVIDER: u64 = 256;

/// Why the requested rate could not be honored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clamp {
    /// Target above what the loop can do (or zero): running flat out.
    AboveMaximum,
    /// Target so low the delay does not fit a `wait`: running at the slowest rate.
    BelowMinimum,
}

/// Outcome of a calibration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Calibration {
    /// Measured RTC fast clock.
    pub clock_hz: u32,
    /// Rate asked for.
    pub target_rate: u32,
    /// Extra wait cycles per sample.
    pub delay: u16,
    /// Rate the loop will actually run at.
    pub sampling_rate: u32,
    /// Fastest rate at this clock.
    pub max_rate: u32,
    /// Set when the target was out of reach.
    pub clamp: Option<Clamp>,
}

impl Calibration {
    /// Derive the loop delay for `target_rate` at `clock_hz`.
    pub fn plan(clock_hz: u32, target_rate: u32, loop_cycles: u32) -> Self {
        let loop_cycles = loop_cycles.max(1);
        let max_rate = clock_hz / loop_cycles;

        let (delay, clamp) = if target_rate == 0 {
            (0, Some(Clamp::AboveMaximum))
        } else {
            let wanted = (clock_hz / target_rate) as i64 - loop_cycles as i64;
            if wanted < 0 {
                (0, Some(Clamp::AboveMaximum))
            } else if wanted > MAX_DELAY as i64 {
                (MAX_DELAY, Some(Clamp::BelowMinimum))
            } else {
                (wanted as u16, None)
            }
        };

        Self {
            clock_hz,
            target_rate,
            delay,
            sampling_rate: clock_hz / (loop_cycles + delay as u32),
            max_rate,
            clamp,
        }
    }
}

/// RTC fast clock frequency from an `rtc_clk_cal` result on the /256 clock.
///
/// `period` is the duration of one divided cycle in microseconds, Q13.19.
pub fn fast_clock_hz(period: u32) -> u32 {
    if period == 0 {
        return 0;
    }
    let scaled = 1_000_000u64 * (1u64 << CAL_FRACT_BITS) * CAL_DIVIDER;
    (scaled / period as u64).min(u32::MAX as u64) as u32
}
