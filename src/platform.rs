//! Hardware seams of the output engine.
//!
//! The engine only talks to the chip through these traits. The firmware
//! implements them over ESP-IDF (`hal::rtc`); host tests implement them over
//! [`RamRegion`](crate::layout::RamRegion) and the ULP simulator.

use crate::layout::SharedMemory;

/// The ULP coprocessor and the RTC clock/DAC it depends on.
pub trait Coprocessor {
    /// Enable the 8 MHz RTC clock with its /256 divider for calibration.
    fn enable_clock(&mut self);

    /// True once both the clock and the divider report stable.
    fn clock_ready(&self) -> bool;

    /// Measure the RTC fast clock in Hz, then drop the /256 divider.
    fn measure_clock_hz(&mut self) -> u32;

    /// Disconnect the DAC pad while the program is swapped.
    fn disable_output(&mut self);

    /// Drive the DAC to `level` from the host side.
    fn set_output_level(&mut self, level: u8);

    /// Start executing at word `entry` of the program region.
    fn start(&mut self, entry: usize);
}

/// Sleep that keeps the RTC domain (and the ULP) running.
pub trait LowPowerSleep {
    /// Light-sleep the host for about `us` microseconds.
    fn light_sleep_us(&mut self, us: u32);
}

/// Monotonic microsecond clock.
pub trait Clock {
    fn now_us(&self) -> i64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> i64 {
        (**self).now_us()
    }
}

/// Everything the output engine needs from the chip.
pub trait Platform: SharedMemory + Coprocessor + LowPowerSleep + Clock {}

impl<T: SharedMemory + Coprocessor + LowPowerSleep + Clock> Platform for T {}
