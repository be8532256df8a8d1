//! Module: config
//!
//! Purpose: Tunables for the output engine and the player.
//!
//! Defaults reproduce the behavior the firmware shipped with: DAC1, 1 ms
//! low-power polls with no upper bound, a 10 ms refill tick and a circuit
//! breaker after 100 glitches.

use crate::calibration::LOOP_CYCLES;
use crate::ulp::program::DacChannel;

/// Output engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// DAC driven by the ULP.
    pub channel: DacChannel,
    /// Light-sleep interval between clock/start polls (µs).
    pub poll_interval_us: u32,
    /// Give up after this many polls. `None` waits forever.
    pub max_polls: Option<u32>,
    /// Cost of one loop iteration in RTC_FAST_CLK cycles.
    pub loop_cycles: u32,
    /// DAC level held while the ring is primed.
    pub idle_level: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel: DacChannel::Dac1,
            poll_interval_us: 1_000,
            max_polls: None,
            loop_cycles: LOOP_CYCLES,
            idle_level: 0x80,
        }
    }
}

impl EngineConfig {
    /// Same defaults, but the polls give up after `max_polls`.
    pub fn bounded(max_polls: u32) -> Self {
        Self {
            max_polls: Some(max_polls),
            ..Self::default()
        }
    }
}

/// Player configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Glitches (ticks with a full ring) before playback is abandoned.
    pub glitch_limit: u32,
    /// Interval at which the application calls `refill_tick` (ms).
    pub tick_interval_ms: u32,
    /// Quiet time after playback before the application sleeps (ms).
    pub drain_delay_ms: u32,
    /// Decoder calls without progress before the stream is declared stuck.
    pub stall_limit: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            glitch_limit: 100,
            tick_interval_ms: 10,
            drain_delay_ms: 100,
            stall_limit: 64,
        }
    }
}
