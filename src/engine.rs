//! Host side of the ULP output engine.
//!
//! # Handshake
//!
//! ```text
//!  host (write_cursor, local)          ULP (read cursor, word 17)
//!  ──────────────────────────          ──────────────────────────
//!  free = read/2 - write  (mod N)  ◀── st r0, r3, 17 every sample
//!  ring[write] = pair; write += 1  ──▶ ld r1, r2, RING_START
//! ```
//!
//! Each cursor has exactly one writer, so polling is safe without locks or
//! atomics. `refill` does not look at the read cursor: callers fill at most
//! `free_slot_count()` slots per tick or they overwrite unplayed samples.

use core::fmt;

use crate::calibration::{Calibration, Clamp};
use crate::config::EngineConfig;
use crate::dump;
use crate::fault::EngineError;
use crate::layout::{self, PROG_START, READ_CURSOR_ADDR, RING_LEN};
use crate::logging::LogStream;
use crate::platform::Platform;
use crate::ulp::program::{self, PlaybackProgram};
use crate::{rt_info, rt_warn};

const TAG: &str = "ulpSound";

/// Output engine: owns the platform and the host write cursor.
pub struct OutputEngine<'a, P: Platform> {
    platform: P,
    log: &'a LogStream,
    config: EngineConfig,
    write_cursor: u16,
    sampling_rate: u32,
    calibration: Option<Calibration>,
}

impl<'a, P: Platform> OutputEngine<'a, P> {
    pub fn new(platform: P, log: &'a LogStream, config: EngineConfig) -> Self {
        Self {
            platform,
            log,
            config,
            write_cursor: 0,
            sampling_rate: 0,
            calibration: None,
        }
    }

    /// Calibrate, load and start the ULP; returns the achieved sampling rate.
    ///
    /// Blocks in light sleep until the RTC clock is stable and again until
    /// the ULP publishes its first read position. With
    /// `EngineConfig::max_polls == None` both waits are unbounded.
    pub fn init(&mut self, target_rate: u32) -> Result<u32, EngineError> {
        self.write_cursor = 0;
        program::clear_program(&mut self.platform);

        self.platform.enable_clock();
        self.platform.disable_output();
        rt_info!(self.log, self.platform.now_us(), TAG, "Sampling rate target: {}Hz", target_rate);

        self.poll_until(|p| p.clock_ready())
            .map_err(|polls| EngineError::ClockTimeout { polls })?;

        let clock_hz = self.platform.measure_clock_hz();
        let cal = Calibration::plan(clock_hz, target_rate, self.config.loop_cycles);
        let now = self.platform.now_us();
        rt_info!(self.log, now, TAG, "RTC freq: {}Hz", clock_hz);
        rt_info!(self.log, now, TAG, "Maximum sampling rate at current RTC clock: {}Hz", cal.max_rate);
        match cal.clamp {
            Some(Clamp::AboveMaximum) => {
                rt_warn!(self.log, now, TAG, "Sampling rate has been set to {}Hz", cal.sampling_rate)
            }
            Some(Clamp::BelowMinimum) => {
                rt_warn!(self.log, now, TAG, "Sampling rate raised to minimum {}Hz", cal.sampling_rate)
            }
            None => {}
        }
        rt_info!(self.log, now, TAG, "Delay time: {}", cal.delay);
        rt_info!(self.log, now, TAG, "Sampling rate current: {}Hz", cal.sampling_rate);

        let program = PlaybackProgram::build(cal.delay)?;
        program.load(&mut self.platform);
        rt_info!(self.log, now, TAG, "Program loaded, {} words", program.words().len());
        program::load_output_table(&mut self.platform, self.config.channel, program.resume);

        // Prime the ring at the idle level so the first loop plays silence
        let idle = self.config.idle_level;
        self.platform.set_output_level(idle);
        self.platform.write_word(READ_CURSOR_ADDR, 0);
        for slot in 0..RING_LEN {
            self.platform
                .write_word(layout::slot_addr(slot), layout::pack_pair(idle, idle) as u32);
        }

        self.sampling_rate = cal.sampling_rate;
        self.calibration = Some(cal);

        self.platform.start(PROG_START);
        self.poll_until(|p| p.read_word(READ_CURSOR_ADDR) & 0xFFFF != 0)
            .map_err(|polls| EngineError::StartTimeout { polls })?;

        rt_info!(self.log, self.platform.now_us(), TAG, "ULP started");
        Ok(cal.sampling_rate)
    }

    /// Light-sleep between checks until `ready`, or give up after `max_polls`.
    fn poll_until(&mut self, ready: impl Fn(&P) -> bool) -> Result<(), u32> {
        let mut polls = 0u32;
        while !ready(&self.platform) {
            if let Some(max) = self.config.max_polls {
                if polls >= max {
                    return Err(polls);
                }
            }
            self.platform.light_sleep_us(self.config.poll_interval_us);
            polls = polls.saturating_add(1);
        }
        Ok(())
    }

    /// Slots the host may fill without overtaking the ULP.
    ///
    /// 0 means the ring is saturated: the ULP is not draining it.
    #[inline]
    pub fn free_slot_count(&self) -> u16 {
        layout::free_slots(self.platform.read_word(READ_CURSOR_ADDR), self.write_cursor)
    }

    /// Store one packed sample pair and advance the write cursor.
    #[inline]
    pub fn refill(&mut self, packed_dual_sample: u16) {
        self.platform
            .write_word(layout::slot_addr(self.write_cursor as usize), packed_dual_sample as u32);
        self.write_cursor += 1;
        if self.write_cursor as usize == RING_LEN {
            self.write_cursor = 0;
        }
    }

    /// Sample index last published by the ULP.
    pub fn read_cursor(&self) -> u16 {
        (self.platform.read_word(READ_CURSOR_ADDR) & 0xFFFF) as u16
    }

    pub fn write_cursor(&self) -> u16 {
        self.write_cursor
    }

    /// Achieved rate of the last `init`, 0 before.
    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Current time from the platform clock.
    pub fn now_us(&self) -> i64 {
        self.platform.now_us()
    }

    /// Dump program, cursor, ring and DAC table.
    pub fn dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        dump::write_status(&self.platform, out)
    }
}
