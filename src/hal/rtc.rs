//! RTC domain HAL: slow memory, 8 MHz clock, DAC pad and the ULP-FSM.
//!
//! Implements the [`platform`](crate::platform) traits over ESP-IDF so the
//! output engine runs unchanged on the chip.

use core::sync::atomic::{AtomicBool, Ordering};

use esp_idf_svc::sys;

use crate::calibration;
use crate::layout::{SharedMemory, REGION_WORDS, RESERVED_START};
use crate::platform::{Clock, Coprocessor, LowPowerSleep};
use crate::ulp::program::DacChannel;

/// Base of RTC slow memory as seen by the main cores.
const RTC_SLOW_MEM: *mut u32 = 0x5000_0000 as *mut u32;

/// `RTC_CAL_8MD256`: calibrate against RTC_FAST_CLK / 256.
const RTC_CAL_8MD256: u32 = 1;

/// RTC_FAST_CLK periods averaged by one calibration run.
const CAL_SLOW_CYCLES: u32 = 1000;

// Not exported through the generated bindings on every IDF release.
extern "C" {
    fn rtc_clk_8m_enable(clk_8m_en: bool, d256_en: bool);
    fn rtc_clk_8m_enabled() -> bool;
    fn rtc_clk_8md256_enabled() -> bool;
    fn rtc_clk_cal(cal_clk: u32, slow_clk_cycles: u32) -> u32;
    fn dac_output_enable(channel: u32) -> sys::esp_err_t;
    fn dac_output_disable(channel: u32) -> sys::esp_err_t;
    fn dac_output_voltage(channel: u32, dac_value: u8) -> sys::esp_err_t;
    fn ulp_run(entry_point: u32) -> sys::esp_err_t;
}

fn dac_index(channel: DacChannel) -> u32 {
    match channel {
        DacChannel::Dac1 => 0,
        DacChannel::Dac2 => 1,
    }
}

/// Disconnect a DAC pad without holding an [`RtcUlp`] (before deep sleep).
pub fn disable_dac(channel: DacChannel) {
    unsafe {
        dac_output_disable(dac_index(channel));
    }
}

static TAKEN: AtomicBool = AtomicBool::new(false);

/// Exclusive handle on RTC slow memory and the ULP.
pub struct RtcUlp {
    channel: DacChannel,
}

impl RtcUlp {
    /// Claim the RTC domain. Returns `None` if already claimed.
    pub fn take(channel: DacChannel) -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { channel })
    }

    fn dac_index(&self) -> u32 {
        dac_index(self.channel)
    }

    /// Connect the DAC pad (amplifier path).
    pub fn enable_output(&mut self) {
        unsafe {
            dac_output_enable(self.dac_index());
        }
    }
}

impl SharedMemory for RtcUlp {
    #[inline]
    fn read_word(&self, addr: usize) -> u32 {
        debug_assert!(addr < REGION_WORDS);
        // SAFETY: addr is inside the 8 KiB slow memory block; the ULP writes
        // it concurrently, hence volatile.
        unsafe { RTC_SLOW_MEM.add(addr).read_volatile() }
    }

    #[inline]
    fn write_word(&mut self, addr: usize, value: u32) {
        debug_assert!(addr < RESERVED_START, "word {} belongs to ESP-IDF", addr);
        // SAFETY: as above; `RtcUlp` is unique so the host side has one writer.
        unsafe { RTC_SLOW_MEM.add(addr).write_volatile(value) }
    }

    fn len(&self) -> usize {
        REGION_WORDS
    }
}

impl Coprocessor for RtcUlp {
    fn enable_clock(&mut self) {
        unsafe { rtc_clk_8m_enable(true, true) }
    }

    fn clock_ready(&self) -> bool {
        unsafe { rtc_clk_8m_enabled() && rtc_clk_8md256_enabled() }
    }

    fn measure_clock_hz(&mut self) -> u32 {
        let period = unsafe { rtc_clk_cal(RTC_CAL_8MD256, CAL_SLOW_CYCLES) };
        unsafe { rtc_clk_8m_enable(true, false) };
        calibration::fast_clock_hz(period)
    }

    fn disable_output(&mut self) {
        unsafe {
            dac_output_disable(self.dac_index());
        }
    }

    fn set_output_level(&mut self, level: u8) {
        unsafe {
            dac_output_voltage(self.dac_index(), level);
        }
    }

    fn start(&mut self, entry: usize) {
        unsafe {
            ulp_run(entry as u32);
        }
    }
}

impl LowPowerSleep for RtcUlp {
    fn light_sleep_us(&mut self, us: u32) {
        unsafe {
            sys::esp_sleep_enable_timer_wakeup(us as u64);
            sys::esp_light_sleep_start();
            // Deep sleep later must only wake on touch
            sys::esp_sleep_disable_wakeup_source(sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER);
        }
    }
}

impl Clock for RtcUlp {
    fn now_us(&self) -> i64 {
        EspClock.now_us()
    }
}

/// `esp_timer` microseconds since boot.
#[derive(Clone, Copy, Debug, Default)]
pub struct EspClock;

impl Clock for EspClock {
    fn now_us(&self) -> i64 {
        unsafe { sys::esp_timer_get_time() }
    }
}
