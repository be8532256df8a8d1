//! UlpFlacPlayer - firmware entry point
//!
//! Boot flow:
//! 1. Amplifier off, touch pad 7 armed as the wake source
//! 2. Not woken by touch: straight back to deep sleep
//! 3. Woken by touch: play the embedded clip, refilling every 10 ms
//! 4. Let the ring drain, amplifier off, deep sleep

#![no_std]
#![no_main]

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::sys::{self as esp_idf_sys, esp, EspError};

use ulp_flac_player::hal::foxen::{FoxenFlac, MAX_BLOCK_SIZE, MAX_CHANNELS};
use ulp_flac_player::hal::rtc::{self, EspClock, RtcUlp};
use ulp_flac_player::uart_logger::{drain_to_uart, init_uart_logger, UartLoggerConfig, UartWriter};
use ulp_flac_player::ulp::DacChannel;
use ulp_flac_player::{rt_error, rt_info, rt_warn};
use ulp_flac_player::{Clock, EngineConfig, OutputEngine, Player, PlayerConfig, PlayerError, PLAYER_LOG};

const TAG: &str = "main";

/// MIX2018 amplifier enable, active low.
const AMP_EN_GPIO: i32 = 26;
/// On-board status LED, lit while setting up.
const LED_GPIO: i32 = 2;
/// Touch pad 7 (GPIO27) wakes the board.
const WAKE_TOUCH_PAD: u32 = 7;

const OUTPUT_CHANNEL: DacChannel = DacChannel::Dac1;

static CLIP: &[u8] = include_bytes!(env!("PLAYER_CLIP"));

#[no_mangle]
fn main() {
    // Initialize ESP-IDF
    esp_idf_sys::link_patches();

    if let Err(err) = run() {
        rt_error!(PLAYER_LOG, EspClock.now_us(), TAG, "setup failed: {}", err);
    }
    enter_deep_sleep();
}

fn run() -> Result<(), EspError> {
    let peripherals = Peripherals::take()?;
    let mut uart = init_uart_logger(peripherals.uart0, peripherals.pins.gpio1, &UartLoggerConfig::default())?;
    rt_info!(PLAYER_LOG, EspClock.now_us(), TAG, "{}", env!("VERSION_STRING"));

    unsafe {
        esp!(esp_idf_sys::gpio_sleep_set_pull_mode(AMP_EN_GPIO, esp_idf_sys::gpio_pull_mode_t_GPIO_PULLUP_ONLY))?;
        esp!(esp_idf_sys::gpio_pullup_en(AMP_EN_GPIO))?;
        esp!(esp_idf_sys::gpio_set_level(AMP_EN_GPIO, 1))?;
        esp!(esp_idf_sys::gpio_set_direction(AMP_EN_GPIO, esp_idf_sys::gpio_mode_t_GPIO_MODE_OUTPUT))?;

        esp!(esp_idf_sys::gpio_set_level(LED_GPIO, 1))?;
        esp!(esp_idf_sys::gpio_set_direction(LED_GPIO, esp_idf_sys::gpio_mode_t_GPIO_MODE_OUTPUT))?;
    }

    let wakeup = unsafe { esp_idf_sys::esp_sleep_get_wakeup_cause() };
    log_wakeup_reason(wakeup);
    arm_touch_wakeup()?;

    unsafe {
        esp!(esp_idf_sys::gpio_set_level(LED_GPIO, 0))?;
    }
    let setup_us = EspClock.now_us();
    rt_info!(PLAYER_LOG, setup_us, TAG, "Setup took {}.{:03} ms", setup_us / 1000, setup_us % 1000);
    drain_to_uart(&mut uart, &PLAYER_LOG);

    if wakeup != esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TOUCHPAD {
        return Ok(());
    }

    rt_info!(PLAYER_LOG, EspClock.now_us(), TAG, "Linking");
    let Some(decoder) = FoxenFlac::new(MAX_BLOCK_SIZE, MAX_CHANNELS) else {
        rt_error!(PLAYER_LOG, EspClock.now_us(), TAG, "Cannot allocate FLAC decoder");
        drain_to_uart(&mut uart, &PLAYER_LOG);
        return Ok(());
    };

    let config = PlayerConfig::default();
    let mut player = Player::new(decoder, EspClock, &PLAYER_LOG, config);
    let engine = RtcUlp::take(OUTPUT_CHANNEL).map(|rtc| {
        OutputEngine::new(
            rtc,
            &PLAYER_LOG,
            EngineConfig {
                channel: OUTPUT_CHANNEL,
                ..EngineConfig::default()
            },
        )
    });
    // A missing engine is logged by the player; play reports it again
    let _ = player.link(engine);

    match player.play(CLIP) {
        Ok(rate) => rt_info!(PLAYER_LOG, EspClock.now_us(), TAG, "Playing at {}Hz", rate),
        Err(err) => {
            rt_error!(PLAYER_LOG, EspClock.now_us(), TAG, "Playback failed: {}", err);
            drain_to_uart(&mut uart, &PLAYER_LOG);
            return Ok(());
        }
    }

    set_amplifier_enable(true)?;
    if let Some(engine) = player.engine_mut() {
        engine.platform_mut().enable_output();
    }

    while player.is_playing() {
        match player.refill_tick() {
            Ok(_) => {}
            Err(PlayerError::Backpressure { glitches }) => {
                rt_warn!(PLAYER_LOG, EspClock.now_us(), TAG, "Dumping ULP state after {} glitches", glitches);
                drain_to_uart(&mut uart, &PLAYER_LOG);
                let _ = player.dump(&mut UartWriter(&mut uart));
            }
            Err(err) => rt_error!(PLAYER_LOG, EspClock.now_us(), TAG, "{}", err),
        }
        drain_to_uart(&mut uart, &PLAYER_LOG);
        FreeRtos::delay_ms(config.tick_interval_ms);
    }

    FreeRtos::delay_ms(config.drain_delay_ms);
    let fault = player.fault();
    if fault.is_failure() {
        rt_warn!(PLAYER_LOG, EspClock.now_us(), TAG, "Playback stopped early: {:?}", fault);
    }
    rt_info!(PLAYER_LOG, EspClock.now_us(), TAG, "Deep sleep start");
    drain_to_uart(&mut uart, &PLAYER_LOG);
    Ok(())
}

fn log_wakeup_reason(cause: esp_idf_sys::esp_sleep_wakeup_cause_t) {
    let now = EspClock.now_us();
    match cause {
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 => {
            rt_info!(PLAYER_LOG, now, TAG, "Wakeup caused by external signal using RTC_IO")
        }
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 => {
            rt_info!(PLAYER_LOG, now, TAG, "Wakeup caused by external signal using RTC_CNTL")
        }
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => {
            rt_info!(PLAYER_LOG, now, TAG, "Wakeup caused by timer")
        }
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TOUCHPAD => {
            let pad = unsafe { esp_idf_sys::esp_sleep_get_touchpad_wakeup_status() };
            rt_info!(PLAYER_LOG, now, TAG, "Wakeup caused by touchpad {}", pad)
        }
        esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_ULP => {
            rt_info!(PLAYER_LOG, now, TAG, "Wakeup caused by ULP program")
        }
        other => rt_info!(PLAYER_LOG, now, TAG, "Wakeup was not caused by deep sleep: {}", other),
    }
}

/// Touch pad 7 on SET1 wakes the chip; threshold at 2/3 of the idle reading.
fn arm_touch_wakeup() -> Result<(), EspError> {
    unsafe {
        esp!(esp_idf_sys::touch_pad_init())?;
        esp!(esp_idf_sys::touch_pad_set_fsm_mode(esp_idf_sys::touch_fsm_mode_t_TOUCH_FSM_MODE_TIMER))?;
        esp!(esp_idf_sys::touch_pad_set_voltage(
            esp_idf_sys::touch_high_volt_t_TOUCH_HVOLT_2V7,
            esp_idf_sys::touch_low_volt_t_TOUCH_LVOLT_0V5,
            esp_idf_sys::touch_volt_atten_t_TOUCH_HVOLT_ATTEN_1V,
        ))?;
        esp!(esp_idf_sys::touch_pad_config(WAKE_TOUCH_PAD, 40))?;

        let mut touch_value: u16 = 0;
        esp!(esp_idf_sys::touch_pad_read(WAKE_TOUCH_PAD, &mut touch_value))?;
        rt_info!(PLAYER_LOG, EspClock.now_us(), TAG, "touch pad [{}] val is {}", WAKE_TOUCH_PAD, touch_value);
        esp!(esp_idf_sys::touch_pad_set_thresh(WAKE_TOUCH_PAD, (touch_value as u32 * 2 / 3) as u16))?;

        esp!(esp_idf_sys::touch_pad_set_group_mask(1 << WAKE_TOUCH_PAD, 0, 1 << WAKE_TOUCH_PAD))?;
        esp!(esp_idf_sys::touch_pad_set_trigger_source(
            esp_idf_sys::touch_trigger_src_t_TOUCH_TRIGGER_SOURCE_SET1
        ))?;
        esp!(esp_idf_sys::esp_sleep_enable_touchpad_wakeup())?;
    }
    Ok(())
}

/// Amplifier enable is active low.
fn set_amplifier_enable(enable: bool) -> Result<(), EspError> {
    unsafe { esp!(esp_idf_sys::gpio_set_level(AMP_EN_GPIO, if enable { 0 } else { 1 })) }
}

fn enter_deep_sleep() -> ! {
    let _ = set_amplifier_enable(false);
    rtc::disable_dac(OUTPUT_CHANNEL);
    unsafe { esp_idf_sys::esp_deep_sleep_start() }
}
