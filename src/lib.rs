//! # ulp-flac-player
//!
//! Plays a FLAC image from flash through the ESP32 DAC while the main cores
//! sleep.
//!
//! ## Architecture
//!
//! ```text
//! FLAC bytes ─▶ DecodeDriver ─▶ Player ─▶ OutputEngine ─▶ ring ─▶ ULP ─▶ DAC
//!                                              ▲                   │
//!                                              └── read cursor ────┘
//! ```
//!
//! The host and the ULP coprocessor share only RTC slow memory. Each side
//! owns one cursor; the host fills the ring on a timer and the ULP drains it
//! at the calibrated sample rate. See [`layout`] for the memory map.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "firmware")]
extern crate alloc;

pub mod calibration;
pub mod config;
pub mod decoder;
pub mod dump;
pub mod engine;
pub mod fault;
pub mod layout;
pub mod logging;
pub mod platform;
pub mod player;
pub mod ulp;

#[cfg(feature = "firmware")]
pub mod hal;
#[cfg(feature = "firmware")]
pub mod log_globals;
#[cfg(feature = "firmware")]
pub mod uart_logger;

pub use calibration::Calibration;
pub use config::{EngineConfig, PlayerConfig};
pub use decoder::{DecodeDriver, DecoderState, FrameDecoder, Progress};
pub use engine::OutputEngine;
pub use fault::{DecodeError, EngineError, FaultCode, PlayerError, SynthError};
pub use layout::{RamRegion, SharedMemory};
pub use logging::LogStream;
pub use platform::{Clock, Coprocessor, LowPowerSleep, Platform};
pub use player::Player;

#[cfg(feature = "firmware")]
pub use log_globals::PLAYER_LOG;
