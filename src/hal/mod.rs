//! Hardware Abstraction Layer for the ESP32 player.
//!
//! Thin wrappers around ESP-IDF and the FLAC component.
//! Business logic stays in core modules, HAL is just I/O.

pub mod foxen;
pub mod rtc;

pub use foxen::FoxenFlac;
pub use rtc::{EspClock, RtcUlp};
