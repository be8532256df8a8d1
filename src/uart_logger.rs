//! UART log output.
//!
//! Drains [`PLAYER_LOG`](crate::PLAYER_LOG) to UART0 (the ESP32 console,
//! GPIO1 TX). Called by the main loop between refill ticks and once more
//! before deep sleep, never from inside a tick.
//!
//! # Hardware Setup
//!
//! ```text
//! ESP32 GPIO1 (TX0) ──────▶ on-board USB-UART bridge
//!                            └─▶ PC Serial Monitor
//! ```

use core::fmt::Write;

use esp_idf_svc::hal::gpio;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartTxDriver};

use crate::logging::{format_entry, BufWriter, LogStream, MAX_MSG_LEN};

/// Room for the level letter, timestamp and tag in front of the message.
const LINE_LEN: usize = MAX_MSG_LEN + 48;

/// UART configuration for logging.
pub struct UartLoggerConfig {
    pub baud_rate: u32,
    pub tx_pin: u8,
}

impl Default for UartLoggerConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            tx_pin: 1,
        }
    }
}

/// Take over UART0 TX for log output.
pub fn init_uart_logger<'d>(
    uart: impl Peripheral<P = uart::UART0> + 'd,
    tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'd,
    config: &UartLoggerConfig,
) -> Result<UartTxDriver<'d>, esp_idf_svc::sys::EspError> {
    let uart_config = uart::config::Config::default().baudrate(esp_idf_svc::hal::units::Hertz(config.baud_rate));

    UartTxDriver::new(
        uart,
        tx_pin,
        Option::<gpio::AnyIOPin>::None,
        Option::<gpio::AnyIOPin>::None,
        &uart_config,
    )
}

/// Write every pending entry, then report drops if any. Returns entries written.
pub fn drain_to_uart(uart: &mut UartTxDriver<'_>, stream: &LogStream) -> usize {
    let mut line = [0u8; LINE_LEN];
    let mut written = 0;

    while let Some(entry) = stream.drain() {
        let len = format_entry(&entry, &mut line);
        let _ = uart.write(&line[..len]);
        written += 1;
    }

    let dropped = stream.dropped();
    if dropped > 0 {
        let mut msg = [0u8; 64];
        let mut w = BufWriter::new(&mut msg);
        let _ = write!(w, "W log: dropped {} messages\r\n", dropped);
        let _ = uart.write(w.written());
        stream.reset_dropped();
    }

    written
}

/// Write raw diagnostics text (dumps) straight to the UART.
pub struct UartWriter<'u, 'd>(pub &'u mut UartTxDriver<'d>);

impl Write for UartWriter<'_, '_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write(s.as_bytes()).map(|_| ()).map_err(|_| core::fmt::Error)
    }
}
