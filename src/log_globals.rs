//! Global log stream instance.
//!
//! The firmware runs a single cooperative loop, so one stream suffices:
//! the player and engine push, the UART drain empties it between ticks.

use crate::logging::LogStream;

/// Player log stream, drained to UART0 by [`uart_logger`](crate::uart_logger).
pub static PLAYER_LOG: LogStream = LogStream::new();
