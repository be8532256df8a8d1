//! RT-safe logging for the playback pipeline.
//!
//! # Architecture
//!
//! ```text
//! Player / Engine         LogStream            UART drain
//! ───────────────         ─────────            ──────────
//!
//! rt_info!() ───────────▶ [L0][L1][L2] ──────▶ UART TX
//! non-blocking            lock-free            between ticks
//! no allocation           ring buffer          or before sleep
//! ```
//!
//! # Rules
//!
//! - The refill tick never calls a blocking log function
//! - Messages are dropped, not waited for, when the ring is full
//! - Every entry carries the tag of the component that wrote it

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 96;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 64;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Single-letter form used on the console (`I (123) tag: msg`).
    pub fn letter(self) -> char {
        match self {
            LogLevel::Error => 'E',
            LogLevel::Warn => 'W',
            LogLevel::Info => 'I',
            LogLevel::Debug => 'D',
            LogLevel::Trace => 'V',
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
pub struct LogEntry {
    /// Timestamp in microseconds.
    pub timestamp_us: i64,
    /// Log level.
    pub level: LogLevel,
    /// Component tag.
    pub tag: &'static str,
    /// Message length.
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    const EMPTY: LogEntry = LogEntry {
        timestamp_us: 0,
        level: LogLevel::Info,
        tag: "",
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message text; truncation may have split a UTF-8 sequence.
    pub fn message(&self) -> &str {
        let bytes = &self.msg[..self.len as usize];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl core::fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({}) {}: {}", self.level.letter(), self.timestamp_us / 1000, self.tag, self.message())
    }
}

/// Lock-free log stream (multiple producers, single consumer).
///
/// - Producers claim a slot with a compare-exchange on the write index
/// - A slot is published through its ready flag only after it is written
/// - Push never blocks (drops message if full)
/// - Drain runs when the application has time (between ticks, before sleep)
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    entries: UnsafeCell<[LogEntry; N]>,
    ready: [AtomicBool; N],
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: Multiple producers (coordinated via atomics), single consumer (UART drain).
unsafe impl<const N: usize> Sync for LogStream<N> {}
unsafe impl<const N: usize> Send for LogStream<N> {}

impl<const N: usize> LogStream<N> {
    const MASK: usize = N - 1;

    /// Create a new empty log stream.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Log buffer size must be power of 2");

        Self {
            entries: UnsafeCell::new([LogEntry::EMPTY; N]),
            ready: [const { AtomicBool::new(false) }; N],
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push a log entry (RT-safe, never blocks).
    ///
    /// Returns `true` if message was queued, `false` if dropped (ring full).
    #[inline]
    pub fn push(&self, timestamp_us: i64, level: LogLevel, tag: &'static str, msg: &[u8]) -> bool {
        let mut write = self.write_idx.load(Ordering::Acquire);
        loop {
            let read = self.read_idx.load(Ordering::Acquire);
            if write.wrapping_sub(read) >= N as u32 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self
                .write_idx
                .compare_exchange_weak(write, write.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) => write = current,
            }
        }

        let idx = (write as usize) & Self::MASK;

        // SAFETY: the compare-exchange gave this producer a unique slot, and
        // drain does not touch it until the ready flag is set below.
        unsafe {
            let entry = &mut (*self.entries.get())[idx];
            entry.timestamp_us = timestamp_us;
            entry.level = level;
            entry.tag = tag;
            entry.len = msg.len().min(MAX_MSG_LEN) as u8;
            entry.msg[..entry.len as usize].copy_from_slice(&msg[..entry.len as usize]);
        }
        self.ready[idx].store(true, Ordering::Release);

        true
    }

    /// Drain next log entry.
    ///
    /// Returns `None` if no entries available.
    #[inline]
    pub fn drain(&self) -> Option<LogEntry> {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        let idx = (read as usize) & Self::MASK;

        // Claimed but still being written
        if !self.ready[idx].load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: Single consumer, and the producer published this slot
        let entry = unsafe { (*self.entries.get())[idx] };
        self.ready[idx].store(false, Ordering::Relaxed);

        self.read_idx.store(read.wrapping_add(1), Ordering::Release);
        Some(entry)
    }

    /// Get count of dropped messages.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Get number of entries waiting to be drained.
    #[inline]
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message into a buffer.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// `fmt::Write` into a byte slice, truncating silently.
pub struct BufWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BufWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl core::fmt::Write for BufWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.pos;
        let to_write = bytes.len().min(remaining);
        self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
        self.pos += to_write;
        Ok(())
    }
}

/// Render an entry as a console line: `I (1234) ulpSound: message\r\n`.
///
/// The timestamp is printed in milliseconds. Returns the bytes written;
/// output longer than `buf` is truncated.
pub fn format_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    let mut writer = BufWriter::new(buf);
    let _ = core::fmt::write(&mut writer, format_args!("{:?}\r\n", entry));
    writer.pos
}

/// RT-safe log macro.
///
/// # Example
///
/// ```ignore
/// rt_log!(LogLevel::Info, log, now_us, TAG, "Delay time: {}", delay);
/// ```
#[macro_export]
macro_rules! rt_log {
    ($level:expr, $stream:expr, $timestamp:expr, $tag:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $stream.push($timestamp, $level, $tag, &buf[..len]);
    }};
}

/// RT-safe info log.
#[macro_export]
macro_rules! rt_info {
    ($stream:expr, $timestamp:expr, $tag:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Info, $stream, $timestamp, $tag, $($arg)*)
    };
}

/// RT-safe warning log.
#[macro_export]
macro_rules! rt_warn {
    ($stream:expr, $timestamp:expr, $tag:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Warn, $stream, $timestamp, $tag, $($arg)*)
    };
}

/// RT-safe error log.
#[macro_export]
macro_rules! rt_error {
    ($stream:expr, $timestamp:expr, $tag:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Error, $stream, $timestamp, $tag, $($arg)*)
    };
}

/// RT-safe debug log.
#[macro_export]
macro_rules! rt_debug {
    ($stream:expr, $timestamp:expr, $tag:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Debug, $stream, $timestamp, $tag, $($arg)*)
    };
}

/// RT-safe trace log (maximum verbosity).
#[macro_export]
macro_rules! rt_trace {
    ($stream:expr, $timestamp:expr, $tag:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Trace, $stream, $timestamp, $tag, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_stream_basic() {
        let stream = LogStream::<16>::new();

        assert!(stream.push(1000, LogLevel::Info, "ulp", b"test message"));
        assert_eq!(stream.pending(), 1);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.timestamp_us, 1000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.tag, "ulp");
        assert_eq!(entry.message(), "test message");

        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_log_stream_full() {
        let stream = LogStream::<4>::new();

        assert!(stream.push(1, LogLevel::Info, "t", b"1"));
        assert!(stream.push(2, LogLevel::Info, "t", b"2"));
        assert!(stream.push(3, LogLevel::Info, "t", b"3"));
        assert!(stream.push(4, LogLevel::Info, "t", b"4"));

        // Should drop
        assert!(!stream.push(5, LogLevel::Info, "t", b"5"));
        assert_eq!(stream.dropped(), 1);

        // Drain one, should be able to push again
        stream.drain();
        assert!(stream.push(6, LogLevel::Info, "t", b"6"));
    }

    #[test]
    fn test_drain_stops_at_unpublished_slot() {
        let stream = LogStream::<4>::new();

        // A producer has claimed slot 0 but not written it yet
        stream.write_idx.store(1, Ordering::Release);
        assert!(stream.push(7, LogLevel::Info, "t", b"second"));
        assert_eq!(stream.pending(), 2);
        assert!(stream.drain().is_none());

        stream.ready[0].store(true, Ordering::Release);
        assert_eq!(stream.drain().map(|e| e.timestamp_us), Some(0));
        assert_eq!(stream.drain().unwrap().message(), "second");
        assert!(stream.drain().is_none());
    }

    #[test]
    fn test_macro_formats_with_tag() {
        let stream = LogStream::<8>::new();
        rt_warn!(stream, 5, "player", "Filled {} words", 42);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.tag, "player");
        assert_eq!(entry.message(), "Filled 42 words");
    }

    #[test]
    fn test_message_truncated_on_char_boundary() {
        let mut entry = LogEntry::default();
        let text = "é".repeat(MAX_MSG_LEN);
        entry.len = MAX_MSG_LEN as u8;
        entry.msg.copy_from_slice(&text.as_bytes()[..MAX_MSG_LEN]);
        assert_eq!(entry.message().len(), MAX_MSG_LEN);

        let mut odd = LogEntry::default();
        odd.len = 3;
        odd.msg[..3].copy_from_slice(&"éé".as_bytes()[..3]);
        assert_eq!(odd.message(), "é");
    }

    #[test]
    fn test_format_entry_console_line() {
        let stream = LogStream::<4>::new();
        rt_info!(stream, 1_234_567, "ulpSound", "RTC freq: {}Hz", 8_500_000);
        let entry = stream.drain().unwrap();

        let mut buf = [0u8; 160];
        let len = format_entry(&entry, &mut buf);
        assert_eq!(&buf[..len], b"I (1234) ulpSound: RTC freq: 8500000Hz\r\n");

        let mut short = [0u8; 8];
        assert_eq!(format_entry(&entry, &mut short), 8);
        assert_eq!(&short, b"I (1234)");
    }

    #[test]
    fn test_format_to_buffer() {
        let mut buf = [0u8; 32];
        let len = format_to_buffer(&mut buf, format_args!("Hello {}", 42));
        assert_eq!(&buf[..len], b"Hello 42");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_multiple_producers() {
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<64>::new());
        let mut handles = vec![];

        for i in 0..4 {
            let stream = Arc::clone(&stream);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    let msg = format!("Thread {} msg {}", i, j);
                    stream.push(j as i64, LogLevel::Info, "test", msg.as_bytes());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while stream.drain().is_some() {
            count += 1;
        }
        assert_eq!(count, 40, "All messages should be present");
    }
}
