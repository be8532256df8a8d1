//! Streaming decode driver.
//!
//! Pulls one 8-bit output sample at a time out of an incremental
//! [`FrameDecoder`], feeding it at most two input bytes per call so a refill
//! tick never stalls on a large frame. All faults are soft: the driver goes
//! idle and keeps returning the last sample it produced.

use crate::fault::{DecodeError, FaultCode};
use crate::logging::LogStream;
use crate::platform::Clock;
use crate::{rt_debug, rt_error, rt_info};

const TAG: &str = "flacPlayer";

/// Bytes offered to the decoder per call while playing.
pub const FEED_BYTES: usize = 2;

/// Level returned before the first sample is decoded.
pub const MID_LEVEL: u8 = 0x80;

/// Decoder state after a `process` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    Init,
    InMetadata,
    EndOfMetadata,
    SearchFrame,
    InFrame,
    DecodedFrame,
    EndOfFrame,
    Error,
}

/// Outcome of one [`FrameDecoder::process`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Input bytes taken.
    pub consumed: usize,
    /// Samples written to the output slice.
    pub produced: usize,
    pub state: DecoderState,
}

/// Incremental compressed-audio decoder.
///
/// Samples are signed 32-bit, left aligned (the top byte is the most
/// significant 8 bits of the PCM value), channels interleaved.
pub trait FrameDecoder {
    /// Forget all stream state; the next `process` starts at a stream header.
    fn reset(&mut self);

    /// Consume up to `input.len()` bytes and emit up to `output.len()` samples.
    fn process(&mut self, input: &[u8], output: &mut [i32]) -> Progress;

    /// Sample rate from the stream info block, 0 if unknown.
    fn sample_rate(&self) -> u32;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for &mut D {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn process(&mut self, input: &[u8], output: &mut [i32]) -> Progress {
        (**self).process(input, output)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/// Map a left-aligned signed sample to unsigned 8-bit DAC code.
#[inline]
pub const fn to_dac_level(sample: i32) -> u8 {
    ((sample >> 24) as u8).wrapping_add(0x80)
}

/// Per-session decoding context over a borrowed source image.
pub struct DecodeDriver<'a, D: FrameDecoder, C: Clock> {
    decoder: D,
    clock: C,
    log: &'a LogStream,
    source: &'a [u8],
    bytes_consumed: usize,
    first_frame_offset: usize,
    latest_sample: u8,
    idle: bool,
    fault: FaultCode,
    start_time_us: i64,
    stall_limit: u32,
    sessions: u32,
}

impl<'a, D: FrameDecoder, C: Clock> DecodeDriver<'a, D, C> {
    /// Idle driver with an empty source.
    pub fn new(decoder: D, clock: C, log: &'a LogStream, stall_limit: u32) -> Self {
        Self {
            decoder,
            clock,
            log,
            source: &[],
            bytes_consumed: 0,
            first_frame_offset: 0,
            latest_sample: MID_LEVEL,
            idle: true,
            fault: FaultCode::None,
            start_time_us: 0,
            stall_limit,
            sessions: 0,
        }
    }

    /// Start a session over `source`: counters reset, start time stamped.
    pub fn bind(&mut self, source: &'a [u8]) {
        self.source = source;
        self.bytes_consumed = 0;
        self.first_frame_offset = 0;
        self.latest_sample = MID_LEVEL;
        self.idle = false;
        self.fault = FaultCode::None;
        self.start_time_us = self.clock.now_us();
    }

    /// Feed the stream header until the decoder is positioned at the first
    /// audio frame. Returns the byte offset of that frame.
    ///
    /// Output produced during this phase is discarded. On error the driver is
    /// left idle.
    pub fn init_decoder(&mut self) -> Result<usize, DecodeError> {
        let now = self.clock.now_us();
        if self.sessions == 0 {
            rt_info!(self.log, now, TAG, "Creating new FLAC decoder");
        } else {
            rt_info!(self.log, now, TAG, "Resetting FLAC decoder");
        }
        self.decoder.reset();
        self.sessions = self.sessions.saturating_add(1);

        match self.run_to_first_frame() {
            Ok(offset) => {
                self.first_frame_offset = offset;
                let now = self.clock.now_us();
                rt_info!(self.log, now, TAG, "Initialized FLAC decoder");
                rt_info!(self.log, now, TAG, "First frame offset: {}", offset);
                Ok(offset)
            }
            Err(err) => {
                let now = self.clock.now_us();
                match err {
                    DecodeError::Malformed => rt_error!(self.log, now, TAG, "Bad FLAC file"),
                    DecodeError::UnexpectedState(_) => {
                        rt_error!(self.log, now, TAG, "FLAC decoder in error state!")
                    }
                    DecodeError::DecoderFault => {
                        rt_error!(self.log, now, TAG, "Failed to initialize FLAC decoder")
                    }
                }
                let (secs, millis) = self.playtime();
                rt_info!(self.log, now, TAG, "playtime {}.{:03} sec", secs, millis);
                self.stop(err.code());
                Err(err)
            }
        }
    }

    fn run_to_first_frame(&mut self) -> Result<usize, DecodeError> {
        let mut stalls = 0u32;
        loop {
            let progress = self.decoder.process(&self.source[self.bytes_consumed..], &mut []);
            self.bytes_consumed = (self.bytes_consumed + progress.consumed).min(self.source.len());
            let exhausted = self.bytes_consumed >= self.source.len();

            match progress.state {
                DecoderState::EndOfMetadata => return Ok(self.bytes_consumed),
                DecoderState::SearchFrame if exhausted => return Err(DecodeError::Malformed),
                DecoderState::Init | DecoderState::InMetadata | DecoderState::SearchFrame => {
                    if progress.consumed == 0 {
                        if exhausted {
                            return Err(DecodeError::Malformed);
                        }
                        stalls += 1;
                        if stalls >= self.stall_limit {
                            return Err(DecodeError::DecoderFault);
                        }
                    } else {
                        stalls = 0;
                    }
                }
                state @ (DecoderState::InFrame | DecoderState::DecodedFrame | DecoderState::EndOfFrame) => {
                    return Err(DecodeError::UnexpectedState(state));
                }
                DecoderState::Error => return Err(DecodeError::DecoderFault),
            }
        }
    }

    /// Next output sample.
    ///
    /// Once idle (end of stream, fault, or never started) this returns the
    /// last sample without touching the input.
    pub fn next_sample(&mut self) -> u8 {
        let mut out = [0i32; 1];
        let mut stalls = 0u32;

        while !self.idle {
            let end = (self.bytes_consumed + FEED_BYTES).min(self.source.len());
            let progress = self.decoder.process(&self.source[self.bytes_consumed..end], &mut out);
            self.bytes_consumed = (self.bytes_consumed + progress.consumed).min(self.source.len());

            match progress.state {
                DecoderState::InFrame | DecoderState::DecodedFrame | DecoderState::EndOfFrame => {}
                DecoderState::SearchFrame => {
                    if self.bytes_consumed >= self.source.len() {
                        let now = self.clock.now_us();
                        rt_debug!(
                            self.log,
                            now,
                            TAG,
                            "read {} of {} bytes",
                            self.bytes_consumed,
                            self.source.len()
                        );
                        rt_info!(self.log, now, TAG, "Reached end of file");
                        let (secs, millis) = self.playtime();
                        rt_info!(self.log, now, TAG, "playtime {}.{:03} sec", secs, millis);
                        self.stop(FaultCode::EndOfStream);
                    }
                }
                _ => {
                    rt_error!(self.log, self.clock.now_us(), TAG, "FLAC decoder in error state!");
                    self.stop(FaultCode::DecoderFault);
                }
            }

            if progress.produced > 0 {
                self.latest_sample = to_dac_level(out[0]);
                return self.latest_sample;
            }

            if progress.consumed == 0 && !self.idle {
                stalls += 1;
                if stalls >= self.stall_limit {
                    rt_error!(
                        self.log,
                        self.clock.now_us(),
                        TAG,
                        "FLAC decoder stuck at byte {}",
                        self.bytes_consumed
                    );
                    self.stop(FaultCode::DecoderFault);
                }
            } else {
                stalls = 0;
            }
        }
        self.latest_sample
    }

    /// Sample rate reported by the stream header, 0 (logged) if missing.
    pub fn sample_rate(&self) -> u32 {
        let rate = self.decoder.sample_rate();
        if rate == 0 {
            rt_error!(self.log, self.clock.now_us(), TAG, "Cannot retrieve sampling rate from FLAC decoder");
        }
        rate
    }

    /// Go idle, recording why. The first reason sticks.
    pub fn stop(&mut self, reason: FaultCode) {
        self.idle = true;
        if self.fault == FaultCode::None {
            self.fault = reason;
        }
    }

    /// Time since `bind` as (seconds, milliseconds).
    pub fn playtime(&self) -> (i64, i64) {
        let elapsed_ms = (self.clock.now_us() - self.start_time_us) / 1000;
        (elapsed_ms / 1000, elapsed_ms % 1000)
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Input bytes handed to the decoder so far; never exceeds the source.
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    pub fn first_frame_offset(&self) -> usize {
        self.first_frame_offset
    }

    pub fn latest_sample(&self) -> u8 {
        self.latest_sample
    }

    pub fn fault(&self) -> FaultCode {
        self.fault
    }

    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FixedClock(Cell<i64>);

    impl Clock for FixedClock {
        fn now_us(&self) -> i64 {
            self.0.get()
        }
    }

    /// Scripted decoder: a 4-byte header, then one sample per 2 input bytes.
    #[derive(Default)]
    struct Scripted {
        header_left: usize,
        pending: Option<i32>,
        resets: u32,
        fail_after_header: bool,
    }

    impl FrameDecoder for Scripted {
        fn reset(&mut self) {
            self.header_left = 4;
            self.pending = None;
            self.resets += 1;
        }

        fn process(&mut self, input: &[u8], output: &mut [i32]) -> Progress {
            if self.header_left > 0 {
                let take = input.len().min(self.header_left);
                self.header_left -= take;
                let state = if self.header_left == 0 {
                    DecoderState::EndOfMetadata
                } else {
                    DecoderState::InMetadata
                };
                return Progress { consumed: take, produced: 0, state };
            }
            if self.fail_after_header {
                return Progress { consumed: 0, produced: 0, state: DecoderState::Error };
            }
            if let (Some(sample), Some(slot)) = (self.pending, output.first_mut()) {
                *slot = sample;
                self.pending = None;
                return Progress { consumed: 0, produced: 1, state: DecoderState::DecodedFrame };
            }
            if input.len() < 2 {
                return Progress { consumed: input.len(), produced: 0, state: DecoderState::SearchFrame };
            }
            self.pending = Some((input[0] as i8 as i32) << 24);
            Progress { consumed: 2, produced: 0, state: DecoderState::InFrame }
        }

        fn sample_rate(&self) -> u32 {
            8_000
        }
    }

    #[test]
    fn test_dac_level_bias() {
        assert_eq!(to_dac_level(0), 0x80);
        assert_eq!(to_dac_level(i32::MIN), 0x00);
        assert_eq!(to_dac_level(i32::MAX), 0xFF);
        assert_eq!(to_dac_level(-1), 0x7F);
    }

    #[test]
    fn test_init_then_samples_then_end() {
        let log = LogStream::new();
        let clock = FixedClock(Cell::new(0));
        let mut driver = DecodeDriver::new(Scripted::default(), &clock, &log, 8);
        let data = [0u8, 0, 0, 0, 0x10, 0, 0xF0, 0];
        driver.bind(&data);

        assert_eq!(driver.init_decoder(), Ok(4));
        assert_eq!(driver.next_sample(), 0x90);
        assert_eq!(driver.next_sample(), 0x70);
        clock.0.set(2_500_000);
        assert_eq!(driver.next_sample(), 0x70);
        assert!(driver.is_idle());
        assert_eq!(driver.fault(), FaultCode::EndOfStream);
        assert_eq!(driver.playtime(), (2, 500));
    }

    #[test]
    fn test_idle_is_idempotent() {
        let log = LogStream::new();
        let clock = FixedClock(Cell::new(0));
        let mut driver = DecodeDriver::new(Scripted::default(), &clock, &log, 8);
        assert!(driver.is_idle());
        assert_eq!(driver.next_sample(), MID_LEVEL);
        assert_eq!(driver.bytes_consumed(), 0);
    }

    #[test]
    fn test_header_only_is_malformed() {
        let log = LogStream::new();
        let clock = FixedClock(Cell::new(0));
        let mut driver = DecodeDriver::new(Scripted::default(), &clock, &log, 8);
        let data = [0u8, 0];
        driver.bind(&data);

        assert_eq!(driver.init_decoder(), Err(DecodeError::Malformed));
        assert!(driver.is_idle());
        assert_eq!(driver.fault(), FaultCode::Malformed);
    }

    #[test]
    fn test_error_state_while_playing_goes_idle() {
        let log = LogStream::new();
        let clock = FixedClock(Cell::new(0));
        let scripted = Scripted { fail_after_header: true, ..Default::default() };
        let mut driver = DecodeDriver::new(scripted, &clock, &log, 8);
        let data = [0u8; 8];
        driver.bind(&data);

        assert_eq!(driver.init_decoder(), Ok(4));
        assert_eq!(driver.next_sample(), MID_LEVEL);
        assert_eq!(driver.fault(), FaultCode::DecoderFault);

        let mut saw_error = false;
        while let Some(entry) = log.drain() {
            saw_error |= entry.message() == "FLAC decoder in error state!";
        }
        assert!(saw_error);
    }

    #[test]
    fn test_second_session_resets_decoder() {
        let log = LogStream::new();
        let clock = FixedClock(Cell::new(0));
        let mut driver = DecodeDriver::new(Scripted::default(), &clock, &log, 8);
        let data = [0u8, 0, 0, 0, 0x10, 0];
        driver.bind(&data);
        driver.init_decoder().unwrap();
        driver.bind(&data);
        driver.init_decoder().unwrap();
        assert_eq!(driver.decoder().resets, 2);

        let messages: Vec<_> = core::iter::from_fn(|| log.drain()).map(|e| e.message().to_owned()).collect();
        assert!(messages.iter().any(|m| m == "Creating new FLAC decoder"));
        assert!(messages.iter().any(|m| m == "Resetting FLAC decoder"));
    }
}
