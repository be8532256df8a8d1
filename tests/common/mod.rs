//! Shared fixtures: a simulated board and a toy incremental codec.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use ulp_flac_player::decoder::{DecoderState, FrameDecoder, Progress};
use ulp_flac_player::layout::{RamRegion, SharedMemory};
use ulp_flac_player::logging::{LogLevel, LogStream};
use ulp_flac_player::platform::{Clock, Coprocessor, LowPowerSleep};
use ulp_flac_player::ulp::program::DacChannel;
use ulp_flac_player::ulp::sim::UlpSim;

/// Nominal RTC fast clock of the simulated chip.
pub const SIM_CLOCK_HZ: u32 = 8_500_000;

/// Microsecond clock shared between the board and the decoder.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<i64>>);

impl SimClock {
    pub fn advance(&self, us: i64) {
        self.0.set(self.0.get() + us);
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> i64 {
        self.0.get()
    }
}

/// RAM region plus ULP simulator behind the platform traits.
pub struct SimBoard {
    pub mem: RamRegion,
    pub sim: UlpSim,
    pub clock_hz: u32,
    /// Polls of `clock_ready` that report false before it turns true.
    pub clock_ready_after: u32,
    /// Freeze the ULP (models a wedged or never-started coprocessor).
    pub stalled: bool,
    /// Every DAC level written by the ULP, in order.
    pub output: Vec<u8>,
    pub output_channel: Option<DacChannel>,
    pub host_level: Option<u8>,
    pub output_enabled: bool,
    pub sleeps: u32,
    clock: SimClock,
    clock_polls: Cell<u32>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            mem: RamRegion::new(),
            sim: UlpSim::new(),
            clock_hz: SIM_CLOCK_HZ,
            clock_ready_after: 2,
            stalled: false,
            output: Vec::new(),
            output_channel: None,
            host_level: None,
            output_enabled: true,
            sleeps: 0,
            clock: SimClock::default(),
            clock_polls: Cell::new(0),
        }
    }

    pub fn clock(&self) -> SimClock {
        self.clock.clone()
    }

    /// Let `us` microseconds pass, running the ULP meanwhile.
    pub fn advance_us(&mut self, us: u32) {
        self.clock.advance(us as i64);
        if self.stalled || !self.sim.is_running() {
            return;
        }
        let budget = us as u64 * self.clock_hz as u64 / 1_000_000;
        let output = &mut self.output;
        let channel = &mut self.output_channel;
        self.sim
            .run_cycles(&mut self.mem, budget, |ch, level| {
                *channel = Some(ch);
                output.push(level);
            })
            .expect("ULP program faulted");
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMemory for SimBoard {
    fn read_word(&self, addr: usize) -> u32 {
        self.mem.read_word(addr)
    }

    fn write_word(&mut self, addr: usize, value: u32) {
        self.mem.write_word(addr, value)
    }

    fn len(&self) -> usize {
        self.mem.len()
    }
}

impl Coprocessor for SimBoard {
    fn enable_clock(&mut self) {
        self.clock_polls.set(0);
    }

    fn clock_ready(&self) -> bool {
        let polls = self.clock_polls.get();
        self.clock_polls.set(polls.saturating_add(1));
        polls >= self.clock_ready_after
    }

    fn measure_clock_hz(&mut self) -> u32 {
        self.clock_hz
    }

    fn disable_output(&mut self) {
        self.output_enabled = false;
    }

    fn set_output_level(&mut self, level: u8) {
        self.host_level = Some(level);
    }

    fn start(&mut self, entry: usize) {
        self.sim.start(entry as u16);
    }
}

impl LowPowerSleep for SimBoard {
    fn light_sleep_us(&mut self, us: u32) {
        self.sleeps += 1;
        self.advance_us(us);
    }
}

impl Clock for SimBoard {
    fn now_us(&self) -> i64 {
        self.clock.now_us()
    }
}

/// Drain a log stream into (level, message) pairs.
pub fn drain_messages(log: &LogStream) -> Vec<(LogLevel, String)> {
    std::iter::from_fn(|| log.drain())
        .map(|entry| (entry.level, entry.message().to_owned()))
        .collect()
}

// ---------------------------------------------------------------------------
// Toy codec
// ---------------------------------------------------------------------------

/// Stream magic of the toy format.
pub const TOY_MAGIC: &[u8; 4] = b"TOYC";
/// Header length: magic + little-endian u32 sample rate.
pub const TOY_HEADER_LEN: usize = 8;
/// Frame sync byte.
pub const TOY_SYNC: u8 = 0xFF;

/// Encode signed 8-bit PCM as a toy stream: header, then frames of
/// `[SYNC, n, n samples]`.
pub fn toy_encode(sample_rate: u32, samples: &[i8], frame_len: usize) -> Vec<u8> {
    assert!((1..=255).contains(&frame_len));
    let mut out = Vec::with_capacity(TOY_HEADER_LEN + samples.len() * 2);
    out.extend_from_slice(TOY_MAGIC);
    out.extend_from_slice(&sample_rate.to_le_bytes());
    for frame in samples.chunks(frame_len) {
        out.push(TOY_SYNC);
        out.push(frame.len() as u8);
        out.extend(frame.iter().map(|&s| s as u8));
    }
    out
}

/// DAC levels the player must produce for `samples`.
pub fn reference_levels(samples: &[i8]) -> Vec<u8> {
    samples.iter().map(|&s| (s as u8).wrapping_add(0x80)).collect()
}

/// Deterministic test signal: a sawtooth with a step every frame.
pub fn test_signal(len: usize) -> Vec<i8> {
    (0..len).map(|i| ((i * 7) % 251) as i8).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Header,
    Search,
    Length,
    Body,
    Emit,
    Broken,
}

/// Incremental decoder for the toy format, shaped like a real frame decoder:
/// it accepts any number of input bytes per call and emits at most
/// `output.len()` samples.
pub struct ToyCodec {
    phase: Phase,
    header: Vec<u8>,
    rate: u32,
    frame: Vec<i32>,
    want: usize,
    emitted: usize,
    pub resets: u32,
    pub calls: u64,
}

impl ToyCodec {
    pub fn new() -> Self {
        Self {
            phase: Phase::Header,
            header: Vec::new(),
            rate: 0,
            frame: Vec::new(),
            want: 0,
            emitted: 0,
            resets: 0,
            calls: 0,
        }
    }
}

impl Default for ToyCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for ToyCodec {
    fn reset(&mut self) {
        self.phase = Phase::Header;
        self.header.clear();
        self.rate = 0;
        self.frame.clear();
        self.want = 0;
        self.emitted = 0;
        self.resets += 1;
    }

    fn process(&mut self, input: &[u8], output: &mut [i32]) -> Progress {
        self.calls += 1;
        let mut consumed = 0;
        let mut produced = 0;

        loop {
            let next = input.get(consumed).copied();
            let done = move |state| Progress { consumed, produced, state };
            match self.phase {
                Phase::Header => {
                    let Some(byte) = next else {
                        let state = if self.header.is_empty() {
                            DecoderState::Init
                        } else {
                            DecoderState::InMetadata
                        };
                        return done(state);
                    };
                    consumed += 1;
                    self.header.push(byte);
                    if self.header.len() == TOY_HEADER_LEN {
                        if &self.header[..4] != TOY_MAGIC {
                            self.phase = Phase::Broken;
                            return Progress { consumed, produced, state: DecoderState::Error };
                        }
                        let mut rate = [0u8; 4];
                        rate.copy_from_slice(&self.header[4..]);
                        self.rate = u32::from_le_bytes(rate);
                        self.phase = Phase::Search;
                        return Progress { consumed, produced, state: DecoderState::EndOfMetadata };
                    }
                }
                Phase::Search => {
                    let Some(byte) = next else {
                        return done(DecoderState::SearchFrame);
                    };
                    consumed += 1;
                    if byte == TOY_SYNC {
                        self.phase = Phase::Length;
                    }
                }
                Phase::Length => {
                    let Some(byte) = next else {
                        return done(DecoderState::InFrame);
                    };
                    consumed += 1;
                    self.want = byte as usize;
                    self.frame.clear();
                    if self.want == 0 {
                        self.phase = Phase::Search;
                        return Progress { consumed, produced, state: DecoderState::EndOfFrame };
                    }
                    self.phase = Phase::Body;
                }
                Phase::Body => {
                    let Some(byte) = next else {
                        return done(DecoderState::InFrame);
                    };
                    consumed += 1;
                    self.frame.push((byte as i8 as i32) << 24);
                    if self.frame.len() == self.want {
                        self.emitted = 0;
                        self.phase = Phase::Emit;
                    }
                }
                Phase::Emit => {
                    if self.emitted == self.frame.len() {
                        self.phase = Phase::Search;
                        return Progress { consumed, produced, state: DecoderState::EndOfFrame };
                    }
                    if produced == output.len() {
                        return Progress { consumed, produced, state: DecoderState::DecodedFrame };
                    }
                    output[produced] = self.frame[self.emitted];
                    self.emitted += 1;
                    produced += 1;
                }
                Phase::Broken => return done(DecoderState::Error),
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }
}

/// Decoder that swallows nothing and never produces: a wedged codec.
pub struct StuckCodec {
    pub state: DecoderState,
    pub calls: u64,
}

impl FrameDecoder for StuckCodec {
    fn reset(&mut self) {}

    fn process(&mut self, _input: &[u8], _output: &mut [i32]) -> Progress {
        self.calls += 1;
        Progress {
            consumed: 0,
            produced: 0,
            state: self.state,
        }
    }

    fn sample_rate(&self) -> u32 {
        0
    }
}
