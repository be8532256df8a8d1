//! Fault taxonomy for the playback pipeline.
//!
//! # Philosophy
//!
//! > A glitchy speaker is better than a wedged CPU that never sleeps again.
//!
//! Nothing in the pipeline aborts. Every fault collapses into the player's
//! `idle` flag plus a log line, and is handed back to the caller as a value
//! so the application decides what to do (normally: go back to deep sleep).

use thiserror::Error;

use crate::decoder::DecoderState;

/// Why the player stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultCode {
    /// Still playing, or never started.
    #[default]
    None = 0,

    /// Input exhausted cleanly at a frame boundary.
    EndOfStream = 1,

    /// No frame boundary before the input ran out.
    Malformed = 2,

    /// Decoder entered an unexpected or error state.
    DecoderFault = 3,

    /// The ring stayed full for too many ticks: ULP stalled or decode too slow.
    Backpressure = 4,

    /// No output engine linked.
    NotLinked = 5,

    /// Output engine could not start the ULP.
    EngineFault = 6,
}

impl FaultCode {
    /// True for reasons other than a clean end of stream.
    pub fn is_failure(self) -> bool {
        !matches!(self, FaultCode::None | FaultCode::EndOfStream)
    }
}

/// Errors from bringing up the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input exhausted before the first frame boundary.
    #[error("no frame boundary before end of input")]
    Malformed,
    /// Decoder reached audio frames before finishing metadata.
    #[error("decoder reached {0:?} before end of metadata")]
    UnexpectedState(DecoderState),
    /// Decoder reported an internal error.
    #[error("decoder reported an error")]
    DecoderFault,
}

impl DecodeError {
    /// Fault code recorded by the player.
    pub fn code(self) -> FaultCode {
        match self {
            DecodeError::Malformed => FaultCode::Malformed,
            DecodeError::UnexpectedState(_) | DecodeError::DecoderFault => FaultCode::DecoderFault,
        }
    }
}

/// Errors from assembling the ULP program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SynthError {
    /// Program does not fit the reserved region.
    #[error("ULP program needs {len} words, region holds {capacity}")]
    ProgramOverflow { len: usize, capacity: usize },
    /// Relative branch target beyond the 7 bit offset field.
    #[error("branch offset {offset} out of range")]
    BranchOutOfRange { offset: i32 },
    /// Delay does not fit the 16 bit wait field.
    #[error("delay of {cycles} cycles does not fit a wait instruction")]
    DelayOverflow { cycles: u32 },
}

/// Errors from the output engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// RTC 8 MHz clock never reported stable.
    #[error("RTC clock not stable after {polls} polls")]
    ClockTimeout { polls: u32 },
    /// ULP never published a read position.
    #[error("ULP did not start after {polls} polls")]
    StartTimeout { polls: u32 },
    /// Program synthesis failed.
    #[error(transparent)]
    Synth(#[from] SynthError),
}

/// Errors surfaced by the player control surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// `play`/`refill_tick` without an output engine.
    #[error("no output engine linked")]
    NotLinked,
    /// Decoder bring-up failed; the player is idle.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Output engine bring-up failed; the player is idle.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Circuit breaker tripped; the player is idle.
    #[error("ring full for {glitches} ticks, playback abandoned")]
    Backpressure { glitches: u32 },
}

impl PlayerError {
    /// Fault code recorded by the player.
    pub fn code(self) -> FaultCode {
        match self {
            PlayerError::NotLinked => FaultCode::NotLinked,
            PlayerError::Decode(err) => err.code(),
            PlayerError::Engine(_) => FaultCode::EngineFault,
            PlayerError::Backpressure { .. } => FaultCode::Backpressure,
        }
    }
}
