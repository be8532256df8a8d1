//! ULP-FSM coprocessor support: instruction encoding, the playback program
//! and a host-side simulator.

pub mod insn;
pub mod program;
pub mod sim;

pub use insn::{Insn, Reg};
pub use program::{DacChannel, PlaybackProgram};
pub use sim::UlpSim;
