//! Playback program and DAC opcode table for the ULP.
//!
//! The loop reads one 8 bit sample per iteration and jumps into a table of
//! 256 `reg_wr` instructions, one per DAC level, each followed by a jump
//! back into the loop. Building the write instruction at runtime would cost
//! a data-dependent number of cycles; the table keeps every iteration
//! identical so the sample period is exactly `LOOP_CYCLES + delay`.
//!
//! ```text
//!         move r3, 0
//! reset:  wait D
//!         move r0, 0
//! publish:st   r0, r3, READ_CURSOR      ; host sees our position
//!         rsh  r2, r0, 1                ; slot = index / 2
//!         ld   r1, r2, RING_START
//!         and  r2, r0, 1
//!         lsh  r2, r2, 3                ; 0 or 8
//!         rsh  r1, r1, r2
//!         and  r1, r1, 0xff             ; sample
//!         lsh  r1, r1, 1
//!         add  r1, r1, TABLE_START
//!         jump r1                       ; reg_wr DAC, sample ; jump resume
//! resume: add  r0, r0, 1
//!         jumpr reset, 2*RING_LEN, ge
//!         wait D + 2                    ; matches the reset path
//!         jump publish
//! ```

use crate::fault::SynthError;
use crate::layout::{SharedMemory, PROG_LEN, PROG_START, READ_CURSOR_ADDR, RING_LEN, RING_START, TABLE_LEN, TABLE_START};
use crate::ulp::insn::{self, Insn, Reg, MAX_BRANCH_OFFSET};

/// Extra wait on the fall-through path so both paths take the same time.
pub const WRAP_COMPENSATION: u16 = 2;

/// Largest per-sample delay the program can encode.
pub const MAX_DELAY: u16 = u16::MAX - WRAP_COMPENSATION;

/// DAC channel driven by the opcode table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DacChannel {
    /// DAC1 on GPIO25.
    #[default]
    Dac1,
    /// DAC2 on GPIO26.
    Dac2,
}

impl DacChannel {
    /// RTCIO_PAD_DACn_REG as a word offset from the RTC peripheral base.
    pub const fn pad_reg_word(self) -> u16 {
        match self {
            DacChannel::Dac1 => (0x400 + 0x84) / 4,
            DacChannel::Dac2 => (0x400 + 0x88) / 4,
        }
    }

    /// Low bit of the PDACn_DAC field.
    pub const DAC_LOW_BIT: u8 = 19;
    /// High bit of the PDACn_DAC field.
    pub const DAC_HIGH_BIT: u8 = 26;

    /// `reg_wr` setting this channel to `level`.
    pub const fn write_level(self, level: u8) -> Insn {
        insn::wr_reg(self.pad_reg_word(), Self::DAC_LOW_BIT, Self::DAC_HIGH_BIT, level)
    }
}

/// Position in a program under construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(u16);

impl Label {
    /// Absolute word address.
    pub fn addr(self) -> u16 {
        self.0
    }
}

/// Appends instructions into a fixed program region.
///
/// Instructions past the capacity are counted, not stored, so `finish`
/// can report how large the program would have been.
pub struct ProgramBuilder {
    words: [u32; PROG_LEN],
    len: usize,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            words: [insn::halt().encode(); PROG_LEN],
            len: 0,
        }
    }

    /// Label for the next instruction.
    pub fn here(&self) -> Label {
        Label((PROG_START + self.len) as u16)
    }

    pub fn push(&mut self, insn: Insn) {
        if self.len < PROG_LEN {
            self.words[self.len] = insn.encode();
        }
        self.len += 1;
    }

    /// `jumpr target, imm, ge` relative to the current position.
    pub fn branch_ge(&mut self, target: Label, imm: u16) -> Result<(), SynthError> {
        let offset = target.0 as i32 - self.here().0 as i32;
        if offset.abs() > MAX_BRANCH_OFFSET as i32 {
            return Err(SynthError::BranchOutOfRange { offset });
        }
        self.push(insn::bge(offset as i16, imm));
        Ok(())
    }

    /// `jump target`
    pub fn jump(&mut self, target: Label) {
        self.push(insn::bxi(target.0));
    }

    pub fn finish(self) -> Result<[u32; PROG_LEN], SynthError> {
        if self.len > PROG_LEN {
            return Err(SynthError::ProgramOverflow {
                len: self.len,
                capacity: PROG_LEN,
            });
        }
        Ok(self.words)
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembled playback loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackProgram {
    words: [u32; PROG_LEN],
    /// Where the DAC table jumps back to.
    pub resume: Label,
    /// Top of the per-sample loop.
    pub publish: Label,
    /// Per-sample delay in cycles.
    pub delay: u16,
}

impl PlaybackProgram {
    /// Assemble the loop with `delay` extra cycles per sample.
    pub fn build(delay: u16) -> Result<Self, SynthError> {
        let tail_delay = delay
            .checked_add(WRAP_COMPENSATION)
            .ok_or(SynthError::DelayOverflow {
                cycles: delay as u32 + WRAP_COMPENSATION as u32,
            })?;

        let mut b = ProgramBuilder::new();
        b.push(insn::movi(Reg::R3, 0));
        let reset = b.here();
        b.push(insn::delay(delay));
        b.push(insn::movi(Reg::R0, 0));
        let publish = b.here();
        b.push(insn::st(Reg::R0, Reg::R3, READ_CURSOR_ADDR as u16));
        b.push(insn::rshi(Reg::R2, Reg::R0, 1));
        b.push(insn::ld(Reg::R1, Reg::R2, RING_START as u16));
        b.push(insn::andi(Reg::R2, Reg::R0, 1));
        b.push(insn::lshi(Reg::R2, Reg::R2, 3));
        b.push(insn::rshr(Reg::R1, Reg::R1, Reg::R2));
        b.push(insn::andi(Reg::R1, Reg::R1, 0xFF));
        b.push(insn::lshi(Reg::R1, Reg::R1, 1));
        b.push(insn::addi(Reg::R1, Reg::R1, TABLE_START as u16));
        b.push(insn::bxr(Reg::R1));
        let resume = b.here();
        b.push(insn::addi(Reg::R0, Reg::R0, 1));
        b.branch_ge(reset, (RING_LEN * 2) as u16)?;
        b.push(insn::delay(tail_delay));
        b.jump(publish);

        Ok(Self {
            words: b.finish()?,
            resume,
            publish,
            delay,
        })
    }

    /// Encoded instruction words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Write the program into the region.
    pub fn load<M: SharedMemory + ?Sized>(&self, mem: &mut M) {
        for (i, word) in self.words.iter().enumerate() {
            mem.write_word(PROG_START + i, *word);
        }
    }
}

/// Encoded table entry pair for `level`: DAC write, then return jump.
pub const fn table_entry(channel: DacChannel, level: u8, resume: Label) -> (u32, u32) {
    (channel.write_level(level).encode(), insn::bxi(resume.0).encode())
}

/// Write all 256 table entries into the region.
pub fn load_output_table<M: SharedMemory + ?Sized>(mem: &mut M, channel: DacChannel, resume: Label) {
    for level in 0..=u8::MAX {
        let (write, ret) = table_entry(channel, level, resume);
        let addr = TABLE_START + level as usize * 2;
        mem.write_word(addr, write);
        mem.write_word(addr + 1, ret);
    }
    debug_assert_eq!(256 * 2, TABLE_LEN);
}

/// Fill the program region with `halt` so a stale loop cannot run.
pub fn clear_program<M: SharedMemory + ?Sized>(mem: &mut M) {
    let halt = insn::halt().encode();
    for addr in PROG_START..PROG_START + PROG_LEN {
        mem.write_word(addr, halt);
    }
}
