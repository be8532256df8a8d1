//! Instruction-level simulator for the ULP-FSM subset in [`insn`](super::insn).
//!
//! Runs the synthesized program against any [`SharedMemory`] so the whole
//! handshake can be exercised on the host. Timing uses the nominal cycle
//! counts of [`Insn::cycles`]; it is good enough to order events, not to
//! predict the silicon sample rate.

use thiserror::Error;

use crate::layout::SharedMemory;
use crate::ulp::insn::{AluOp, BranchCmp, Insn};
use crate::ulp::program::DacChannel;

/// Result of one simulated instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Instruction retired.
    Executed {
        cycles: u32,
        /// DAC level written by a `reg_wr` to a DAC pad register.
        output: Option<(DacChannel, u8)>,
    },
    /// The core is halted.
    Halted,
}

/// Execution faults; on silicon these would just wedge the ULP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SimFault {
    #[error("undecodable word 0x{word:08X} at {pc}")]
    IllegalInstruction { pc: u16, word: u32 },
    #[error("access to word {addr} outside the region")]
    OutOfRange { addr: usize },
}

/// Simulated ULP core state.
#[derive(Clone, Debug, Default)]
pub struct UlpSim {
    regs: [u16; 4],
    pc: u16,
    running: bool,
    cycles: u64,
    retired: u64,
}

impl UlpSim {
    pub const fn new() -> Self {
        Self {
            regs: [0; 4],
            pc: 0,
            running: false,
            cycles: 0,
            retired: 0,
        }
    }

    /// Begin execution at word `entry`.
    pub fn start(&mut self, entry: u16) {
        self.pc = entry;
        self.running = true;
    }

    /// Stop without executing a `halt`.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn regs(&self) -> [u16; 4] {
        self.regs
    }

    /// Cycles consumed since creation.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Instructions retired since creation.
    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// Execute one instruction.
    pub fn step<M: SharedMemory + ?Sized>(&mut self, mem: &mut M) -> Result<Step, SimFault> {
        if !self.running {
            return Ok(Step::Halted);
        }

        let word = read(mem, self.pc as usize)?;
        let insn = Insn::decode(word).ok_or(SimFault::IllegalInstruction { pc: self.pc, word })?;
        let mut next = self.pc.wrapping_add(1);
        let mut output = None;

        match insn {
            Insn::AluImm { op, dst, src, imm } => {
                self.regs[dst.index()] = alu(op, self.regs[src.index()], imm);
            }
            Insn::AluReg { op, dst, src, src2 } => {
                self.regs[dst.index()] = alu(op, self.regs[src.index()], self.regs[src2.index()]);
            }
            Insn::Ld { dst, base, offset } => {
                let addr = self.regs[base.index()] as usize + offset as usize;
                self.regs[dst.index()] = (read(mem, addr)? & 0xFFFF) as u16;
            }
            Insn::St { src, base, offset } => {
                let addr = self.regs[base.index()] as usize + offset as usize;
                if addr >= mem.len() {
                    return Err(SimFault::OutOfRange { addr });
                }
                // Upper half-word carries the PC of the store
                mem.write_word(addr, ((self.pc as u32) << 21) | self.regs[src.index()] as u32);
            }
            Insn::Delay { .. } => {}
            Insn::JumpImm { addr } => next = addr,
            Insn::JumpReg { reg } => next = self.regs[reg.index()] & 0x7FF,
            Insn::Branch { cmp, offset, imm } => {
                let taken = match cmp {
                    BranchCmp::Lt => self.regs[0] < imm,
                    BranchCmp::Ge => self.regs[0] >= imm,
                };
                if taken {
                    next = (self.pc as i32 + offset as i32) as u16;
                }
            }
            Insn::WrReg { addr, low, high, data } => {
                output = [DacChannel::Dac1, DacChannel::Dac2]
                    .into_iter()
                    .find(|ch| {
                        ch.pad_reg_word() == addr
                            && low == DacChannel::DAC_LOW_BIT
                            && high == DacChannel::DAC_HIGH_BIT
                    })
                    .map(|ch| (ch, data));
            }
            Insn::Halt => {
                self.running = false;
            }
        }

        self.pc = next;
        let cycles = insn.cycles();
        self.cycles += cycles as u64;
        self.retired += 1;
        Ok(Step::Executed { cycles, output })
    }

    /// Run for at least `budget` cycles (or until halted).
    ///
    /// `on_output` sees every DAC write. Returns the cycles actually consumed.
    pub fn run_cycles<M, F>(&mut self, mem: &mut M, budget: u64, mut on_output: F) -> Result<u64, SimFault>
    where
        M: SharedMemory + ?Sized,
        F: FnMut(DacChannel, u8),
    {
        let mut used = 0u64;
        while used < budget {
            match self.step(mem)? {
                Step::Executed { cycles, output } => {
                    used += cycles as u64;
                    if let Some((channel, level)) = output {
                        on_output(channel, level);
                    }
                }
                Step::Halted => break,
            }
        }
        Ok(used)
    }
}

fn read<M: SharedMemory + ?Sized>(mem: &M, addr: usize) -> Result<u32, SimFault> {
    if addr >= mem.len() {
        return Err(SimFault::OutOfRange { addr });
    }
    Ok(mem.read_word(addr))
}

fn alu(op: AluOp, a: u16, b: u16) -> u16 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Move => b,
        AluOp::Lsh => a.checked_shl(b as u32).unwrap_or(0),
        AluOp::Rsh => a.checked_shr(b as u32).unwrap_or(0),
    }
}
