//! ESP32 ULP-FSM instruction encoding.
//!
//! Covers the subset the playback loop and the DAC table use. Field layout
//! follows the `ulp_insn_t` bitfields of ESP-IDF (least significant first).
//!
//! ```text
//! ALU reg   dreg[1:0] sreg[3:2] treg[5:4]            sel[24:21] sub=0 op=7
//! ALU imm   dreg[1:0] sreg[3:2] imm[19:4]            sel[24:21] sub=1 op=7
//! ST        sreg[1:0] dreg[3:2] offset[20:10]                   sub=4 op=6
//! LD        dreg[1:0] sreg[3:2] offset[20:10]                         op=13
//! WAIT      cycles[15:0]                                          op=4
//! JUMP      dreg[1:0] addr[12:2] reg[21] type[24:22]            sub=0 op=8
//! JUMPR     imm[15:0] cmp[16] offset[23:17] sign[24]            sub=1 op=8
//! REG_WR    addr[9:0] data[17:10] low[22:18] high[27:23]          op=1
//! HALT                                                            op=11
//! ```

use core::fmt;

const OP_WR_REG: u32 = 1;
const OP_DELAY: u32 = 4;
const OP_ST: u32 = 6;
const OP_ALU: u32 = 7;
const OP_BRANCH: u32 = 8;
const OP_HALT: u32 = 11;
const OP_LD: u32 = 13;

const SUB_ST: u32 = 4;
const SUB_ALU_REG: u32 = 0;
const SUB_ALU_IMM: u32 = 1;
const SUB_BX: u32 = 0;
const SUB_B: u32 = 1;

const BX_TYPE_DIRECT: u32 = 0;

/// Largest magnitude of a relative branch (7 bit field).
pub const MAX_BRANCH_OFFSET: i16 = 0x7F;
/// Largest absolute jump target (11 bit field).
pub const MAX_JUMP_ADDR: u16 = 0x7FF;
/// Largest ld/st offset (11 bit field).
pub const MAX_MEM_OFFSET: u16 = 0x7FF;

/// ULP general purpose register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
}

impl Reg {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Reg::R0,
            1 => Reg::R1,
            2 => Reg::R2,
            _ => Reg::R3,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", *self as u8)
    }
}

/// ALU operation selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Sub = 1,
    And = 2,
    Or = 3,
    Move = 4,
    Lsh = 5,
    Rsh = 6,
}

impl AluOp {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(AluOp::Add),
            1 => Some(AluOp::Sub),
            2 => Some(AluOp::And),
            3 => Some(AluOp::Or),
            4 => Some(AluOp::Move),
            5 => Some(AluOp::Lsh),
            6 => Some(AluOp::Rsh),
            _ => None,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Move => "move",
            AluOp::Lsh => "lsh",
            AluOp::Rsh => "rsh",
        }
    }
}

/// Condition of a relative branch on R0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BranchCmp {
    /// Taken if R0 < imm.
    Lt = 0,
    /// Taken if R0 >= imm.
    Ge = 1,
}

/// A decoded ULP-FSM instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insn {
    /// `dst = src <op> imm` (`move` ignores `src`).
    AluImm { op: AluOp, dst: Reg, src: Reg, imm: u16 },
    /// `dst = src <op> src2`.
    AluReg { op: AluOp, dst: Reg, src: Reg, src2: Reg },
    /// `dst = mem[base + offset]` (low 16 bits).
    Ld { dst: Reg, base: Reg, offset: u16 },
    /// `mem[base + offset] = src` (upper half-word receives the PC).
    St { src: Reg, base: Reg, offset: u16 },
    /// Busy wait for `cycles`.
    Delay { cycles: u16 },
    /// Jump to an absolute word address.
    JumpImm { addr: u16 },
    /// Jump to the word address held in a register.
    JumpReg { reg: Reg },
    /// Relative branch comparing R0 against `imm`.
    Branch { cmp: BranchCmp, offset: i16, imm: u16 },
    /// Write `data` into bits `low..=high` of peripheral register word `addr`.
    WrReg { addr: u16, low: u8, high: u8, data: u8 },
    /// Stop the coprocessor.
    Halt,
}

/// `move dst, imm`
pub const fn movi(dst: Reg, imm: u16) -> Insn {
    Insn::AluImm { op: AluOp::Move, dst, src: Reg::R0, imm }
}

/// `add dst, src, imm`
pub const fn addi(dst: Reg, src: Reg, imm: u16) -> Insn {
    Insn::AluImm { op: AluOp::Add, dst, src, imm }
}

/// `and dst, src, imm`
pub const fn andi(dst: Reg, src: Reg, imm: u16) -> Insn {
    Insn::AluImm { op: AluOp::And, dst, src, imm }
}

/// `lsh dst, src, imm`
pub const fn lshi(dst: Reg, src: Reg, imm: u16) -> Insn {
    Insn::AluImm { op: AluOp::Lsh, dst, src, imm }
}

/// `rsh dst, src, imm`
pub const fn rshi(dst: Reg, src: Reg, imm: u16) -> Insn {
    Insn::AluImm { op: AluOp::Rsh, dst, src, imm }
}

/// `rsh dst, src, src2`
pub const fn rshr(dst: Reg, src: Reg, src2: Reg) -> Insn {
    Insn::AluReg { op: AluOp::Rsh, dst, src, src2 }
}

/// `ld dst, base, offset`
pub const fn ld(dst: Reg, base: Reg, offset: u16) -> Insn {
    Insn::Ld { dst, base, offset }
}

/// `st src, base, offset`
pub const fn st(src: Reg, base: Reg, offset: u16) -> Insn {
    Insn::St { src, base, offset }
}

/// `wait cycles`
pub const fn delay(cycles: u16) -> Insn {
    Insn::Delay { cycles }
}

/// `jump addr`
pub const fn bxi(addr: u16) -> Insn {
    Insn::JumpImm { addr }
}

/// `jump reg`
pub const fn bxr(reg: Reg) -> Insn {
    Insn::JumpReg { reg }
}

/// `jumpr offset, imm, ge`
pub const fn bge(offset: i16, imm: u16) -> Insn {
    Insn::Branch { cmp: BranchCmp::Ge, offset, imm }
}

/// `jumpr offset, imm, lt`
pub const fn bl(offset: i16, imm: u16) -> Insn {
    Insn::Branch { cmp: BranchCmp::Lt, offset, imm }
}

/// `reg_wr addr, high, low, data`
pub const fn wr_reg(addr: u16, low: u8, high: u8, data: u8) -> Insn {
    Insn::WrReg { addr, low, high, data }
}

/// `halt`
pub const fn halt() -> Insn {
    Insn::Halt
}

impl Insn {
    /// Encode into a 32 bit instruction word.
    ///
    /// Fields wider than their slot are truncated, the program builder
    /// checks ranges before it gets here.
    pub const fn encode(self) -> u32 {
        match self {
            Insn::AluImm { op, dst, src, imm } => {
                (OP_ALU << 28)
                    | (SUB_ALU_IMM << 25)
                    | ((op as u32) << 21)
                    | ((imm as u32) << 4)
                    | ((src as u32) << 2)
                    | dst as u32
            }
            Insn::AluReg { op, dst, src, src2 } => {
                (OP_ALU << 28)
                    | (SUB_ALU_REG << 25)
                    | ((op as u32) << 21)
                    | ((src2 as u32) << 4)
                    | ((src as u32) << 2)
                    | dst as u32
            }
            Insn::Ld { dst, base, offset } => {
                (OP_LD << 28) | (((offset & MAX_MEM_OFFSET) as u32) << 10) | ((base as u32) << 2) | dst as u32
            }
            Insn::St { src, base, offset } => {
                (OP_ST << 28)
                    | (SUB_ST << 25)
                    | (((offset & MAX_MEM_OFFSET) as u32) << 10)
                    | ((base as u32) << 2)
                    | src as u32
            }
            Insn::Delay { cycles } => (OP_DELAY << 28) | cycles as u32,
            Insn::JumpImm { addr } => {
                (OP_BRANCH << 28) | (SUB_BX << 25) | (BX_TYPE_DIRECT << 22) | (((addr & MAX_JUMP_ADDR) as u32) << 2)
            }
            Insn::JumpReg { reg } => {
                (OP_BRANCH << 28) | (SUB_BX << 25) | (BX_TYPE_DIRECT << 22) | (1 << 21) | reg as u32
            }
            Insn::Branch { cmp, offset, imm } => {
                let sign = if offset < 0 { 1 } else { 0 };
                let magnitude = (offset.unsigned_abs() as u32) & 0x7F;
                (OP_BRANCH << 28)
                    | (SUB_B << 25)
                    | (sign << 24)
                    | (magnitude << 17)
                    | ((cmp as u32) << 16)
                    | imm as u32
            }
            Insn::WrReg { addr, low, high, data } => {
                (OP_WR_REG << 28)
                    | (((high & 0x1F) as u32) << 23)
                    | (((low & 0x1F) as u32) << 18)
                    | ((data as u32) << 10)
                    | (addr & 0x3FF) as u32
            }
            Insn::Halt => OP_HALT << 28,
        }
    }

    /// Decode an instruction word, `None` for anything outside the subset.
    pub fn decode(word: u32) -> Option<Insn> {
        let op = word >> 28;
        let sub = (word >> 25) & 0x7;
        match op {
            OP_ALU => {
                let alu = AluOp::from_bits((word >> 21) & 0xF)?;
                let dst = Reg::from_bits(word);
                let src = Reg::from_bits(word >> 2);
                match sub {
                    SUB_ALU_IMM => Some(Insn::AluImm {
                        op: alu,
                        dst,
                        src,
                        imm: ((word >> 4) & 0xFFFF) as u16,
                    }),
                    SUB_ALU_REG => Some(Insn::AluReg {
                        op: alu,
                        dst,
                        src,
                        src2: Reg::from_bits(word >> 4),
                    }),
                    _ => None,
                }
            }
            OP_LD => Some(Insn::Ld {
                dst: Reg::from_bits(word),
                base: Reg::from_bits(word >> 2),
                offset: ((word >> 10) & 0x7FF) as u16,
            }),
            OP_ST if sub == SUB_ST => Some(Insn::St {
                src: Reg::from_bits(word),
                base: Reg::from_bits(word >> 2),
                offset: ((word >> 10) & 0x7FF) as u16,
            }),
            OP_DELAY => Some(Insn::Delay {
                cycles: (word & 0xFFFF) as u16,
            }),
            OP_BRANCH if sub == SUB_BX => {
                if (word >> 22) & 0x7 != BX_TYPE_DIRECT {
                    return None;
                }
                if (word >> 21) & 1 == 1 {
                    Some(Insn::JumpReg {
                        reg: Reg::from_bits(word),
                    })
                } else {
                    Some(Insn::JumpImm {
                        addr: ((word >> 2) & 0x7FF) as u16,
                    })
                }
            }
            OP_BRANCH if sub == SUB_B => {
                let magnitude = ((word >> 17) & 0x7F) as i16;
                let offset = if (word >> 24) & 1 == 1 { -magnitude } else { magnitude };
                let cmp = if (word >> 16) & 1 == 1 { BranchCmp::Ge } else { BranchCmp::Lt };
                Some(Insn::Branch {
                    cmp,
                    offset,
                    imm: (word & 0xFFFF) as u16,
                })
            }
            OP_WR_REG => Some(Insn::WrReg {
                addr: (word & 0x3FF) as u16,
                data: ((word >> 10) & 0xFF) as u8,
                low: ((word >> 18) & 0x1F) as u8,
                high: ((word >> 23) & 0x1F) as u8,
            }),
            OP_HALT => Some(Insn::Halt),
            _ => None,
        }
    }

    /// Nominal RTC_FAST_CLK cycles, fetch included.
    pub const fn cycles(self) -> u32 {
        match self {
            Insn::AluImm { .. } | Insn::AluReg { .. } => 6,
            Insn::Ld { .. } | Insn::St { .. } => 8,
            Insn::Delay { cycles } => 6 + cycles as u32,
            Insn::JumpImm { .. } | Insn::JumpReg { .. } | Insn::Branch { .. } => 4,
            Insn::WrReg { .. } => 12,
            Insn::Halt => 2,
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Insn::AluImm { op: AluOp::Move, dst, imm, .. } => write!(f, "move {}, {}", dst, imm),
            Insn::AluImm { op, dst, src, imm } => write!(f, "{} {}, {}, {}", op.mnemonic(), dst, src, imm),
            Insn::AluReg { op: AluOp::Move, dst, src, .. } => write!(f, "move {}, {}", dst, src),
            Insn::AluReg { op, dst, src, src2 } => write!(f, "{} {}, {}, {}", op.mnemonic(), dst, src, src2),
            Insn::Ld { dst, base, offset } => write!(f, "ld {}, {}, {}", dst, base, offset),
            Insn::St { src, base, offset } => write!(f, "st {}, {}, {}", src, base, offset),
            Insn::Delay { cycles } => write!(f, "wait {}", cycles),
            Insn::JumpImm { addr } => write!(f, "jump {}", addr),
            Insn::JumpReg { reg } => write!(f, "jump {}", reg),
            Insn::Branch { cmp, offset, imm } => {
                let cond = match cmp {
                    BranchCmp::Lt => "lt",
                    BranchCmp::Ge => "ge",
                };
                write!(f, "jumpr {:+}, {}, {}", offset, imm, cond)
            }
            Insn::WrReg { addr, low, high, data } => {
                write!(f, "reg_wr 0x{:03x}, {}, {}, {}", addr, high, low, data)
            }
            Insn::Halt => write!(f, "halt"),
        }
    }
}
