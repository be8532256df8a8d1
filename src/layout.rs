//! RTC slow memory map shared with the ULP coprocessor.
//!
//! ```text
//! word       use
//! 0..=16     ULP program
//! 17         read cursor (16 bits, counts samples up to 2*RING_LEN)
//! 18..=1531  sample ring (16 bits per slot, two 8 bit samples)
//! 1532..2043 DAC opcode table (write + return, 256 entries)
//! 2044..2047 reserved for ESP-IDF, never touched
//! ```
//!
//! # Rules
//!
//! - The host writes the ring, the ULP writes the read cursor. Nothing else.
//! - The region is the only channel between the two cores: no flags, no IRQs.

/// First word of the ULP program.
pub const PROG_START: usize = 0;
/// Last word of the ULP program (inclusive).
pub const PROG_STOP: usize = 16;
/// Program capacity in words.
pub const PROG_LEN: usize = PROG_STOP - PROG_START + 1;

/// Word holding the ULP sample index.
pub const READ_CURSOR_ADDR: usize = 17;

/// First ring slot.
pub const RING_START: usize = 18;
/// Last ring slot (inclusive).
pub const RING_STOP: usize = 1531;
/// Ring length in dual-sample slots.
pub const RING_LEN: usize = RING_STOP - RING_START + 1;

/// First word of the DAC opcode table.
pub const TABLE_START: usize = 1532;
/// Last word of the DAC opcode table (inclusive).
pub const TABLE_STOP: usize = 2043;
/// Table length in words (two per output level).
pub const TABLE_LEN: usize = TABLE_STOP - TABLE_START + 1;

/// First reserved word.
pub const RESERVED_START: usize = 2044;
/// Total size of RTC slow memory in words.
pub const REGION_WORDS: usize = 2048;

/// Ring slot value meaning "both samples at mid level".
pub const SILENT_SLOT: u32 = 0x8080;

const _: () = {
    assert!(READ_CURSOR_ADDR == PROG_STOP + 1);
    assert!(RING_START == READ_CURSOR_ADDR + 1);
    assert!(TABLE_START == RING_STOP + 1);
    assert!(TABLE_LEN == 512);
    assert!(RESERVED_START == TABLE_STOP + 1);
    // The ULP compares against 2*RING_LEN with a 16 bit immediate
    assert!(2 * RING_LEN <= u16::MAX as usize);
    // Table addresses must fit the 11 bit jump field
    assert!(TABLE_STOP < 2048);
};

/// Word-addressed view of a memory region shared with the coprocessor.
///
/// Hardware implementations are volatile accesses into RTC slow memory;
/// tests use [`RamRegion`].
pub trait SharedMemory {
    /// Read the 32 bit word at `addr`.
    fn read_word(&self, addr: usize) -> u32;

    /// Write the 32 bit word at `addr`.
    fn write_word(&mut self, addr: usize, value: u32);

    /// Region size in words.
    fn len(&self) -> usize;

    /// True if the region has no words.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: SharedMemory + ?Sized> SharedMemory for &mut M {
    fn read_word(&self, addr: usize) -> u32 {
        (**self).read_word(addr)
    }

    fn write_word(&mut self, addr: usize, value: u32) {
        (**self).write_word(addr, value)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// Plain RAM stand-in for RTC slow memory.
#[derive(Clone)]
pub struct RamRegion {
    words: [u32; REGION_WORDS],
}

impl RamRegion {
    /// Create a zeroed region.
    pub const fn new() -> Self {
        Self {
            words: [0; REGION_WORDS],
        }
    }

    /// Borrow the raw words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

impl Default for RamRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMemory for RamRegion {
    #[inline]
    fn read_word(&self, addr: usize) -> u32 {
        self.words[addr]
    }

    #[inline]
    fn write_word(&mut self, addr: usize, value: u32) {
        debug_assert!(addr < RESERVED_START, "write into reserved word {}", addr);
        self.words[addr] = value;
    }

    fn len(&self) -> usize {
        REGION_WORDS
    }
}

/// Address of ring slot `slot`.
#[inline]
pub const fn slot_addr(slot: usize) -> usize {
    RING_START + slot
}

/// Free slots between the host write cursor and the ULP read position.
///
/// `read_cursor` is the raw sample index published by the ULP (two samples
/// per slot). The result is in `0..RING_LEN`; 0 means the ring is saturated.
#[inline]
pub const fn free_slots(read_cursor: u32, write_cursor: u16) -> u16 {
    let read_slot = ((read_cursor & 0xFFFF) >> 1) as usize % RING_LEN;
    let write = write_cursor as usize % RING_LEN;
    ((read_slot + RING_LEN - write) % RING_LEN) as u16
}

/// Pack two 8 bit samples into a ring slot, the later sample in the high byte.
#[inline]
pub const fn pack_pair(first: u8, second: u8) -> u16 {
    first as u16 | (second as u16) << 8
}
