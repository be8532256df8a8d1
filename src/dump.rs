//! Human-readable dumps of the shared region, for offline debugging.
//!
//! Output is meant for a serial console; nothing parses it.

use core::fmt::{self, Write};

use crate::layout::{SharedMemory, PROG_START, PROG_STOP, READ_CURSOR_ADDR, RING_START, RING_STOP, TABLE_START, TABLE_STOP};
use crate::ulp::insn::Insn;

/// Ring words per dump row (two samples each).
const WORDS_PER_ROW: usize = 8;

/// Dump program, read cursor, ring and DAC table.
pub fn write_status<M: SharedMemory + ?Sized, W: Write>(mem: &M, out: &mut W) -> fmt::Result {
    write!(out, "--- ULP PROGRAM\r\n")?;
    for addr in PROG_START..=PROG_STOP {
        let word = mem.read_word(addr);
        match Insn::decode(word) {
            Some(insn) => write!(out, "[{:04}]: 0x{:08X}  {}\r\n", addr, word, insn)?,
            None => write!(out, "[{:04}]: 0x{:08X}  .word\r\n", addr, word)?,
        }
    }

    write!(out, "--- ULP FIFO HEAD POS\r\n")?;
    let cursor = mem.read_word(READ_CURSOR_ADDR) & 0xFFFF;
    write!(out, "[{:04}]: 0x{:04X} or {}\r\n", READ_CURSOR_ADDR, cursor, cursor)?;

    write!(out, "--- ULP AUDIO SAMPLES\r\n")?;
    write_ring(mem, out)?;

    write!(out, "--- ULP DAC MAP\r\n")?;
    for addr in (TABLE_START..=TABLE_STOP).step_by(2) {
        let write = mem.read_word(addr);
        let ret = mem.read_word(addr + 1);
        write!(
            out,
            "[{:04}]: 0x{:08X} (write {:03} to dac) 0x{:08X} (return)\r\n",
            addr,
            write,
            (write >> 10) & 0xFF,
            ret
        )?;
    }
    Ok(())
}

fn write_ring<M: SharedMemory + ?Sized, W: Write>(mem: &M, out: &mut W) -> fmt::Result {
    let mut row_start = RING_START;
    while row_start <= RING_STOP {
        let row_end = (row_start + WORDS_PER_ROW).min(RING_STOP + 1);
        let mut samples = [0u8; WORDS_PER_ROW * 2];
        let count = (row_end - row_start) * 2;
        for (i, addr) in (row_start..row_end).enumerate() {
            let word = mem.read_word(addr);
            samples[i * 2] = word as u8;
            samples[i * 2 + 1] = (word >> 8) as u8;
        }
        write!(out, "[{:04}]: ", row_start)?;
        write_hex_row(out, &samples[..count], samples.len())?;
        row_start = row_end;
    }
    Ok(())
}

/// Classic 16 bytes per row hex dump with a printable column.
pub fn hex_dump<W: Write>(bytes: &[u8], out: &mut W) -> fmt::Result {
    const STEP: usize = 16;
    write!(out, "--- START MEM DUMP [{}]\r\n", bytes.len())?;
    for (row, chunk) in bytes.chunks(STEP).enumerate() {
        write!(out, "[{:08X}]: ", row * STEP)?;
        write_hex_row(out, chunk, STEP)?;
    }
    write!(out, "---   END MEM DUMP\r\n")
}

fn write_hex_row<W: Write>(out: &mut W, bytes: &[u8], width: usize) -> fmt::Result {
    for i in 0..width {
        match bytes.get(i) {
            Some(b) => write!(out, "{:02X} ", b)?,
            None => out.write_str("   ")?,
        }
    }
    out.write_str("| ")?;
    for i in 0..width {
        match bytes.get(i) {
            Some(&b) if b.is_ascii_graphic() || b == b' ' => out.write_char(b as char)?,
            Some(_) => out.write_char('.')?,
            None => out.write_char(' ')?,
        }
    }
    out.write_str("\r\n")
}
