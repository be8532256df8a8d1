//! [`FrameDecoder`] over the foxenflac C component.
//!
//! The component lives in `components/foxenflac` and is built by ESP-IDF;
//! only the handful of entry points below are used.

use alloc::vec::Vec;
use core::ffi::c_void;
use core::ptr;

use crate::decoder::{DecoderState, FrameDecoder, Progress};

/// Largest block size of the FLAC subset at 48 kHz.
pub const MAX_BLOCK_SIZE: u16 = 4608;

/// Channels the decoder is sized for.
pub const MAX_CHANNELS: u8 = 2;

const FLAC_KEY_SAMPLE_RATE: i32 = 4;

extern "C" {
    fn fx_flac_size(max_block_size: u32, max_channels: u8) -> u32;
    fn fx_flac_init(mem: *mut c_void, max_block_size: u16, max_channels: u8) -> *mut c_void;
    fn fx_flac_reset(inst: *mut c_void);
    fn fx_flac_get_streaminfo(inst: *const c_void, key: i32) -> i64;
    fn fx_flac_process(
        inst: *mut c_void,
        input: *const u8,
        in_len: *mut u32,
        out: *mut i32,
        out_len: *mut u32,
    ) -> i32;
}

fn state_from_raw(raw: i32) -> DecoderState {
    match raw {
        0 => DecoderState::Init,
        1 => DecoderState::InMetadata,
        2 => DecoderState::EndOfMetadata,
        3 => DecoderState::SearchFrame,
        4 => DecoderState::InFrame,
        5 => DecoderState::DecodedFrame,
        6 => DecoderState::EndOfFrame,
        _ => DecoderState::Error,
    }
}

/// Heap-backed foxenflac instance.
pub struct FoxenFlac {
    // Instance memory; `inst` points into it.
    _mem: Vec<u64>,
    inst: *mut c_void,
}

impl FoxenFlac {
    /// Allocate a decoder sized for `max_block_size` × `max_channels`.
    ///
    /// Returns `None` if the component rejects the parameters.
    pub fn new(max_block_size: u16, max_channels: u8) -> Option<Self> {
        let bytes = unsafe { fx_flac_size(max_block_size as u32, max_channels) } as usize;
        if bytes == 0 {
            return None;
        }
        let mut mem = alloc::vec![0u64; bytes.div_ceil(8)];
        let inst = unsafe { fx_flac_init(mem.as_mut_ptr().cast(), max_block_size, max_channels) };
        if inst.is_null() {
            return None;
        }
        Some(Self { _mem: mem, inst })
    }
}

impl FrameDecoder for FoxenFlac {
    fn reset(&mut self) {
        // SAFETY: `inst` was returned by fx_flac_init and its memory is owned by self.
        unsafe { fx_flac_reset(self.inst) }
    }

    fn process(&mut self, input: &[u8], output: &mut [i32]) -> Progress {
        let mut in_len = input.len() as u32;
        let mut out_len = output.len() as u32;
        let (out_ptr, out_len_ptr) = if output.is_empty() {
            (ptr::null_mut(), ptr::null_mut())
        } else {
            (output.as_mut_ptr(), &mut out_len as *mut u32)
        };

        // SAFETY: buffers and lengths come from live slices; the decoder
        // writes back how much it used.
        let raw = unsafe { fx_flac_process(self.inst, input.as_ptr(), &mut in_len, out_ptr, out_len_ptr) };

        Progress {
            consumed: (in_len as usize).min(input.len()),
            produced: if output.is_empty() { 0 } else { (out_len as usize).min(output.len()) },
            state: state_from_raw(raw),
        }
    }

    fn sample_rate(&self) -> u32 {
        let rate = unsafe { fx_flac_get_streaminfo(self.inst, FLAC_KEY_SAMPLE_RATE) };
        u32::try_from(rate).unwrap_or(0)
    }
}
