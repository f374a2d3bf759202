//! PCM byte → f32 converters
//!
//! One converter per sample encoding; the WAV decoder picks one at open time
//! and keeps it as a plain function pointer.

use super::SampleEncoding;

/// Convert little-endian PCM bytes into normalized f32 samples
///
/// `input.len()` must equal `output.len() * bytes_per_sample`.
pub type PcmConverter = fn(&[u8], &mut [f32]);

const SCALE_8: f32 = 1.0 / 128.0;
const SCALE_16: f32 = 1.0 / 32768.0;
const SCALE_24: f32 = 1.0 / 8388608.0; // 2^23
const SCALE_32: f32 = 1.0 / 2147483648.0; // 2^31

/// Select the converter for an encoding (None for compressed data)
pub fn converter_for(encoding: SampleEncoding) -> Option<PcmConverter> {
    match encoding {
        SampleEncoding::Unsigned8 => Some(convert_u8),
        SampleEncoding::Signed16 => Some(convert_i16),
        SampleEncoding::Signed24 => Some(convert_i24),
        SampleEncoding::Signed32 => Some(convert_i32),
        SampleEncoding::Float32 => Some(convert_f32),
        SampleEncoding::Float64 => Some(convert_f64),
        SampleEncoding::Compressed => None,
    }
}

/// Bytes occupied by one sample of an encoding
pub fn bytes_per_sample(encoding: SampleEncoding) -> usize {
    match encoding {
        SampleEncoding::Unsigned8 => 1,
        SampleEncoding::Signed16 => 2,
        SampleEncoding::Signed24 => 3,
        SampleEncoding::Signed32 | SampleEncoding::Float32 => 4,
        SampleEncoding::Float64 => 8,
        SampleEncoding::Compressed => 0,
    }
}

fn convert_u8(input: &[u8], output: &mut [f32]) {
    for (dst, &byte) in output.iter_mut().zip(input) {
        *dst = (byte as f32 - 128.0) * SCALE_8;
    }
}

fn convert_i16(input: &[u8], output: &mut [f32]) {
    for (dst, b) in output.iter_mut().zip(input.chunks_exact(2)) {
        *dst = i16::from_le_bytes([b[0], b[1]]) as f32 * SCALE_16;
    }
}

fn convert_i24(input: &[u8], output: &mut [f32]) {
    for (dst, b) in output.iter_mut().zip(input.chunks_exact(3)) {
        // Place the 24 bits at the top of an i32 and shift back to sign-extend
        let val = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
        *dst = val as f32 * SCALE_24;
    }
}

fn convert_i32(input: &[u8], output: &mut [f32]) {
    for (dst, b) in output.iter_mut().zip(input.chunks_exact(4)) {
        *dst = i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 * SCALE_32;
    }
}

fn convert_f32(input: &[u8], output: &mut [f32]) {
    for (dst, b) in output.iter_mut().zip(input.chunks_exact(4)) {
        *dst = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    }
}

fn convert_f64(input: &[u8], output: &mut [f32]) {
    for (dst, b) in output.iter_mut().zip(input.chunks_exact(8)) {
        let bytes: [u8; 8] = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        *dst = f64::from_le_bytes(bytes) as f32;
    }
}
