//! Deterministic PCM generation for integration tests
//!
//! All generators emit little-endian 16-bit samples, the only layout the
//! engine accepts.

use std::f32::consts::PI;

/// Mono 16-bit PCM holding a constant amplitude
pub fn constant_mono16(frames: usize, amplitude: i16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames * 2);
    for _ in 0..frames {
        bytes.extend_from_slice(&amplitude.to_le_bytes());
    }
    bytes
}

/// Stereo 16-bit PCM with independent constant amplitudes per channel
pub fn constant_stereo16(frames: usize, left: i16, right: i16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames * 4);
    for _ in 0..frames {
        bytes.extend_from_slice(&left.to_le_bytes());
        bytes.extend_from_slice(&right.to_le_bytes());
    }
    bytes
}

/// Mono 16-bit sine wave
pub fn sine_mono16(frames: usize, sample_rate: u32, frequency: f32, amplitude: f32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames * 2);
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let sample = (amplitude * (2.0 * PI * frequency * t).sin() * 32767.0) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
