//! Core data types shared across the engine
//!
//! Handle types, PCM format descriptors, and the state enumerations used by
//! buffers, sources, and mixer voices.

use std::fmt;

/// Maximum sample rate accepted for buffer data
pub const MAX_FREQUENCY: u32 = 48_000;

/// Opaque handle to a [`Buffer`](crate::buffer::Buffer).
///
/// Nonzero while live; zero is reserved for "no buffer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

impl BufferId {
    /// Raw integer name of this handle
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Opaque handle to a [`Source`](crate::source::Source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u32);

impl SourceId {
    /// Raw integer name of this handle
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// PCM sample layout for buffer data.
///
/// The 8-bit layouts are recognized tokens but rejected by `set_data`; the
/// mixer consumes 16-bit signed samples only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl SampleFormat {
    /// Channel count for this layout
    pub fn channels(&self) -> u16 {
        match self {
            SampleFormat::Mono8 | SampleFormat::Mono16 => 1,
            SampleFormat::Stereo8 | SampleFormat::Stereo16 => 2,
        }
    }

    /// Bits per sample
    pub fn bits(&self) -> u16 {
        match self {
            SampleFormat::Mono8 | SampleFormat::Stereo8 => 8,
            SampleFormat::Mono16 | SampleFormat::Stereo16 => 16,
        }
    }

    /// Whether `set_data` accepts this layout
    pub fn is_supported(&self) -> bool {
        self.bits() == 16
    }

    /// Bytes per frame (one sample across all channels)
    pub fn frame_bytes(&self) -> usize {
        self.channels() as usize * (self.bits() / 8) as usize
    }
}

/// Sample rate and channel count of an established stream.
///
/// Recorded on the first push of a streaming session; later pushes must
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    /// Bytes per interleaved 16-bit frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }
}

/// Buffer usage state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Not referenced by any source; data may be replaced, handle deleted
    Unused,
    /// Referenced by at least one source
    Pending,
    /// Was referenced, refcount has returned to zero
    Processed,
}

/// How a source feeds its voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// No buffer attached or queued yet
    Undetermined,
    /// Single attached buffer in a dedicated slot
    Static,
    /// Application-fed slot ring
    Streaming,
}

/// Application-visible source playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Never played since creation
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Mixer-level voice state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Stopped,
    Playing,
    Paused,
}

/// AudioFrame represents a single stereo sample (one frame of audio).
///
/// Used for passing audio data between the mixer voices and the output sink.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Create a frame from left and right samples
    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Add another frame to this frame (for mixing)
    pub fn add(&mut self, other: &AudioFrame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Clamp samples to valid range [-1.0, 1.0] to prevent clipping
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_metadata() {
        assert_eq!(SampleFormat::Mono16.channels(), 1);
        assert_eq!(SampleFormat::Stereo16.channels(), 2);
        assert_eq!(SampleFormat::Stereo16.bits(), 16);
        assert_eq!(SampleFormat::Stereo16.frame_bytes(), 4);
        assert_eq!(SampleFormat::Mono8.frame_bytes(), 1);
    }

    #[test]
    fn test_only_16_bit_supported() {
        assert!(SampleFormat::Mono16.is_supported());
        assert!(SampleFormat::Stereo16.is_supported());
        assert!(!SampleFormat::Mono8.is_supported());
        assert!(!SampleFormat::Stereo8.is_supported());
    }

    #[test]
    fn test_audio_frame_mixing() {
        let mut frame = AudioFrame::from_stereo(0.8, -0.8);
        frame.add(&AudioFrame::from_stereo(0.5, -0.5));
        frame.clamp();
        assert_eq!(frame.left, 1.0);
        assert_eq!(frame.right, -1.0);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(BufferId(7).to_string(), "buffer#7");
        assert_eq!(SourceId(3).to_string(), "source#3");
    }
}
