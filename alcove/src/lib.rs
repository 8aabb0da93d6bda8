//! # Alcove
//!
//! Buffer-queue audio engine with 3D panning.
//!
//! **Purpose:** Play application-supplied 16-bit PCM through named buffers
//! and sources in the style of the classic AL API: fill a [`context::Context`]'s
//! buffers, queue them onto sources, and let the mixer consume the queue while
//! a periodic update pass folds listener and source parameters into per-voice
//! gain, pitch, and lowpass settings.
//!
//! **Architecture:** A four-slot ring per source feeds a voice pool rendered
//! either straight in the cpal output callback, through a dedicated mix
//! thread and frame ring, or synchronously for offline use. Panning,
//! distance attenuation, doppler, and cone filtering live in a pure
//! [`panner::Panner`]. Capture runs as an independent cpal input stream.

pub mod buffer;
pub mod capture;
pub mod context;
pub mod error;
pub mod panner;
pub mod tokens;
pub mod types;

mod backend;
mod queue;
mod registry;
mod source;

pub use backend::BackendKind;
pub use buffer::{Buffer, PcmData};
pub use capture::CaptureDevice;
pub use context::{output_devices, Context, ContextAttributes, ContextConfig, EXTENSIONS};
pub use error::{Error, ErrorCode, Result};
pub use glam::Vec3;
pub use panner::{DistanceModel, MixOutput, Panner, SpatialParams};
pub use source::SourceParams;
pub use types::{
    AudioFrame, BufferId, BufferState, PlaybackMode, SampleFormat, SourceId, SourceState,
    StreamFormat,
};
