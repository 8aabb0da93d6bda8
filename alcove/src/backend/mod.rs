//! Mixer backends
//!
//! A [`Mixer`] owns the voice pool and turns queued PCM into output frames.
//! Two production backends share one render core: [`DirectMixer`] mixes
//! inside the output device callback, [`GraphMixer`] mixes on a dedicated
//! thread and hands frames to the device through a lock-free ring. The
//! [`OfflineMixer`] drives the same core from plain function calls for
//! headless rendering and tests.

pub mod direct;
pub mod graph;
pub mod ring;
pub mod sink;
pub mod voice;

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::queue::SlotRing;
use crate::types::{StreamFormat, VoiceState};

pub use direct::{DirectMixer, OfflineMixer};
pub use graph::GraphMixer;

/// Which mixing strategy a context runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Mix directly inside the output device callback
    Direct,
    /// Mix on a dedicated thread, feed the device through a frame ring
    Graph,
    /// No device; the application pulls frames explicitly
    Offline,
}

/// Handle to one voice inside a mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub(crate) u32);

/// Per-voice mix settings computed by the update pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParams {
    /// Left/right channel gains
    pub gains: [f32; 2],
    /// Playback rate multiplier, doppler already folded in
    pub pitch: f32,
    /// One-pole lowpass amount, 1.0 = open
    pub lowpass: f32,
}

impl Default for MixParams {
    fn default() -> Self {
        Self {
            gains: [1.0, 1.0],
            pitch: 1.0,
            lowpass: 1.0,
        }
    }
}

/// Callbacks the render loop fires as a voice walks its slot ring.
///
/// Both methods run on the mixing thread with the voice's ring lock held,
/// so implementations must not block or take locks that could be held
/// while waiting on the ring.
pub trait VoiceEvents: Send + Sync {
    /// The voice finished playing the slot at `slot`
    fn slot_consumed(&self, ring: &mut SlotRing, slot: usize);

    /// The voice ran off the end of its chain and stopped
    fn drained(&self);
}

/// A mixing backend.
///
/// Voices are created against a content format and bound to a slot ring
/// plus an event sink for the lifetime of the voice. All methods are safe
/// to call from any thread.
pub trait Mixer: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Output sample rate frames are produced at
    fn sample_rate(&self) -> u32;

    /// Create a voice consuming `format` content from `ring`.
    ///
    /// Fails with `OutOfMemory` when the per-channel-count voice budget is
    /// exhausted.
    fn create_voice(
        &self,
        format: StreamFormat,
        ring: Arc<Mutex<SlotRing>>,
        events: Arc<dyn VoiceEvents>,
    ) -> Result<VoiceId>;

    /// Change a voice's content format. Only legal while the voice is
    /// stopped with an empty ring.
    fn configure_voice(&self, voice: VoiceId, format: StreamFormat) -> Result<()>;

    fn destroy_voice(&self, voice: VoiceId);

    fn voice_format(&self, voice: VoiceId) -> Option<StreamFormat>;

    fn play(&self, voice: VoiceId) -> Result<()>;

    fn stop(&self, voice: VoiceId) -> Result<()>;

    fn pause(&self, voice: VoiceId) -> Result<()>;

    fn resume(&self, voice: VoiceId) -> Result<()>;

    fn voice_state(&self, voice: VoiceId) -> VoiceState;

    fn set_params(&self, voice: VoiceId, params: MixParams);

    /// Source frames this voice has consumed since its position counter was
    /// last reset
    fn played_frames(&self, voice: VoiceId) -> u64;

    /// Zero the voice's position counter and send playback back to the
    /// oldest queued slot
    fn reset_position(&self, voice: VoiceId);

    /// Install the periodic update callback, invoked once per refresh
    /// interval of rendered output
    fn set_update_hook(&self, hook: Box<dyn Fn() + Send + Sync>);

    /// While suspended, voices keep rendering with their current settings
    /// but periodic update ticks are withheld
    fn set_suspended(&self, suspended: bool);

    /// Whether the output stream has reported a device error since starting
    fn device_error(&self) -> bool {
        false
    }

    /// Render `frames` of output synchronously. Only the offline backend
    /// supports this; device-driven backends refuse.
    fn render_offline(&self, frames: &mut [crate::types::AudioFrame]) -> Result<()> {
        let _ = frames;
        Err(crate::error::Error::InvalidOperation(
            "offline rendering requires the offline backend".to_string(),
        ))
    }

    /// Tear down device streams and worker threads
    fn shutdown(&self);
}
