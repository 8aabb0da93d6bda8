//! Callback-driven backends
//!
//! [`DirectMixer`] renders voices inside the output device callback itself:
//! lowest latency, at the cost of taking the voice lock on the device
//! thread. [`OfflineMixer`] is the same core with no device at all; the
//! application pulls blocks synchronously, which also makes playback fully
//! deterministic for tests.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::backend::sink::DeviceSink;
use crate::backend::voice::VoicePool;
use crate::backend::{BackendKind, MixParams, Mixer, VoiceEvents, VoiceId};
use crate::error::Result;
use crate::queue::SlotRing;
use crate::types::{AudioFrame, StreamFormat, VoiceState};

/// Mixes inside the device callback
pub struct DirectMixer {
    pool: Arc<VoicePool>,
    sink: Mutex<DeviceSink>,
}

impl DirectMixer {
    /// Open the device and start mixing into its callback. `refresh` is the
    /// update rate in passes per second.
    pub(crate) fn start(
        device: Option<&str>,
        sample_rate: u32,
        refresh: u32,
    ) -> Result<Arc<Self>> {
        let mut sink = DeviceSink::open(device, sample_rate)?;
        let out_rate = sink.sample_rate();
        let refresh_frames = out_rate / refresh.max(1);
        let pool = Arc::new(VoicePool::new(out_rate, refresh_frames));

        let cb_pool = Arc::clone(&pool);
        sink.start(move |frames| cb_pool.mix(frames))?;
        info!(out_rate, "direct mixer started");

        Ok(Arc::new(Self {
            pool,
            sink: Mutex::new(sink),
        }))
    }
}

impl Mixer for DirectMixer {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    fn sample_rate(&self) -> u32 {
        self.pool.out_rate()
    }

    fn create_voice(
        &self,
        format: StreamFormat,
        ring: Arc<Mutex<SlotRing>>,
        events: Arc<dyn VoiceEvents>,
    ) -> Result<VoiceId> {
        self.pool.create_voice(format, ring, events)
    }

    fn configure_voice(&self, voice: VoiceId, format: StreamFormat) -> Result<()> {
        self.pool.configure_voice(voice, format)
    }

    fn destroy_voice(&self, voice: VoiceId) {
        self.pool.destroy_voice(voice);
    }

    fn voice_format(&self, voice: VoiceId) -> Option<StreamFormat> {
        self.pool.voice_format(voice)
    }

    fn play(&self, voice: VoiceId) -> Result<()> {
        self.pool.play(voice)
    }

    fn stop(&self, voice: VoiceId) -> Result<()> {
        self.pool.stop(voice)
    }

    fn pause(&self, voice: VoiceId) -> Result<()> {
        self.pool.pause(voice)
    }

    fn resume(&self, voice: VoiceId) -> Result<()> {
        self.pool.resume(voice)
    }

    fn voice_state(&self, voice: VoiceId) -> VoiceState {
        self.pool.voice_state(voice)
    }

    fn set_params(&self, voice: VoiceId, params: MixParams) {
        self.pool.set_params(voice, params);
    }

    fn played_frames(&self, voice: VoiceId) -> u64 {
        self.pool.played_frames(voice)
    }

    fn reset_position(&self, voice: VoiceId) {
        self.pool.reset_position(voice);
    }

    fn set_update_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.pool.set_update_hook(hook);
    }

    fn set_suspended(&self, suspended: bool) {
        self.pool.set_suspended(suspended);
    }

    fn device_error(&self) -> bool {
        self.sink.lock().unwrap().has_error()
    }

    fn shutdown(&self) {
        self.sink.lock().unwrap().stop();
    }
}

/// Device-less backend: the application pulls rendered blocks itself
pub struct OfflineMixer {
    pool: Arc<VoicePool>,
}

impl OfflineMixer {
    pub(crate) fn start(sample_rate: u32, refresh: u32) -> Arc<Self> {
        let refresh_frames = sample_rate / refresh.max(1);
        info!(sample_rate, "offline mixer started");
        Arc::new(Self {
            pool: Arc::new(VoicePool::new(sample_rate, refresh_frames)),
        })
    }
}

impl Mixer for OfflineMixer {
    fn kind(&self) -> BackendKind {
        BackendKind::Offline
    }

    fn sample_rate(&self) -> u32 {
        self.pool.out_rate()
    }

    fn create_voice(
        &self,
        format: StreamFormat,
        ring: Arc<Mutex<SlotRing>>,
        events: Arc<dyn VoiceEvents>,
    ) -> Result<VoiceId> {
        self.pool.create_voice(format, ring, events)
    }

    fn configure_voice(&self, voice: VoiceId, format: StreamFormat) -> Result<()> {
        self.pool.configure_voice(voice, format)
    }

    fn destroy_voice(&self, voice: VoiceId) {
        self.pool.destroy_voice(voice);
    }

    fn voice_format(&self, voice: VoiceId) -> Option<StreamFormat> {
        self.pool.voice_format(voice)
    }

    fn play(&self, voice: VoiceId) -> Result<()> {
        self.pool.play(voice)
    }

    fn stop(&self, voice: VoiceId) -> Result<()> {
        self.pool.stop(voice)
    }

    fn pause(&self, voice: VoiceId) -> Result<()> {
        self.pool.pause(voice)
    }

    fn resume(&self, voice: VoiceId) -> Result<()> {
        self.pool.resume(voice)
    }

    fn voice_state(&self, voice: VoiceId) -> VoiceState {
        self.pool.voice_state(voice)
    }

    fn set_params(&self, voice: VoiceId, params: MixParams) {
        self.pool.set_params(voice, params);
    }

    fn played_frames(&self, voice: VoiceId) -> u64 {
        self.pool.played_frames(voice)
    }

    fn reset_position(&self, voice: VoiceId) {
        self.pool.reset_position(voice);
    }

    fn set_update_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.pool.set_update_hook(hook);
    }

    fn set_suspended(&self, suspended: bool) {
        self.pool.set_suspended(suspended);
    }

    fn render_offline(&self, frames: &mut [AudioFrame]) -> Result<()> {
        self.pool.mix(frames);
        Ok(())
    }

    fn shutdown(&self) {}
}
