//! Graph backend: mix thread feeding the device through a frame ring
//!
//! The render work happens on a dedicated thread that keeps the SPSC ring
//! topped up one refresh-sized chunk at a time. The device callback only
//! pops frames, so it never contends for the voice lock. Underruns surface
//! as silence plus a counter, never as a blocked callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info};

use crate::backend::ring::FrameRing;
use crate::backend::sink::DeviceSink;
use crate::backend::voice::VoicePool;
use crate::backend::{BackendKind, MixParams, Mixer, VoiceEvents, VoiceId};
use crate::error::{Error, Result};
use crate::queue::SlotRing;
use crate::types::{AudioFrame, StreamFormat, VoiceState};

/// Ring capacity in refresh-sized chunks
const RING_CHUNKS: usize = 4;

pub struct GraphMixer {
    pool: Arc<VoicePool>,
    sink: Mutex<DeviceSink>,
    quit: Arc<AtomicBool>,
    mix_thread: Mutex<Option<JoinHandle<()>>>,
}

impl GraphMixer {
    /// Open the device, spawn the mix thread, and start streaming.
    pub(crate) fn start(
        device: Option<&str>,
        sample_rate: u32,
        refresh: u32,
    ) -> Result<Arc<Self>> {
        let mut sink = DeviceSink::open(device, sample_rate)?;
        let out_rate = sink.sample_rate();
        let chunk = (out_rate / refresh.max(1)).max(1) as usize;
        let pool = Arc::new(VoicePool::new(out_rate, chunk as u32));

        let ring = FrameRing::new(chunk * RING_CHUNKS, pool.playing_flag());
        let (mut producer, mut consumer) = ring.split();

        let quit = Arc::new(AtomicBool::new(false));
        let thread_quit = Arc::clone(&quit);
        let thread_pool = Arc::clone(&pool);
        let idle_wait = Duration::from_secs_f64(chunk as f64 / out_rate as f64 / 2.0);

        let mix_thread = std::thread::Builder::new()
            .name("alcove-mix".to_string())
            .spawn(move || {
                debug!(chunk, "mix thread running");
                let mut scratch = vec![AudioFrame::zero(); chunk];
                while !thread_quit.load(Ordering::Acquire) {
                    if producer.needs_frames() {
                        thread_pool.mix(&mut scratch);
                        for frame in &scratch {
                            if !producer.push(*frame) {
                                break;
                            }
                        }
                    } else {
                        std::thread::sleep(idle_wait);
                    }
                }
                debug!("mix thread exiting");
            })
            .map_err(|e| Error::InvalidOperation(format!("failed to spawn mix thread: {e}")))?;

        sink.start(move |out| {
            for frame in out.iter_mut() {
                *frame = consumer.pop().unwrap_or_else(AudioFrame::zero);
            }
        })?;
        info!(out_rate, chunk, "graph mixer started");

        Ok(Arc::new(Self {
            pool,
            sink: Mutex::new(sink),
            quit,
            mix_thread: Mutex::new(Some(mix_thread)),
        }))
    }
}

impl Mixer for GraphMixer {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
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
        self.quit.store(true, Ordering::Release);
        if let Some(handle) = self.mix_thread.lock().unwrap().take() {
            if handle.join().is_err() {
                debug!("mix thread panicked during shutdown");
            }
        }
        self.sink.lock().unwrap().stop();
    }
}

impl Drop for GraphMixer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
