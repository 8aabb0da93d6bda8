//! Engine context
//!
//! A [`Context`] owns the buffer and source tables, the listener state, and
//! the mixer backend, and is the only public entry point. Every fallible
//! operation returns a [`Result`] and additionally records its error code in
//! the context's last-error register, which [`Context::last_error`] reads
//! and clears.
//!
//! Parameter changes do not reach the mixer immediately. Sources are marked
//! dirty and folded into voice settings by the periodic update pass, driven
//! by the backend's mix cadence. [`Context::suspend`] withholds those passes
//! (audio keeps playing with stale settings) and [`Context::process`]
//! resumes them with a forced pass, which offline callers also use to apply
//! changes deterministically between renders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::backend::voice::{MAX_MONO_VOICES, MAX_STEREO_VOICES};
use crate::backend::{BackendKind, DirectMixer, GraphMixer, Mixer, OfflineMixer};
use crate::buffer::Buffer;
use crate::error::{Error, ErrorCode, Result};
use crate::panner::{DistanceModel, Panner};
use crate::registry::NameTable;
use crate::source::{Source, SourceParams, QUEUE_DEPTH};
use crate::types::{
    AudioFrame, BufferId, BufferState, PlaybackMode, SampleFormat, SourceId, SourceState,
    StreamFormat, MAX_FREQUENCY,
};

/// Extension identifiers this engine honors
pub const EXTENSIONS: &[&str] = &[
    "ALC_EXT_CAPTURE",
    "AL_EXT_LINEAR_DISTANCE",
    "AL_EXT_EXPONENT_DISTANCE",
];

/// Names of the available output devices
pub fn output_devices() -> Result<Vec<String>> {
    crate::backend::sink::DeviceSink::list_devices()
}

/// Settings for [`Context::open`]
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub backend: BackendKind,
    /// Output device name, None for the system default
    pub device: Option<String>,
    /// Requested output rate in Hz; the device may override it
    pub frequency: u32,
    /// Update passes per second
    pub refresh: u32,
    /// Advisory voice counts, capped at the engine budgets
    pub mono_sources: u32,
    pub stereo_sources: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Graph,
            device: None,
            frequency: 48_000,
            refresh: 60,
            mono_sources: MAX_MONO_VOICES as u32,
            stereo_sources: MAX_STEREO_VOICES as u32,
        }
    }
}

/// Negotiated context attributes, queryable after open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAttributes {
    /// Actual output rate in Hz
    pub frequency: u32,
    pub refresh: u32,
    /// Always false; the engine only operates asynchronously
    pub sync: bool,
    pub mono_sources: u32,
    pub stereo_sources: u32,
}

/// State shared with the backend's update hook
struct Engine {
    mixer: Arc<dyn Mixer>,
    sources: Mutex<NameTable<Source>>,
    panner: Mutex<Panner>,
}

impl Engine {
    /// One update pass: relink loops and push dirty parameters to voices
    fn update_all(&self) {
        let mut sources = self.sources.lock().unwrap();
        let panner = self.panner.lock().unwrap();
        for (_, source) in sources.iter_mut() {
            source.sync_voice(self.mixer.as_ref(), &panner);
        }
    }

    fn mark_all_dirty(&self) {
        for (_, source) in self.sources.lock().unwrap().iter_mut() {
            source.mark_dirty();
        }
    }
}

/// An audio engine instance
pub struct Context {
    engine: Arc<Engine>,
    buffers: Mutex<NameTable<Buffer>>,
    last_error: Mutex<ErrorCode>,
    suspended: AtomicBool,
    refresh: u32,
    mono_sources: u32,
    stereo_sources: u32,
    eager_buffers: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("refresh", &self.refresh)
            .field("mono_sources", &self.mono_sources)
            .field("stereo_sources", &self.stereo_sources)
            .field("suspended", &self.suspended)
            .field("eager_buffers", &self.eager_buffers)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Open a context on the configured backend.
    ///
    /// Fails with InvalidValue for out-of-range attributes and with the
    /// backend's error when the output device cannot be opened.
    pub fn open(config: ContextConfig) -> Result<Context> {
        if config.frequency == 0 || config.frequency > MAX_FREQUENCY {
            return Err(Error::InvalidValue(format!(
                "output rate {} outside (0, {MAX_FREQUENCY}]",
                config.frequency
            )));
        }
        if config.refresh == 0 || config.refresh > config.frequency {
            return Err(Error::InvalidValue(format!(
                "refresh rate {} outside [1, {}]",
                config.refresh, config.frequency
            )));
        }
        if config.mono_sources as usize > MAX_MONO_VOICES {
            return Err(Error::InvalidValue(format!(
                "{} mono voices requested, limit is {MAX_MONO_VOICES}",
                config.mono_sources
            )));
        }
        if config.stereo_sources as usize > MAX_STEREO_VOICES {
            return Err(Error::InvalidValue(format!(
                "{} stereo voices requested, limit is {MAX_STEREO_VOICES}",
                config.stereo_sources
            )));
        }

        let mixer: Arc<dyn Mixer> = match config.backend {
            BackendKind::Direct => {
                DirectMixer::start(config.device.as_deref(), config.frequency, config.refresh)?
            }
            BackendKind::Graph => {
                GraphMixer::start(config.device.as_deref(), config.frequency, config.refresh)?
            }
            BackendKind::Offline => OfflineMixer::start(config.frequency, config.refresh),
        };

        let engine = Arc::new(Engine {
            mixer,
            sources: Mutex::new(NameTable::new()),
            panner: Mutex::new(Panner::new()),
        });

        let hook_engine = Arc::downgrade(&engine);
        engine.mixer.set_update_hook(Box::new(move || {
            if let Some(engine) = hook_engine.upgrade() {
                engine.update_all();
            }
        }));

        info!(
            backend = ?config.backend,
            frequency = engine.mixer.sample_rate(),
            refresh = config.refresh,
            "context opened"
        );

        Ok(Context {
            engine,
            buffers: Mutex::new(NameTable::new()),
            last_error: Mutex::new(ErrorCode::NoError),
            suspended: AtomicBool::new(false),
            refresh: config.refresh,
            mono_sources: config.mono_sources,
            stereo_sources: config.stereo_sources,
            // Direct-backend buffers reserve their default block at
            // generate time; the other backends allocate on set_data.
            eager_buffers: matches!(config.backend, BackendKind::Direct),
        })
    }

    /// Stop the backend and release the device
    pub fn close(self) {
        self.engine.mixer.shutdown();
    }

    /// Negotiated attributes of this context
    pub fn attributes(&self) -> ContextAttributes {
        ContextAttributes {
            frequency: self.engine.mixer.sample_rate(),
            refresh: self.refresh,
            sync: false,
            mono_sources: self.mono_sources,
            stereo_sources: self.stereo_sources,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.engine.mixer.kind()
    }

    /// Whether the output stream has reported a device error since opening
    pub fn device_error(&self) -> bool {
        self.engine.mixer.device_error()
    }

    /// Extension identifiers this engine honors
    pub fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    /// Read and clear the last-error register
    pub fn last_error(&self) -> ErrorCode {
        std::mem::replace(&mut *self.last_error.lock().unwrap(), ErrorCode::NoError)
    }

    /// Withhold update passes; playback continues with stale parameters
    pub fn suspend(&self) {
        if !self.suspended.swap(true, Ordering::AcqRel) {
            self.engine.mixer.set_suspended(true);
            debug!("context suspended, parameter updates deferred");
        }
    }

    /// Resume update passes and run one immediately.
    ///
    /// Also useful unsuspended: offline callers invoke it to apply pending
    /// parameter changes between renders.
    pub fn process(&self) {
        if self.suspended.swap(false, Ordering::AcqRel) {
            self.engine.mixer.set_suspended(false);
            debug!("context resumed");
        }
        self.engine.update_all();
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Render the next block synchronously, offline backend only
    pub fn render_offline(&self, frames: &mut [AudioFrame]) -> Result<()> {
        let result = self.engine.mixer.render_offline(frames);
        self.track(result)
    }

    // --- buffers ---

    /// Generate one buffer
    pub fn gen_buffer(&self) -> Result<BufferId> {
        let mut ids = self.gen_buffers(1)?;
        ids.pop()
            .ok_or_else(|| Error::InvalidOperation("buffer generation yielded nothing".to_string()))
    }

    /// Generate `count` buffers, all or none
    pub fn gen_buffers(&self, count: usize) -> Result<Vec<BufferId>> {
        let result = self.gen_buffers_impl(count);
        self.track(result)
    }

    fn gen_buffers_impl(&self, count: usize) -> Result<Vec<BufferId>> {
        let mut fresh = Vec::with_capacity(count);
        for _ in 0..count {
            fresh.push(Buffer::new(self.eager_buffers)?);
        }
        let mut buffers = self.buffers.lock().unwrap();
        let ids = fresh
            .into_iter()
            .map(|buffer| BufferId(buffers.insert(buffer)))
            .collect();
        Ok(ids)
    }

    pub fn delete_buffer(&self, buffer: BufferId) -> Result<()> {
        self.delete_buffers(&[buffer])
    }

    /// Delete buffers, all or none.
    ///
    /// Fails with InvalidName for a dead handle and InvalidOperation if any
    /// buffer is still held by a source.
    pub fn delete_buffers(&self, ids: &[BufferId]) -> Result<()> {
        let result = self.delete_buffers_impl(ids);
        self.track(result)
    }

    fn delete_buffers_impl(&self, ids: &[BufferId]) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        for id in ids {
            let buffer = buffers.get(id.raw()).ok_or_else(|| no_buffer(*id))?;
            if !buffer.is_deletable() {
                return Err(Error::InvalidOperation(format!(
                    "{id} is still held by a source"
                )));
            }
        }
        for id in ids {
            buffers.remove(id.raw());
            debug!(buffer = %id, "buffer deleted");
        }
        Ok(())
    }

    pub fn is_buffer(&self, buffer: BufferId) -> bool {
        self.buffers.lock().unwrap().contains(buffer.raw())
    }

    /// Fill a buffer with 16-bit PCM
    pub fn buffer_data(
        &self,
        buffer: BufferId,
        format: SampleFormat,
        data: &[u8],
        rate: u32,
    ) -> Result<()> {
        let result = self.with_buffer(buffer, |b| b.set_data(format, data, rate));
        self.track(result)
    }

    pub fn buffer_state(&self, buffer: BufferId) -> Result<BufferState> {
        let result = self.with_buffer(buffer, |b| Ok(b.state()));
        self.track(result)
    }

    /// Sources currently holding the buffer
    pub fn buffer_references(&self, buffer: BufferId) -> Result<u32> {
        let result = self.with_buffer(buffer, |b| Ok(b.ref_count()));
        self.track(result)
    }

    pub fn buffer_frequency(&self, buffer: BufferId) -> Result<u32> {
        let result = self.with_buffer(buffer, |b| Ok(b.frequency()));
        self.track(result)
    }

    pub fn buffer_bits(&self, buffer: BufferId) -> Result<u16> {
        let result = self.with_buffer(buffer, |b| Ok(b.bits()));
        self.track(result)
    }

    pub fn buffer_channels(&self, buffer: BufferId) -> Result<u16> {
        let result = self.with_buffer(buffer, |b| Ok(b.channels()));
        self.track(result)
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Result<usize> {
        let result = self.with_buffer(buffer, |b| Ok(b.size()));
        self.track(result)
    }

    // --- sources ---

    /// Generate one source
    pub fn gen_source(&self) -> Result<SourceId> {
        let mut ids = self.gen_sources(1)?;
        ids.pop()
            .ok_or_else(|| Error::InvalidOperation("source generation yielded nothing".to_string()))
    }

    /// Generate `count` sources, all or none.
    ///
    /// Fails with OutOfMemory when the voice budget is exhausted; sources
    /// created earlier in the same call are rolled back.
    pub fn gen_sources(&self, count: usize) -> Result<Vec<SourceId>> {
        let result = self.gen_sources_impl(count);
        self.track(result)
    }

    fn gen_sources_impl(&self, count: usize) -> Result<Vec<SourceId>> {
        let engine = &self.engine;
        let mixer = engine.mixer.as_ref();
        let mut sources = engine.sources.lock().unwrap();
        let mut ids: Vec<SourceId> = Vec::with_capacity(count);
        for _ in 0..count {
            match sources.try_insert_with(|name| Source::create(SourceId(name), mixer)) {
                Ok(name) => ids.push(SourceId(name)),
                Err(err) => {
                    for id in ids {
                        if let Some(mut source) = sources.remove(id.raw()) {
                            source.release_all(mixer);
                            mixer.destroy_voice(source.voice());
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }

    pub fn delete_source(&self, source: SourceId) -> Result<()> {
        self.delete_sources(&[source])
    }

    /// Delete sources, all or none. Playback stops and every held buffer
    /// reference is released.
    pub fn delete_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.delete_sources_impl(ids);
        self.track(result)
    }

    fn delete_sources_impl(&self, ids: &[SourceId]) -> Result<()> {
        let engine = &self.engine;
        let mut sources = engine.sources.lock().unwrap();
        for id in ids {
            if !sources.contains(id.raw()) {
                return Err(no_source(*id));
            }
        }
        let mixer = engine.mixer.as_ref();
        let buffers = self.buffers.lock().unwrap();
        for id in ids {
            if let Some(mut source) = sources.remove(id.raw()) {
                let released = source.release_all(mixer);
                mixer.destroy_voice(source.voice());
                deref_all(&buffers, &released);
                debug!(source = %id, "source deleted");
            }
        }
        Ok(())
    }

    pub fn is_source(&self, source: SourceId) -> bool {
        self.engine.sources.lock().unwrap().contains(source.raw())
    }

    // --- transport ---

    /// Start playback. Resumes in place from pause; otherwise restarts from
    /// the head of the queue.
    pub fn play_source(&self, source: SourceId) -> Result<()> {
        self.play_sources(&[source])
    }

    /// Start several sources together, all or none on name validation
    pub fn play_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.with_sources(ids, |source, mixer| source.play(mixer));
        if result.is_ok() && !self.is_suspended() {
            self.engine.update_all();
        }
        self.track(result)
    }

    pub fn stop_source(&self, source: SourceId) -> Result<()> {
        self.stop_sources(&[source])
    }

    pub fn stop_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.with_sources(ids, |source, mixer| source.stop(mixer));
        self.track(result)
    }

    pub fn pause_source(&self, source: SourceId) -> Result<()> {
        self.pause_sources(&[source])
    }

    pub fn pause_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.with_sources(ids, |source, mixer| source.pause(mixer));
        self.track(result)
    }

    /// Reset the playback offset to zero. Play state is untouched; a
    /// playing source continues from the start of its queued data.
    pub fn rewind_source(&self, source: SourceId) -> Result<()> {
        self.rewind_sources(&[source])
    }

    pub fn rewind_sources(&self, ids: &[SourceId]) -> Result<()> {
        let result = self.with_sources(ids, |source, mixer| source.rewind(mixer));
        self.track(result)
    }

    // --- queueing ---

    /// Append buffers to a source's stream queue, all or none.
    ///
    /// Every buffer must hold data matching the stream's format; the first
    /// buffer ever queued establishes it. Fails with InvalidOperation on a
    /// source holding a static buffer and InvalidValue when the queue would
    /// overflow.
    pub fn queue_buffers(&self, source: SourceId, buffer_ids: &[BufferId]) -> Result<()> {
        let result = self.queue_buffers_impl(source, buffer_ids);
        self.track(result)
    }

    fn queue_buffers_impl(&self, source: SourceId, buffer_ids: &[BufferId]) -> Result<()> {
        if buffer_ids.is_empty() {
            return Ok(());
        }
        let engine = &self.engine;
        let mut sources = engine.sources.lock().unwrap();
        let src = sources.get_mut(source.raw()).ok_or_else(|| no_source(source))?;
        let buffers = self.buffers.lock().unwrap();

        if src.mode() == PlaybackMode::Static {
            return Err(Error::InvalidOperation(format!(
                "{source} holds a static buffer, queueing needs a detach first"
            )));
        }
        if src.buffers_queued() + buffer_ids.len() > QUEUE_DEPTH {
            return Err(Error::InvalidValue(format!(
                "queueing {} buffers onto {source} exceeds the {QUEUE_DEPTH} slot queue",
                buffer_ids.len()
            )));
        }

        let mut expected = src.stream_format();
        for id in buffer_ids {
            let buffer = buffers.get(id.raw()).ok_or_else(|| no_buffer(*id))?;
            let pcm = buffer.pcm().ok_or_else(|| {
                Error::InvalidOperation(format!("{id} has no data to queue"))
            })?;
            let format = StreamFormat {
                rate: pcm.rate,
                channels: pcm.format.channels(),
            };
            match expected {
                Some(session) if session != format => {
                    return Err(Error::InvalidValue(format!(
                        "{id} does not match the stream format {}Hz/{}ch",
                        session.rate, session.channels
                    )));
                }
                None => expected = Some(format),
                _ => {}
            }
        }

        for id in buffer_ids {
            let buffer = buffers.get(id.raw()).ok_or_else(|| no_buffer(*id))?;
            src.queue(engine.mixer.as_ref(), *id, buffer)?;
            buffer.ref_();
        }
        Ok(())
    }

    /// Remove up to `count` consumed buffers in queue order.
    ///
    /// Fails with InvalidValue when fewer have been consumed.
    pub fn unqueue_buffers(&self, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        let result = self.unqueue_buffers_impl(source, count);
        self.track(result)
    }

    fn unqueue_buffers_impl(&self, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        let mut sources = self.engine.sources.lock().unwrap();
        let src = sources.get_mut(source.raw()).ok_or_else(|| no_source(source))?;
        let popped = src.unqueue(count)?;
        let buffers = self.buffers.lock().unwrap();
        deref_all(&buffers, &popped);
        Ok(popped)
    }

    /// Attach a single buffer for static playback, or detach with None.
    ///
    /// Replaces whatever the source held; not legal while playing or
    /// paused.
    pub fn attach_buffer(&self, source: SourceId, buffer: Option<BufferId>) -> Result<()> {
        let result = self.attach_buffer_impl(source, buffer);
        self.track(result)
    }

    fn attach_buffer_impl(&self, source: SourceId, buffer: Option<BufferId>) -> Result<()> {
        let engine = &self.engine;
        let mut sources = engine.sources.lock().unwrap();
        let src = sources.get_mut(source.raw()).ok_or_else(|| no_source(source))?;
        let buffers = self.buffers.lock().unwrap();

        let attachment = match buffer {
            Some(id) => {
                let b = buffers.get(id.raw()).ok_or_else(|| no_buffer(id))?;
                Some((id, b))
            }
            None => None,
        };

        let released = src.attach(engine.mixer.as_ref(), attachment)?;
        deref_all(&buffers, &released);
        if let Some((_, b)) = attachment {
            b.ref_();
        }
        Ok(())
    }

    // --- source queries ---

    pub fn source_state(&self, source: SourceId) -> Result<SourceState> {
        let result = self.with_source(source, |s, _| Ok(s.state()));
        self.track(result)
    }

    /// Undetermined, Static, or Streaming
    pub fn source_type(&self, source: SourceId) -> Result<PlaybackMode> {
        let result = self.with_source(source, |s, _| Ok(s.mode()));
        self.track(result)
    }

    /// Buffers on the queue, consumed or not
    pub fn buffers_queued(&self, source: SourceId) -> Result<usize> {
        let result = self.with_source(source, |s, _| Ok(s.buffers_queued()));
        self.track(result)
    }

    /// Buffers consumed and ready to unqueue
    pub fn buffers_processed(&self, source: SourceId) -> Result<usize> {
        let result = self.with_source(source, |s, _| Ok(s.buffers_processed()));
        self.track(result)
    }

    /// The attached buffer of a static source, None otherwise
    pub fn source_buffer(&self, source: SourceId) -> Result<Option<BufferId>> {
        let result = self.with_source(source, |s, _| Ok(s.current_buffer()));
        self.track(result)
    }

    /// Snapshot of the source's tunable parameters
    pub fn source_params(&self, source: SourceId) -> Result<SourceParams> {
        let result = self.with_source(source, |s, _| Ok(*s.params()));
        self.track(result)
    }

    /// Playback position in content frames since the last restart
    pub fn source_sample_offset(&self, source: SourceId) -> Result<u64> {
        let result = self.with_source(source, |s, m| Ok(s.sample_offset(m)));
        self.track(result)
    }

    pub fn source_byte_offset(&self, source: SourceId) -> Result<u64> {
        let result = self.with_source(source, |s, m| Ok(s.byte_offset(m)));
        self.track(result)
    }

    pub fn source_sec_offset(&self, source: SourceId) -> Result<f32> {
        let result = self.with_source(source, |s, m| Ok(s.sec_offset(m)));
        self.track(result)
    }

    // --- source parameters ---

    pub fn set_source_gain(&self, source: SourceId, gain: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_gain(gain));
        self.track(result)
    }

    pub fn set_source_min_gain(&self, source: SourceId, min_gain: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_min_gain(min_gain));
        self.track(result)
    }

    pub fn set_source_max_gain(&self, source: SourceId, max_gain: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_max_gain(max_gain));
        self.track(result)
    }

    pub fn set_source_pitch(&self, source: SourceId, pitch: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_pitch(pitch));
        self.track(result)
    }

    pub fn set_source_position(&self, source: SourceId, position: Vec3) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_position(position));
        self.track(result)
    }

    pub fn set_source_velocity(&self, source: SourceId, velocity: Vec3) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_velocity(velocity));
        self.track(result)
    }

    pub fn set_source_direction(&self, source: SourceId, direction: Vec3) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_direction(direction));
        self.track(result)
    }

    /// Interpret the source position relative to the listener
    pub fn set_source_relative(&self, source: SourceId, relative: bool) -> Result<()> {
        let result = self.with_source(source, |s, _| {
            s.set_relative(relative);
            Ok(())
        });
        self.track(result)
    }

    pub fn set_source_looping(&self, source: SourceId, looping: bool) -> Result<()> {
        let result = self.with_source(source, |s, _| {
            s.set_looping(looping);
            Ok(())
        });
        self.track(result)
    }

    pub fn set_source_ref_distance(&self, source: SourceId, distance: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_ref_distance(distance));
        self.track(result)
    }

    pub fn set_source_max_distance(&self, source: SourceId, distance: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_max_distance(distance));
        self.track(result)
    }

    pub fn set_source_rolloff(&self, source: SourceId, rolloff: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_rolloff(rolloff));
        self.track(result)
    }

    pub fn set_source_cone_inner_angle(&self, source: SourceId, degrees: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_cone_inner_angle(degrees));
        self.track(result)
    }

    pub fn set_source_cone_outer_angle(&self, source: SourceId, degrees: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_cone_outer_angle(degrees));
        self.track(result)
    }

    pub fn set_source_cone_outer_gain(&self, source: SourceId, gain: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_cone_outer_gain(gain));
        self.track(result)
    }

    pub fn set_source_cone_outer_lowpass(&self, source: SourceId, amount: f32) -> Result<()> {
        let result = self.with_source(source, |s, _| s.set_cone_outer_lowpass(amount));
        self.track(result)
    }

    // --- listener & global parameters ---

    pub fn set_listener_gain(&self, gain: f32) -> Result<()> {
        let result = self.engine.panner.lock().unwrap().set_gain(gain);
        self.after_listener_change(result)
    }

    pub fn listener_gain(&self) -> f32 {
        self.engine.panner.lock().unwrap().gain()
    }

    pub fn set_listener_position(&self, position: Vec3) -> Result<()> {
        let result = self.engine.panner.lock().unwrap().set_position(position);
        self.after_listener_change(result)
    }

    pub fn listener_position(&self) -> Vec3 {
        self.engine.panner.lock().unwrap().position()
    }

    /// Fails with InvalidValue when the speed exceeds the speed of sound
    pub fn set_listener_velocity(&self, velocity: Vec3) -> Result<()> {
        let result = self.engine.panner.lock().unwrap().set_velocity(velocity);
        self.after_listener_change(result)
    }

    pub fn listener_velocity(&self) -> Vec3 {
        self.engine.panner.lock().unwrap().velocity()
    }

    /// Set the forward and up vectors; zero vectors are rejected
    pub fn set_listener_orientation(&self, forward: Vec3, up: Vec3) -> Result<()> {
        let result = self
            .engine
            .panner
            .lock()
            .unwrap()
            .set_orientation(forward, up);
        self.after_listener_change(result)
    }

    pub fn listener_orientation(&self) -> (Vec3, Vec3) {
        self.engine.panner.lock().unwrap().orientation()
    }

    pub fn set_doppler_factor(&self, factor: f32) -> Result<()> {
        let result = self.engine.panner.lock().unwrap().set_doppler_factor(factor);
        self.after_listener_change(result)
    }

    pub fn doppler_factor(&self) -> f32 {
        self.engine.panner.lock().unwrap().doppler_factor()
    }

    pub fn set_speed_of_sound(&self, speed: f32) -> Result<()> {
        let result = self.engine.panner.lock().unwrap().set_speed_of_sound(speed);
        self.after_listener_change(result)
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.engine.panner.lock().unwrap().speed_of_sound()
    }

    pub fn set_distance_model(&self, model: DistanceModel) {
        self.engine.panner.lock().unwrap().set_distance_model(model);
        self.engine.mark_all_dirty();
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.engine.panner.lock().unwrap().distance_model()
    }

    // --- internals ---

    /// Record a failure in the last-error register as it passes through
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            debug!(code = %err.code(), "operation rejected: {err}");
            *self.last_error.lock().unwrap() = err.code();
        }
        result
    }

    fn after_listener_change(&self, result: Result<()>) -> Result<()> {
        if result.is_ok() {
            self.engine.mark_all_dirty();
        }
        self.track(result)
    }

    fn with_buffer<R>(&self, id: BufferId, f: impl FnOnce(&Buffer) -> Result<R>) -> Result<R> {
        let buffers = self.buffers.lock().unwrap();
        let buffer = buffers.get(id.raw()).ok_or_else(|| no_buffer(id))?;
        f(buffer)
    }

    fn with_source<R>(
        &self,
        id: SourceId,
        f: impl FnOnce(&mut Source, &dyn Mixer) -> Result<R>,
    ) -> Result<R> {
        let engine = &self.engine;
        let mut sources = engine.sources.lock().unwrap();
        let source = sources.get_mut(id.raw()).ok_or_else(|| no_source(id))?;
        f(source, engine.mixer.as_ref())
    }

    /// Validate every name, then apply `f` to each source in order
    fn with_sources(
        &self,
        ids: &[SourceId],
        mut f: impl FnMut(&mut Source, &dyn Mixer) -> Result<()>,
    ) -> Result<()> {
        let engine = &self.engine;
        let mut sources = engine.sources.lock().unwrap();
        for id in ids {
            if !sources.contains(id.raw()) {
                return Err(no_source(*id));
            }
        }
        for id in ids {
            if let Some(source) = sources.get_mut(id.raw()) {
                f(source, engine.mixer.as_ref())?;
            }
        }
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.engine.mixer.shutdown();
    }
}

fn no_buffer(id: BufferId) -> Error {
    Error::InvalidName(format!("{id} is not a live buffer"))
}

fn no_source(id: SourceId) -> Error {
    Error::InvalidName(format!("{id} is not a live source"))
}

/// Drop one reference per handle; dead handles cannot normally appear here
fn deref_all(buffers: &NameTable<Buffer>, ids: &[BufferId]) {
    for id in ids {
        match buffers.get(id.raw()) {
            Some(buffer) => buffer.deref(),
            None => warn!(buffer = %id, "released handle is not in the table"),
        }
    }
}
