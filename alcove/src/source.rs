//! Playback sources
//!
//! A source owns one mixer voice and the slot ring that feeds it. Parameter
//! setters validate and store; nothing reaches the voice until the periodic
//! update pass calls [`Source::sync_voice`], which recomputes the spatial
//! mix and re-derives the chain's loop link. State transitions (play, stop,
//! pause, rewind) act on the voice immediately.
//!
//! Buffer reference counts are the context's job: methods that take or
//! release buffer references return the affected handles so the caller can
//! adjust counts in its own table.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use glam::Vec3;
use tracing::{debug, warn};

use crate::backend::{MixParams, Mixer, VoiceEvents, VoiceId};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::panner::{Panner, SpatialParams};
use crate::queue::SlotRing;
use crate::types::{BufferId, PlaybackMode, SourceId, SourceState, StreamFormat};

const STATE_INITIAL: u8 = 0;
const STATE_PLAYING: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Ring slots per source
pub(crate) const QUEUE_DEPTH: usize = 4;

/// State the mixer callback needs to reach without the source table lock
pub(crate) struct SourceShared {
    state: AtomicU8,
    looping: AtomicBool,
}

impl SourceShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(STATE_INITIAL),
            looping: AtomicBool::new(false),
        })
    }

    fn state(&self) -> SourceState {
        match self.state.load(Ordering::Acquire) {
            STATE_PLAYING => SourceState::Playing,
            STATE_PAUSED => SourceState::Paused,
            STATE_STOPPED => SourceState::Stopped,
            _ => SourceState::Initial,
        }
    }

    fn set_state(&self, state: SourceState) {
        let raw = match state {
            SourceState::Initial => STATE_INITIAL,
            SourceState::Playing => STATE_PLAYING,
            SourceState::Paused => STATE_PAUSED,
            SourceState::Stopped => STATE_STOPPED,
        };
        self.state.store(raw, Ordering::Release);
    }
}

/// Ring-walk callbacks for one source's voice.
///
/// Runs on the mixing thread with the ring lock held: a consumed slot is
/// marked processed unless the source is looping, in which case the masks
/// stay untouched and the cycle keeps replaying.
struct SourceWatcher {
    shared: Arc<SourceShared>,
}

impl VoiceEvents for SourceWatcher {
    fn slot_consumed(&self, ring: &mut SlotRing, slot: usize) {
        if !self.shared.looping.load(Ordering::Acquire) {
            ring.mark_consumed(slot);
        }
    }

    fn drained(&self) {
        self.shared.set_state(SourceState::Stopped);
    }
}

/// Tunable playback parameters, stored raw and folded into the voice's
/// [`MixParams`] by the update pass
#[derive(Debug, Clone, Copy)]
pub struct SourceParams {
    pub pitch: f32,
    pub gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub direction: Vec3,
    pub relative: bool,
    pub looping: bool,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
    pub cone_outer_lowpass: f32,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            relative: false,
            looping: false,
            ref_distance: 1.0,
            max_distance: f32::MAX,
            rolloff: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
            cone_outer_lowpass: 1.0,
        }
    }
}

pub(crate) struct Source {
    id: SourceId,
    voice: VoiceId,
    ring: Arc<Mutex<SlotRing>>,
    shared: Arc<SourceShared>,
    params: SourceParams,
    /// Parameters changed since the last update pass
    dirty: bool,
}

impl Source {
    /// Create a source and its voice. Voices start mono at the mixer rate
    /// and are rebound to the content format on first attach or queue.
    pub(crate) fn create(id: SourceId, mixer: &dyn Mixer) -> Result<Self> {
        let ring = Arc::new(Mutex::new(SlotRing::new(QUEUE_DEPTH)));
        let shared = SourceShared::new();
        let watcher = Arc::new(SourceWatcher {
            shared: Arc::clone(&shared),
        });
        let format = StreamFormat {
            rate: mixer.sample_rate(),
            channels: 1,
        };
        let voice = mixer.create_voice(format, Arc::clone(&ring), watcher)?;
        debug!(source = %id, "source created");
        Ok(Self {
            id,
            voice,
            ring,
            shared,
            params: SourceParams::default(),
            dirty: true,
        })
    }

    pub(crate) fn id(&self) -> SourceId {
        self.id
    }

    pub(crate) fn state(&self) -> SourceState {
        self.shared.state()
    }

    pub(crate) fn params(&self) -> &SourceParams {
        &self.params
    }

    /// Playback mode the ring has committed to
    pub(crate) fn mode(&self) -> PlaybackMode {
        self.ring.lock().unwrap().mode()
    }

    /// Total buffers held by the ring, consumed or not
    pub(crate) fn buffers_queued(&self) -> usize {
        let ring = self.ring.lock().unwrap();
        ring.queued_count() + ring.processed_count()
    }

    /// Consumed buffers ready to unqueue
    pub(crate) fn buffers_processed(&self) -> usize {
        self.ring.lock().unwrap().processed_count()
    }

    /// The attached buffer of a static source
    pub(crate) fn current_buffer(&self) -> Option<BufferId> {
        let ring = self.ring.lock().unwrap();
        if ring.mode() == PlaybackMode::Static {
            ring.slot(0).buffer()
        } else {
            None
        }
    }

    pub(crate) fn session_format(&self, mixer: &dyn Mixer) -> Option<StreamFormat> {
        self.ring
            .lock()
            .unwrap()
            .stream()
            .or_else(|| mixer.voice_format(self.voice))
    }

    /// Format the ring is committed to, None before the first queue
    pub(crate) fn stream_format(&self) -> Option<StreamFormat> {
        self.ring.lock().unwrap().stream()
    }

    /// Content frames played since the position counter was last reset.
    /// The counter survives a natural drain and is zeroed by stop, rewind,
    /// and the next restart.
    pub(crate) fn sample_offset(&self, mixer: &dyn Mixer) -> u64 {
        mixer.played_frames(self.voice)
    }

    pub(crate) fn byte_offset(&self, mixer: &dyn Mixer) -> u64 {
        let frame_bytes = self
            .session_format(mixer)
            .map(|f| f.frame_bytes() as u64)
            .unwrap_or(2);
        self.sample_offset(mixer) * frame_bytes
    }

    pub(crate) fn sec_offset(&self, mixer: &dyn Mixer) -> f32 {
        let rate = self
            .session_format(mixer)
            .map(|f| f.rate)
            .unwrap_or_else(|| mixer.sample_rate());
        if rate == 0 {
            return 0.0;
        }
        self.sample_offset(mixer) as f32 / rate as f32
    }

    // --- state transitions ---

    /// Start playback from the oldest queued data.
    ///
    /// Resuming from pause keeps the position; any other start zeroes the
    /// offset counter first. Playing with nothing queued stops immediately.
    pub(crate) fn play(&mut self, mixer: &dyn Mixer) -> Result<()> {
        if self.ring.lock().unwrap().queued_count() == 0 {
            self.shared.set_state(SourceState::Stopped);
            return Ok(());
        }

        match self.state() {
            SourceState::Paused => {
                mixer.resume(self.voice)?;
            }
            _ => {
                mixer.reset_position(self.voice);
                mixer.play(self.voice)?;
            }
        }
        self.shared.set_state(SourceState::Playing);
        Ok(())
    }

    /// Halt playback and zero the offset counters. A naturally drained
    /// stream, by contrast, keeps its final offset until the next start.
    pub(crate) fn stop(&mut self, mixer: &dyn Mixer) -> Result<()> {
        if self.state() == SourceState::Initial {
            return Ok(());
        }
        mixer.stop(self.voice)?;
        mixer.reset_position(self.voice);
        self.shared.set_state(SourceState::Stopped);
        Ok(())
    }

    pub(crate) fn pause(&mut self, mixer: &dyn Mixer) -> Result<()> {
        if self.state() != SourceState::Playing {
            return Ok(());
        }
        mixer.pause(self.voice)?;
        self.shared.set_state(SourceState::Paused);
        Ok(())
    }

    /// Zero the offset counter without touching the play state. A playing
    /// voice restarts from the oldest queued data on its next rendered
    /// frame.
    pub(crate) fn rewind(&mut self, mixer: &dyn Mixer) -> Result<()> {
        mixer.reset_position(self.voice);
        Ok(())
    }

    // --- buffer plumbing ---

    /// Append a buffer to the stream queue. The caller adds the buffer
    /// reference after this returns Ok.
    pub(crate) fn queue(
        &mut self,
        mixer: &dyn Mixer,
        buffer_id: BufferId,
        buffer: &Buffer,
    ) -> Result<()> {
        let pcm = buffer.pcm().ok_or_else(|| {
            Error::InvalidOperation(format!("{buffer_id} has no data to queue"))
        })?;
        let format = StreamFormat {
            rate: pcm.rate,
            channels: pcm.format.channels(),
        };

        // First queued buffer decides the session format; rebind the voice
        // before the ring commits to it.
        let fresh = self.ring.lock().unwrap().stream().is_none();
        if fresh && mixer.voice_format(self.voice) != Some(format) {
            mixer.configure_voice(self.voice, format)?;
        }

        self.ring.lock().unwrap().push(buffer_id, pcm)?;
        self.dirty = true;
        Ok(())
    }

    /// Remove up to `count` consumed buffers in queue order, returning the
    /// handles whose references the caller releases.
    pub(crate) fn unqueue(&mut self, count: usize) -> Result<Vec<BufferId>> {
        let popped = self.ring.lock().unwrap().pop(count)?;
        self.dirty = true;
        Ok(popped)
    }

    /// Attach a single buffer (or detach with None), replacing whatever the
    /// ring held. Returns the handles that were released; the caller drops
    /// their references, then adds one for the newly attached buffer.
    pub(crate) fn attach(
        &mut self,
        mixer: &dyn Mixer,
        attachment: Option<(BufferId, &Buffer)>,
    ) -> Result<Vec<BufferId>> {
        match self.state() {
            SourceState::Playing | SourceState::Paused => {
                return Err(Error::InvalidOperation(
                    "cannot change the attached buffer while playing or paused".to_string(),
                ));
            }
            _ => {}
        }

        let pcm = match attachment {
            Some((buffer_id, buffer)) => {
                let pcm = buffer.pcm().ok_or_else(|| {
                    Error::InvalidOperation(format!("{buffer_id} has no data to attach"))
                })?;
                Some((buffer_id, pcm))
            }
            None => None,
        };

        // Rebind the idle voice before any teardown so a failure leaves the
        // ring and its references untouched.
        if let Some((_, pcm)) = &pcm {
            let format = StreamFormat {
                rate: pcm.rate,
                channels: pcm.format.channels(),
            };
            if mixer.voice_format(self.voice) != Some(format) {
                mixer.configure_voice(self.voice, format)?;
            }
        }

        let released = self.ring.lock().unwrap().drop_all();

        if let Some((buffer_id, pcm)) = pcm {
            self.ring
                .lock()
                .unwrap()
                .attach_static(buffer_id, pcm, self.params.looping);
            debug!(source = %self.id, buffer = %buffer_id, "buffer attached");
        }

        self.dirty = true;
        Ok(released)
    }

    /// Release every held buffer, for source deletion
    pub(crate) fn release_all(&mut self, mixer: &dyn Mixer) -> Vec<BufferId> {
        if mixer.stop(self.voice).is_err() {
            warn!(source = %self.id, "voice already gone during release");
        }
        self.ring.lock().unwrap().drop_all()
    }

    pub(crate) fn voice(&self) -> VoiceId {
        self.voice
    }

    // --- parameter setters ---

    /// Set the source gain, stored clamped into the min/max gain window
    pub(crate) fn set_gain(&mut self, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(Error::InvalidValue(format!("invalid gain {gain}")));
        }
        self.params.gain = gain.clamp(self.params.min_gain, self.params.max_gain);
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_min_gain(&mut self, min_gain: f32) -> Result<()> {
        if !min_gain.is_finite() || min_gain < 0.0 || min_gain > self.params.max_gain {
            return Err(Error::InvalidValue(format!("invalid min gain {min_gain}")));
        }
        self.params.min_gain = min_gain;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_max_gain(&mut self, max_gain: f32) -> Result<()> {
        if !max_gain.is_finite() || max_gain > 1.0 || max_gain < self.params.min_gain {
            return Err(Error::InvalidValue(format!("invalid max gain {max_gain}")));
        }
        self.params.max_gain = max_gain;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return Err(Error::InvalidValue(format!("invalid pitch {pitch}")));
        }
        self.params.pitch = pitch;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_position(&mut self, position: Vec3) -> Result<()> {
        if !position.is_finite() {
            return Err(Error::InvalidValue("non-finite position".to_string()));
        }
        self.params.position = position;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_velocity(&mut self, velocity: Vec3) -> Result<()> {
        if !velocity.is_finite() {
            return Err(Error::InvalidValue("non-finite velocity".to_string()));
        }
        self.params.velocity = velocity;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_direction(&mut self, direction: Vec3) -> Result<()> {
        if !direction.is_finite() {
            return Err(Error::InvalidValue("non-finite direction".to_string()));
        }
        self.params.direction = direction;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_relative(&mut self, relative: bool) {
        self.params.relative = relative;
        self.dirty = true;
    }

    /// Toggle looping. A static ring updates its replay count right away;
    /// a streaming chain is relinked by the next update pass.
    pub(crate) fn set_looping(&mut self, looping: bool) {
        self.params.looping = looping;
        self.shared.looping.store(looping, Ordering::Release);
        self.ring.lock().unwrap().set_static_looping(looping);
        self.dirty = true;
    }

    pub(crate) fn set_ref_distance(&mut self, distance: f32) -> Result<()> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(Error::InvalidValue(format!(
                "invalid reference distance {distance}"
            )));
        }
        self.params.ref_distance = distance;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_max_distance(&mut self, distance: f32) -> Result<()> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(Error::InvalidValue(format!("invalid max distance {distance}")));
        }
        self.params.max_distance = distance;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_rolloff(&mut self, rolloff: f32) -> Result<()> {
        if !rolloff.is_finite() || rolloff < 0.0 {
            return Err(Error::InvalidValue(format!("invalid rolloff {rolloff}")));
        }
        self.params.rolloff = rolloff;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_cone_inner_angle(&mut self, degrees: f32) -> Result<()> {
        if !degrees.is_finite() || !(0.0..=360.0).contains(&degrees) {
            return Err(Error::InvalidValue(format!("invalid cone angle {degrees}")));
        }
        self.params.cone_inner_angle = degrees;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_cone_outer_angle(&mut self, degrees: f32) -> Result<()> {
        if !degrees.is_finite() || !(0.0..=360.0).contains(&degrees) {
            return Err(Error::InvalidValue(format!("invalid cone angle {degrees}")));
        }
        self.params.cone_outer_angle = degrees;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_cone_outer_gain(&mut self, gain: f32) -> Result<()> {
        if !gain.is_finite() || !(0.0..=1.0).contains(&gain) {
            return Err(Error::InvalidValue(format!("invalid cone outer gain {gain}")));
        }
        self.params.cone_outer_gain = gain;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_cone_outer_lowpass(&mut self, amount: f32) -> Result<()> {
        if !amount.is_finite() || !(0.0..=1.0).contains(&amount) {
            return Err(Error::InvalidValue(format!(
                "invalid cone outer lowpass {amount}"
            )));
        }
        self.params.cone_outer_lowpass = amount;
        self.dirty = true;
        Ok(())
    }

    /// Force a recompute on the next update pass, used when listener or
    /// global settings change
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn spatial(&self) -> SpatialParams {
        SpatialParams {
            position: self.params.position,
            velocity: self.params.velocity,
            direction: self.params.direction,
            listener_relative: self.params.relative,
            gain: self.params.gain,
            min_gain: self.params.min_gain,
            max_gain: self.params.max_gain,
            ref_distance: self.params.ref_distance,
            max_distance: self.params.max_distance,
            rolloff: self.params.rolloff,
            cone_inner_angle: self.params.cone_inner_angle,
            cone_outer_angle: self.params.cone_outer_angle,
            cone_outer_gain: self.params.cone_outer_gain,
            cone_outer_lowpass: self.params.cone_outer_lowpass,
        }
    }

    /// One update-pass step: re-derive the loop link and, if anything
    /// changed, push fresh mix settings to the voice.
    pub(crate) fn sync_voice(&mut self, mixer: &dyn Mixer, panner: &Panner) {
        self.ring
            .lock()
            .unwrap()
            .relink_for_loop(self.params.looping);

        if !self.dirty {
            return;
        }
        self.dirty = false;

        let channels = self.session_format(mixer).map(|f| f.channels).unwrap_or(1);
        match panner.compute_mix(&self.spatial(), channels) {
            Ok(mix) => {
                let doppler = if mix.doppler == 0.0 { 1.0 } else { mix.doppler };
                mixer.set_params(
                    self.voice,
                    MixParams {
                        gains: mix.gains,
                        pitch: self.params.pitch * doppler,
                        lowpass: mix.lowpass,
                    },
                );
            }
            Err(e) => {
                warn!(source = %self.id, "mix computation failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Mixer, OfflineMixer};
    use crate::types::{AudioFrame, SampleFormat};

    fn offline() -> Arc<OfflineMixer> {
        OfflineMixer::start(48_000, 60)
    }

    fn data_buffer(frames: usize, rate: u32) -> Buffer {
        let buffer = Buffer::new(false).unwrap();
        let bytes = vec![0x40u8; frames * 2];
        buffer.set_data(SampleFormat::Mono16, &bytes, rate).unwrap();
        buffer
    }

    fn bid(n: u32) -> BufferId {
        BufferId(n)
    }

    #[test]
    fn test_source_starts_initial() {
        let mixer = offline();
        let source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        assert_eq!(source.state(), SourceState::Initial);
        assert_eq!(source.mode(), PlaybackMode::Undetermined);
        assert_eq!(source.buffers_queued(), 0);
    }

    #[test]
    fn test_play_empty_queue_stops_immediately() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        source.play(mixer.as_ref()).unwrap();
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[test]
    fn test_queue_establishes_streaming_mode() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let buffer = data_buffer(64, 22_050);

        source.queue(mixer.as_ref(), bid(1), &buffer).unwrap();
        assert_eq!(source.mode(), PlaybackMode::Streaming);

        // The voice follows the content format of the first buffer.
        assert_eq!(
            mixer.voice_format(source.voice()),
            Some(StreamFormat { rate: 22_050, channels: 1 })
        );
    }

    #[test]
    fn test_queue_requires_buffer_data() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let empty = Buffer::new(false).unwrap();

        let err = source.queue(mixer.as_ref(), bid(1), &empty).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_attach_rejected_while_playing() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let buffer = data_buffer(4_096, 48_000);

        source.attach(mixer.as_ref(), Some((bid(1), &buffer))).unwrap();
        source.play(mixer.as_ref()).unwrap();
        assert_eq!(source.state(), SourceState::Playing);

        let other = data_buffer(16, 48_000);
        let err = source
            .attach(mixer.as_ref(), Some((bid(2), &other)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_attach_over_queue_releases_held_buffers() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(16, 48_000);
        let b = data_buffer(16, 48_000);

        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.queue(mixer.as_ref(), bid(2), &b).unwrap();

        let c = data_buffer(16, 48_000);
        let released = source.attach(mixer.as_ref(), Some((bid(3), &c))).unwrap();
        assert_eq!(released, vec![bid(1), bid(2)]);
        assert_eq!(source.mode(), PlaybackMode::Static);
        assert_eq!(source.current_buffer(), Some(bid(3)));
    }

    #[test]
    fn test_detach_resets_mode() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let buffer = data_buffer(16, 48_000);

        source.attach(mixer.as_ref(), Some((bid(1), &buffer))).unwrap();
        let released = source.attach(mixer.as_ref(), None).unwrap();
        assert_eq!(released, vec![bid(1)]);
        assert_eq!(source.mode(), PlaybackMode::Undetermined);
        assert_eq!(source.current_buffer(), None);
    }

    #[test]
    fn test_gain_stored_clamped_into_window() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();

        source.set_max_gain(0.5).unwrap();
        source.set_gain(0.9).unwrap();
        assert!((source.params().gain - 0.5).abs() < 1e-6);

        source.set_min_gain(0.2).unwrap();
        source.set_gain(0.1).unwrap();
        assert!((source.params().gain - 0.2).abs() < 1e-6);

        let err = source.set_gain(-1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_pitch_rejects_nonpositive() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        assert!(source.set_pitch(0.0).is_err());
        assert!(source.set_pitch(-1.0).is_err());
        assert!(source.set_pitch(f32::NAN).is_err());
        source.set_pitch(2.0).unwrap();
    }

    #[test]
    fn test_playback_consumes_and_unqueues() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(32, 48_000);
        let b = data_buffer(32, 48_000);

        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.queue(mixer.as_ref(), bid(2), &b).unwrap();
        source.play(mixer.as_ref()).unwrap();

        let mut out = vec![AudioFrame::zero(); 128];
        mixer.render_offline(&mut out).unwrap();

        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(source.buffers_processed(), 2);
        assert_eq!(source.unqueue(2).unwrap(), vec![bid(1), bid(2)]);
        assert_eq!(source.buffers_queued(), 0);
    }

    #[test]
    fn test_unqueue_more_than_processed_fails() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(4_096, 48_000);
        source.queue(mixer.as_ref(), bid(1), &a).unwrap();

        let err = source.unqueue(1).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_stop_zeroes_offset_but_drain_keeps_it() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(64, 48_000);
        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.play(mixer.as_ref()).unwrap();

        // Running dry keeps the final offset around for late queries.
        let mut out = vec![AudioFrame::zero(); 100];
        mixer.render_offline(&mut out).unwrap();
        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(source.sample_offset(mixer.as_ref()), 64);
        assert_eq!(source.byte_offset(mixer.as_ref()), 128);

        // An explicit stop zeroes it.
        source.stop(mixer.as_ref()).unwrap();
        assert_eq!(source.sample_offset(mixer.as_ref()), 0);
        assert_eq!(source.byte_offset(mixer.as_ref()), 0);
    }

    #[test]
    fn test_pause_resume_keeps_offset() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(4_096, 48_000);
        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.play(mixer.as_ref()).unwrap();

        let mut out = vec![AudioFrame::zero(); 50];
        mixer.render_offline(&mut out).unwrap();
        source.pause(mixer.as_ref()).unwrap();
        assert_eq!(source.state(), SourceState::Paused);

        source.play(mixer.as_ref()).unwrap();
        mixer.render_offline(&mut out).unwrap();
        assert_eq!(source.sample_offset(mixer.as_ref()), 100);
    }

    #[test]
    fn test_rewind_zeroes_offset_and_keeps_state() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(4_096, 48_000);
        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.play(mixer.as_ref()).unwrap();

        let mut out = vec![AudioFrame::zero(); 50];
        mixer.render_offline(&mut out).unwrap();
        assert_eq!(source.sample_offset(mixer.as_ref()), 50);

        source.rewind(mixer.as_ref()).unwrap();
        assert_eq!(source.state(), SourceState::Playing);
        assert_eq!(source.sample_offset(mixer.as_ref()), 0);

        // Playback restarts from the front of the queued data.
        mixer.render_offline(&mut out).unwrap();
        assert_eq!(source.sample_offset(mixer.as_ref()), 50);
    }

    #[test]
    fn test_sync_voice_applies_spatial_mix() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(256, 48_000);
        source.queue(mixer.as_ref(), bid(1), &a).unwrap();

        // Hard right, no distance rolloff.
        source.set_position(Vec3::new(1.0, 0.0, 0.0)).unwrap();
        source.set_relative(true);
        source.set_rolloff(0.0).unwrap();

        let panner = Panner::new();
        source.sync_voice(mixer.as_ref(), &panner);

        source.play(mixer.as_ref()).unwrap();
        let mut out = vec![AudioFrame::zero(); 32];
        mixer.render_offline(&mut out).unwrap();

        assert!(out[0].right.abs() > 0.1);
        assert!(out[0].left.abs() < 1e-6);
    }

    #[test]
    fn test_looping_stream_reports_nothing_processed() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(16, 48_000);
        let b = data_buffer(16, 48_000);

        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.queue(mixer.as_ref(), bid(2), &b).unwrap();
        source.set_looping(true);

        let panner = Panner::new();
        source.sync_voice(mixer.as_ref(), &panner);
        source.play(mixer.as_ref()).unwrap();

        // Several times around the 32-frame cycle.
        let mut out = vec![AudioFrame::zero(); 160];
        mixer.render_offline(&mut out).unwrap();

        assert_eq!(source.state(), SourceState::Playing);
        assert_eq!(source.buffers_processed(), 0);
        assert_eq!(source.buffers_queued(), 2);
        let err = source.unqueue(1).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_loop_disable_lets_stream_drain() {
        let mixer = offline();
        let mut source = Source::create(SourceId(1), mixer.as_ref()).unwrap();
        let a = data_buffer(16, 48_000);
        source.queue(mixer.as_ref(), bid(1), &a).unwrap();
        source.set_looping(true);

        let panner = Panner::new();
        source.sync_voice(mixer.as_ref(), &panner);
        source.play(mixer.as_ref()).unwrap();

        let mut out = vec![AudioFrame::zero(); 64];
        mixer.render_offline(&mut out).unwrap();
        assert_eq!(source.state(), SourceState::Playing);

        source.set_looping(false);
        source.sync_voice(mixer.as_ref(), &panner);
        mixer.render_offline(&mut out).unwrap();

        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(source.buffers_processed(), 1);
    }
}
