//! Voice pool and render core shared by every backend
//!
//! A [`Voice`] walks its slot ring through the per-slot next links,
//! resampling content to the output rate with linear interpolation and
//! applying the gain matrix and cone lowpass from its [`MixParams`]. The
//! [`VoicePool`] owns all voices, renders them additively into one stereo
//! block, and drives the periodic update hook off rendered-frame time.
//!
//! Slot consumption and drain notifications go through the ring's
//! [`VoiceEvents`] sink while the ring lock is held, so the policy decision
//! (mark processed or keep queued for a loop cycle) stays with the source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::backend::{MixParams, VoiceEvents, VoiceId};
use crate::buffer::PcmData;
use crate::error::{Error, Result};
use crate::queue::{SlotRing, LOOP_ENDLESS};
use crate::types::{AudioFrame, PlaybackMode, StreamFormat, VoiceState};

/// Voice budget per channel layout
pub const MAX_MONO_VOICES: usize = 64;
pub const MAX_STEREO_VOICES: usize = 64;

/// Pitch multipliers outside this range would run the cursor away
const MIN_PITCH: f32 = 0.01;
const MAX_PITCH: f32 = 8.0;

/// Playback position within the slot chain
#[derive(Debug, Clone, Copy)]
struct Cursor {
    slot: usize,
    /// Fractional frame offset into the slot's payload
    frame: f64,
}

enum Advance {
    Ready,
    Finished,
}

/// One mixer voice bound to a source's slot ring
pub(crate) struct Voice {
    format: StreamFormat,
    ring: Arc<Mutex<SlotRing>>,
    events: Arc<dyn VoiceEvents>,
    state: VoiceState,
    params: MixParams,
    cursor: Option<Cursor>,
    /// Content frames consumed since the last position reset
    played: f64,
    /// One-pole lowpass memory
    filter: AudioFrame,
}

impl Voice {
    fn new(format: StreamFormat, ring: Arc<Mutex<SlotRing>>, events: Arc<dyn VoiceEvents>) -> Self {
        Self {
            format,
            ring,
            events,
            state: VoiceState::Stopped,
            params: MixParams::default(),
            cursor: None,
            played: 0.0,
            filter: AudioFrame::zero(),
        }
    }

    /// Start or restart from the oldest queued slot
    fn play(&mut self) {
        self.cursor = None;
        self.filter = AudioFrame::zero();
        self.state = VoiceState::Playing;
    }

    /// Halt and forget the chain position. The played counter is preserved
    /// so offset queries keep reporting until the next start.
    fn stop(&mut self) {
        self.state = VoiceState::Stopped;
        self.cursor = None;
    }

    fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == VoiceState::Paused {
            self.state = VoiceState::Playing;
        }
    }

    /// Render and accumulate into `out`. Holds the ring lock for the whole
    /// block; event callbacks fire under that lock.
    fn render_into(&mut self, out: &mut [AudioFrame], out_rate: u32) {
        if self.state != VoiceState::Playing {
            return;
        }

        let gains = self.params.gains;
        let pitch = sanitize_pitch(self.params.pitch);
        let lowpass = self.params.lowpass.clamp(0.0, 1.0);
        let events = Arc::clone(&self.events);

        let ring = Arc::clone(&self.ring);
        let mut ring = ring.lock().unwrap();

        let content_rate = ring.stream().map(|s| s.rate).unwrap_or(self.format.rate);
        let step = (content_rate as f64 / out_rate as f64) * pitch as f64;

        if self.cursor.is_none() {
            match ring.first_queued() {
                Some(idx) => self.cursor = Some(Cursor { slot: idx, frame: 0.0 }),
                None => {
                    self.state = VoiceState::Stopped;
                    events.drained();
                    return;
                }
            }
        }

        for frame_out in out.iter_mut() {
            let Some(cursor) = self.cursor.as_mut() else {
                break;
            };

            match advance_to_playable(cursor, &mut ring, events.as_ref()) {
                Advance::Ready => {}
                Advance::Finished => {
                    self.cursor = None;
                    self.state = VoiceState::Stopped;
                    self.filter = AudioFrame::zero();
                    events.drained();
                    break;
                }
            }

            let Some(cursor) = self.cursor.as_mut() else {
                break;
            };
            if let Some(pcm) = ring.slot(cursor.slot).pcm() {
                let (left, right) = sample_frame(pcm, cursor.frame);
                let mut wet = AudioFrame::from_stereo(left * gains[0], right * gains[1]);
                if lowpass < 1.0 {
                    self.filter.left += lowpass * (wet.left - self.filter.left);
                    self.filter.right += lowpass * (wet.right - self.filter.right);
                    wet = self.filter;
                } else {
                    self.filter = wet;
                }
                frame_out.add(&wet);
            }

            cursor.frame += step;
            self.played += step;
        }
    }
}

/// Walk the chain until the cursor rests inside playable data, consuming
/// finished slots along the way. Returns `Finished` when the chain ends.
fn advance_to_playable(
    cursor: &mut Cursor,
    ring: &mut SlotRing,
    events: &dyn VoiceEvents,
) -> Advance {
    let mut hops = 0;
    loop {
        // Bail if the chain degenerates into empty slots.
        hops += 1;
        if hops > 64 {
            return Advance::Finished;
        }

        let slot = ring.slot(cursor.slot);
        let frames = slot.pcm().map(|p| p.frames()).unwrap_or(0);
        let loops = slot.loops();
        let next = slot.next();

        if frames > 0 && cursor.frame < frames as f64 {
            return Advance::Ready;
        }

        if loops == LOOP_ENDLESS && frames > 0 {
            // Endless replay wraps in place without a consumption event.
            cursor.frame -= frames as f64;
            continue;
        }

        match ring.mode() {
            PlaybackMode::Streaming => {
                let idx = cursor.slot;
                events.slot_consumed(ring, idx);
                match next {
                    Some(n) if ring.is_queued(n) => {
                        cursor.frame = (cursor.frame - frames as f64).max(0.0);
                        cursor.slot = n;
                    }
                    _ => return Advance::Finished,
                }
            }
            // A static slot is never marked processed; the attached buffer
            // stays queued for replay.
            PlaybackMode::Static | PlaybackMode::Undetermined => return Advance::Finished,
        }
    }
}

/// Linear-interpolated read of one frame at a fractional position
fn sample_frame(pcm: &PcmData, pos: f64) -> (f32, f32) {
    let channels = pcm.format.channels() as usize;
    let frames = pcm.frames();
    let idx = pos as usize;
    if idx >= frames {
        return (0.0, 0.0);
    }
    let frac = (pos - idx as f64) as f32;
    let next = (idx + 1).min(frames - 1);

    let read = |frame: usize, ch: usize| -> f32 {
        let byte = (frame * channels + ch) * 2;
        i16::from_le_bytes([pcm.bytes[byte], pcm.bytes[byte + 1]]) as f32 / 32768.0
    };

    if channels == 1 {
        let a = read(idx, 0);
        let b = read(next, 0);
        let v = a + (b - a) * frac;
        (v, v)
    } else {
        let la = read(idx, 0);
        let lb = read(next, 0);
        let ra = read(idx, 1);
        let rb = read(next, 1);
        (la + (lb - la) * frac, ra + (rb - ra) * frac)
    }
}

fn sanitize_pitch(pitch: f32) -> f32 {
    if pitch.is_finite() {
        pitch.clamp(MIN_PITCH, MAX_PITCH)
    } else {
        1.0
    }
}

struct PoolInner {
    voices: HashMap<u32, Voice>,
    next_id: u32,
    mono_live: usize,
    stereo_live: usize,
    /// Rendered frames not yet credited to an update tick
    frames_since_update: u64,
}

/// All voices of one mixer plus the update-tick bookkeeping
pub(crate) struct VoicePool {
    inner: Mutex<PoolInner>,
    out_rate: u32,
    refresh_frames: u32,
    update_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    suspended: AtomicBool,
    /// True while at least one voice is playing; consumed by ring logging
    /// and the graph backend's idle detection
    playing: Arc<AtomicBool>,
}

impl VoicePool {
    pub(crate) fn new(out_rate: u32, refresh_frames: u32) -> Self {
        debug!(out_rate, refresh_frames, "creating voice pool");
        Self {
            inner: Mutex::new(PoolInner {
                voices: HashMap::new(),
                next_id: 1,
                mono_live: 0,
                stereo_live: 0,
                frames_since_update: 0,
            }),
            out_rate,
            refresh_frames: refresh_frames.max(1),
            update_hook: Mutex::new(None),
            suspended: AtomicBool::new(false),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn out_rate(&self) -> u32 {
        self.out_rate
    }

    pub(crate) fn playing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.playing)
    }

    pub(crate) fn create_voice(
        &self,
        format: StreamFormat,
        ring: Arc<Mutex<SlotRing>>,
        events: Arc<dyn VoiceEvents>,
    ) -> Result<VoiceId> {
        let mut inner = self.inner.lock().unwrap();
        match format.channels {
            1 if inner.mono_live >= MAX_MONO_VOICES => {
                return Err(Error::OutOfMemory(format!(
                    "mono voice budget of {MAX_MONO_VOICES} exhausted"
                )));
            }
            2 if inner.stereo_live >= MAX_STEREO_VOICES => {
                return Err(Error::OutOfMemory(format!(
                    "stereo voice budget of {MAX_STEREO_VOICES} exhausted"
                )));
            }
            1 | 2 => {}
            other => {
                return Err(Error::InvalidValue(format!(
                    "unsupported channel count {other}"
                )));
            }
        }

        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1);
        if format.channels == 1 {
            inner.mono_live += 1;
        } else {
            inner.stereo_live += 1;
        }
        inner.voices.insert(id, Voice::new(format, ring, events));
        trace!(voice = id, channels = format.channels, "voice created");
        Ok(VoiceId(id))
    }

    /// Rebind a stopped, positionless voice to a new content format,
    /// moving it between the mono and stereo budgets as needed.
    pub(crate) fn configure_voice(&self, voice: VoiceId, format: StreamFormat) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let (old_channels, busy) = match inner.voices.get(&voice.0) {
            Some(v) => (v.format.channels, v.state != VoiceState::Stopped || v.cursor.is_some()),
            None => return Err(Error::InvalidName(format!("no voice {}", voice.0))),
        };
        if busy {
            return Err(Error::InvalidOperation(
                "cannot reconfigure a voice that is playing or paused".to_string(),
            ));
        }

        if old_channels != format.channels {
            match format.channels {
                1 if inner.mono_live >= MAX_MONO_VOICES => {
                    return Err(Error::OutOfMemory(format!(
                        "mono voice budget of {MAX_MONO_VOICES} exhausted"
                    )));
                }
                2 if inner.stereo_live >= MAX_STEREO_VOICES => {
                    return Err(Error::OutOfMemory(format!(
                        "stereo voice budget of {MAX_STEREO_VOICES} exhausted"
                    )));
                }
                1 | 2 => {}
                other => {
                    return Err(Error::InvalidValue(format!(
                        "unsupported channel count {other}"
                    )));
                }
            }
            if old_channels == 1 {
                inner.mono_live -= 1;
                inner.stereo_live += 1;
            } else {
                inner.stereo_live -= 1;
                inner.mono_live += 1;
            }
        }

        if let Some(v) = inner.voices.get_mut(&voice.0) {
            v.format = format;
            v.played = 0.0;
        }
        trace!(voice = voice.0, rate = format.rate, channels = format.channels, "voice reconfigured");
        Ok(())
    }

    pub(crate) fn destroy_voice(&self, voice: VoiceId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(v) = inner.voices.remove(&voice.0) {
            if v.format.channels == 1 {
                inner.mono_live -= 1;
            } else {
                inner.stereo_live -= 1;
            }
            trace!(voice = voice.0, "voice destroyed");
        }
    }

    pub(crate) fn voice_format(&self, voice: VoiceId) -> Option<StreamFormat> {
        self.inner.lock().unwrap().voices.get(&voice.0).map(|v| v.format)
    }

    pub(crate) fn play(&self, voice: VoiceId) -> Result<()> {
        self.with_voice(voice, |v| v.play())
    }

    pub(crate) fn stop(&self, voice: VoiceId) -> Result<()> {
        self.with_voice(voice, |v| v.stop())
    }

    pub(crate) fn pause(&self, voice: VoiceId) -> Result<()> {
        self.with_voice(voice, |v| v.pause())
    }

    pub(crate) fn resume(&self, voice: VoiceId) -> Result<()> {
        self.with_voice(voice, |v| v.resume())
    }

    fn with_voice(&self, voice: VoiceId, f: impl FnOnce(&mut Voice)) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.voices.get_mut(&voice.0) {
            Some(v) => {
                f(v);
                Ok(())
            }
            None => Err(Error::InvalidName(format!("no voice {}", voice.0))),
        }
    }

    pub(crate) fn voice_state(&self, voice: VoiceId) -> VoiceState {
        self.inner
            .lock()
            .unwrap()
            .voices
            .get(&voice.0)
            .map(|v| v.state)
            .unwrap_or(VoiceState::Stopped)
    }

    pub(crate) fn set_params(&self, voice: VoiceId, params: MixParams) {
        if let Some(v) = self.inner.lock().unwrap().voices.get_mut(&voice.0) {
            v.params = params;
        }
    }

    pub(crate) fn played_frames(&self, voice: VoiceId) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .voices
            .get(&voice.0)
            .map(|v| v.played as u64)
            .unwrap_or(0)
    }

    /// Zero the played counter and drop the chain position, so an active
    /// voice re-acquires the oldest queued slot on its next render.
    pub(crate) fn reset_position(&self, voice: VoiceId) {
        if let Some(v) = self.inner.lock().unwrap().voices.get_mut(&voice.0) {
            v.played = 0.0;
            v.cursor = None;
        }
    }

    pub(crate) fn set_update_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        *self.update_hook.lock().unwrap() = Some(hook);
    }

    pub(crate) fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    /// Render one block of output, mixing every playing voice, then fire the
    /// update hook if enough frames have elapsed since the last tick.
    ///
    /// The hook runs after the voice lock is released so it may call back
    /// into the pool.
    pub(crate) fn mix(&self, out: &mut [AudioFrame]) {
        for frame in out.iter_mut() {
            *frame = AudioFrame::zero();
        }

        let suspended = self.suspended.load(Ordering::Acquire);
        let mut any_playing = false;
        {
            let mut inner = self.inner.lock().unwrap();
            let out_rate = self.out_rate;
            for voice in inner.voices.values_mut() {
                voice.render_into(out, out_rate);
                if voice.state == VoiceState::Playing {
                    any_playing = true;
                }
            }
            if suspended {
                inner.frames_since_update = 0;
            } else {
                inner.frames_since_update += out.len() as u64;
            }
        }
        self.playing.store(any_playing, Ordering::Release);

        if !suspended {
            self.run_due_updates();
        }
    }

    /// Collapse any accumulated refresh intervals into a single update pass
    fn run_due_updates(&self) {
        let due = {
            let mut inner = self.inner.lock().unwrap();
            let ticks = inner.frames_since_update / self.refresh_frames as u64;
            inner.frames_since_update %= self.refresh_frames as u64;
            ticks > 0
        };
        if due {
            if let Some(hook) = self.update_hook.lock().unwrap().as_ref() {
                hook();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleFormat;
    use std::sync::atomic::AtomicUsize;

    /// Event sink that applies the default non-looping policy and counts
    /// callbacks.
    struct CountingEvents {
        consumed: AtomicUsize,
        drained: AtomicBool,
    }

    impl CountingEvents {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                consumed: AtomicUsize::new(0),
                drained: AtomicBool::new(false),
            })
        }
    }

    impl VoiceEvents for CountingEvents {
        fn slot_consumed(&self, ring: &mut SlotRing, slot: usize) {
            ring.mark_consumed(slot);
            self.consumed.fetch_add(1, Ordering::SeqCst);
        }

        fn drained(&self) {
            self.drained.store(true, Ordering::SeqCst);
        }
    }

    /// Event sink that keeps slots queued, as a looping source does.
    struct LoopingEvents;

    impl VoiceEvents for LoopingEvents {
        fn slot_consumed(&self, _ring: &mut SlotRing, _slot: usize) {}
        fn drained(&self) {}
    }

    fn mono_pcm(rate: u32, samples: &[i16]) -> Arc<PcmData> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Arc::new(PcmData {
            format: SampleFormat::Mono16,
            rate,
            bytes,
        })
    }

    fn constant_pcm(rate: u32, frames: usize, value: i16) -> Arc<PcmData> {
        mono_pcm(rate, &vec![value; frames])
    }

    fn mono_format(rate: u32) -> StreamFormat {
        StreamFormat { rate, channels: 1 }
    }

    fn buffer_id(n: u32) -> crate::types::BufferId {
        crate::types::BufferId(n)
    }

    #[test]
    fn test_voice_renders_queued_audio() {
        let pool = VoicePool::new(48_000, 480);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .push(buffer_id(1), constant_pcm(48_000, 32, 16_384))
            .unwrap();

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 16];
        pool.mix(&mut out);

        assert!((out[0].left - 0.5).abs() < 0.01);
        assert!((out[0].right - 0.5).abs() < 0.01);
        assert_eq!(pool.voice_state(voice), VoiceState::Playing);
    }

    #[test]
    fn test_chain_consumption_marks_and_drains() {
        let pool = VoicePool::new(48_000, 4_800);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        {
            let mut r = ring.lock().unwrap();
            r.push(buffer_id(1), constant_pcm(48_000, 8, 1000)).unwrap();
            r.push(buffer_id(2), constant_pcm(48_000, 8, 2000)).unwrap();
        }

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 32];
        pool.mix(&mut out);

        assert_eq!(events.consumed.load(Ordering::SeqCst), 2);
        assert!(events.drained.load(Ordering::SeqCst));
        assert_eq!(pool.voice_state(voice), VoiceState::Stopped);

        let mut r = ring.lock().unwrap();
        assert_eq!(r.processed_count(), 2);
        assert_eq!(r.pop(2).unwrap(), vec![buffer_id(1), buffer_id(2)]);
    }

    #[test]
    fn test_half_rate_content_is_stretched() {
        let pool = VoicePool::new(48_000, 4_800);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .push(buffer_id(1), constant_pcm(24_000, 10, 8_192))
            .unwrap();

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(24_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        // 10 content frames at half the output rate cover 20 output frames.
        let mut out = vec![AudioFrame::zero(); 19];
        pool.mix(&mut out);
        assert!(!events.drained.load(Ordering::SeqCst));
        assert!(out[18].left.abs() > 0.0);

        let mut tail = vec![AudioFrame::zero(); 4];
        pool.mix(&mut tail);
        assert!(events.drained.load(Ordering::SeqCst));
    }

    #[test]
    fn test_static_loop_wraps_without_consumption() {
        let pool = VoicePool::new(48_000, 48_000);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .attach_static(buffer_id(7), constant_pcm(48_000, 8, 4_096), true);

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 64];
        pool.mix(&mut out);

        assert_eq!(events.consumed.load(Ordering::SeqCst), 0);
        assert!(!events.drained.load(Ordering::SeqCst));
        assert_eq!(pool.voice_state(voice), VoiceState::Playing);
        assert!(out[63].left.abs() > 0.0);
    }

    #[test]
    fn test_static_end_drains_without_processed_slot() {
        let pool = VoicePool::new(48_000, 48_000);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .attach_static(buffer_id(7), constant_pcm(48_000, 8, 4_096), false);

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 32];
        pool.mix(&mut out);

        assert!(events.drained.load(Ordering::SeqCst));
        assert_eq!(events.consumed.load(Ordering::SeqCst), 0);
        // The attached slot survives for replay.
        let r = ring.lock().unwrap();
        assert_eq!(r.queued_count(), 1);
        assert_eq!(r.processed_count(), 0);
    }

    #[test]
    fn test_looping_stream_cycles_through_relinked_chain() {
        let pool = VoicePool::new(48_000, 48_000);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        {
            let mut r = ring.lock().unwrap();
            r.push(buffer_id(1), constant_pcm(48_000, 8, 1_000)).unwrap();
            r.push(buffer_id(2), constant_pcm(48_000, 8, 2_000)).unwrap();
            r.relink_for_loop(true);
        }

        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), Arc::new(LoopingEvents))
            .unwrap();
        pool.play(voice).unwrap();

        // Four times around the 16-frame cycle.
        let mut out = vec![AudioFrame::zero(); 64];
        pool.mix(&mut out);

        assert_eq!(pool.voice_state(voice), VoiceState::Playing);
        let r = ring.lock().unwrap();
        assert_eq!(r.queued_count(), 2);
        assert_eq!(r.processed_count(), 0);
    }

    #[test]
    fn test_pause_holds_position() {
        let pool = VoicePool::new(48_000, 48_000);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .push(buffer_id(1), constant_pcm(48_000, 64, 500))
            .unwrap();

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 16];
        pool.mix(&mut out);
        let at_pause = pool.played_frames(voice);
        assert_eq!(at_pause, 16);

        pool.pause(voice).unwrap();
        pool.mix(&mut out);
        assert_eq!(pool.played_frames(voice), at_pause);
        assert_eq!(pool.voice_state(voice), VoiceState::Paused);

        pool.resume(voice).unwrap();
        pool.mix(&mut out);
        assert_eq!(pool.played_frames(voice), at_pause + 16);
    }

    #[test]
    fn test_stop_keeps_played_counter_until_reset() {
        let pool = VoicePool::new(48_000, 48_000);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .push(buffer_id(1), constant_pcm(48_000, 64, 500))
            .unwrap();

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 16];
        pool.mix(&mut out);
        pool.stop(voice).unwrap();

        assert_eq!(pool.played_frames(voice), 16);
        pool.reset_position(voice);
        assert_eq!(pool.played_frames(voice), 0);
    }

    #[test]
    fn test_gain_matrix_applied() {
        let pool = VoicePool::new(48_000, 48_000);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .push(buffer_id(1), constant_pcm(48_000, 32, 16_384))
            .unwrap();

        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();
        pool.set_params(
            voice,
            MixParams {
                gains: [1.0, 0.0],
                pitch: 1.0,
                lowpass: 1.0,
            },
        );
        pool.play(voice).unwrap();

        let mut out = vec![AudioFrame::zero(); 8];
        pool.mix(&mut out);
        assert!(out[0].left > 0.4);
        assert_eq!(out[0].right, 0.0);
    }

    #[test]
    fn test_update_hook_ticks_on_refresh_boundary() {
        let pool = VoicePool::new(48_000, 64);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        pool.set_update_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut out = vec![AudioFrame::zero(); 32];
        pool.mix(&mut out);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        pool.mix(&mut out);
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        // A large block collapses the backlog into one pass.
        let mut big = vec![AudioFrame::zero(); 256];
        pool.mix(&mut big);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_suspend_withholds_update_ticks() {
        let pool = VoicePool::new(48_000, 32);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        pool.set_update_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        pool.set_suspended(true);
        let mut out = vec![AudioFrame::zero(); 128];
        pool.mix(&mut out);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        pool.set_suspended(false);
        pool.mix(&mut out);
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_mono_voice_budget_enforced() {
        let pool = VoicePool::new(48_000, 480);
        let events = CountingEvents::new();
        for _ in 0..MAX_MONO_VOICES {
            let ring = Arc::new(Mutex::new(SlotRing::new(4)));
            pool.create_voice(mono_format(48_000), ring, events.clone())
                .unwrap();
        }
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        let err = pool
            .create_voice(mono_format(48_000), ring, events.clone())
            .unwrap_err();
        assert!(matches!(err, Error::OutOfMemory(_)));

        // The stereo budget is independent.
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        pool.create_voice(StreamFormat { rate: 48_000, channels: 2 }, ring, events)
            .unwrap();
    }

    #[test]
    fn test_reconfigure_requires_idle_voice() {
        let pool = VoicePool::new(48_000, 480);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        ring.lock()
            .unwrap()
            .push(buffer_id(1), constant_pcm(48_000, 64, 100))
            .unwrap();
        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), Arc::clone(&ring), events.clone())
            .unwrap();

        pool.play(voice).unwrap();
        let err = pool
            .configure_voice(voice, StreamFormat { rate: 44_100, channels: 2 })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));

        pool.stop(voice).unwrap();
        pool.configure_voice(voice, StreamFormat { rate: 44_100, channels: 2 })
            .unwrap();
        assert_eq!(
            pool.voice_format(voice),
            Some(StreamFormat { rate: 44_100, channels: 2 })
        );
    }

    #[test]
    fn test_play_with_empty_ring_stops_immediately() {
        let pool = VoicePool::new(48_000, 480);
        let ring = Arc::new(Mutex::new(SlotRing::new(4)));
        let events = CountingEvents::new();
        let voice = pool
            .create_voice(mono_format(48_000), ring, events.clone())
            .unwrap();

        pool.play(voice).unwrap();
        let mut out = vec![AudioFrame::zero(); 8];
        pool.mix(&mut out);

        assert_eq!(pool.voice_state(voice), VoiceState::Stopped);
        assert!(events.drained.load(Ordering::SeqCst));
    }
}
