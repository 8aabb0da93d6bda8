//! Per-source slot ring for streamed playback
//!
//! The ring multiplexes application-supplied buffers into a fixed set of
//! playback slots the mixer walks via per-slot next links. Two bitmasks track
//! occupancy: `queued` marks slots holding data the mixer has not finished,
//! `processed` marks slots consumed and awaiting unqueue. A slot index is in
//! at most one mask at a time and `queued | processed` never exceeds the
//! capacity.
//!
//! Pushes advance round-robin from `last_pushed`; pops release slots in push
//! order from `head`. Occupied slots therefore form a contiguous run in ring
//! order, which is what guarantees FIFO hand-back and makes the free-slot
//! computation a single modular increment.
//!
//! The ring lives behind a mutex shared between the owning source and its
//! mixer voice. Every method here assumes the caller holds that lock.

use std::sync::Arc;

use tracing::trace;

use crate::buffer::PcmData;
use crate::error::{Error, Result};
use crate::types::{BufferId, PlaybackMode, StreamFormat};

/// Slot replay count meaning "repeat forever" (looping static attach)
pub const LOOP_ENDLESS: u32 = u32::MAX;

/// One playback slot
#[derive(Debug, Default, Clone)]
pub struct Slot {
    buffer: Option<BufferId>,
    pcm: Option<Arc<PcmData>>,
    byte_len: usize,
    loops: u32,
    next: Option<usize>,
}

impl Slot {
    /// Handle of the buffer this slot holds (kept until pop, even after the
    /// mixer consumed the data)
    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    /// Sample payload, None once the mixer consumed the slot
    pub fn pcm(&self) -> Option<&Arc<PcmData>> {
        self.pcm.as_ref()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Remaining replays of this slot before following `next`
    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Chain link to the slot the mixer plays after this one
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    fn clear(&mut self) {
        *self = Slot::default();
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }
}

/// Fixed-capacity ring of playback slots with queued/processed tracking
#[derive(Debug)]
pub struct SlotRing {
    slots: Vec<Slot>,
    queued: u32,
    processed: u32,
    /// Index of the most recently written slot; None until the first push
    last_pushed: Option<usize>,
    /// Oldest slot not yet popped; pops advance this in ring order
    head: usize,
    mode: PlaybackMode,
    /// Rate/channel constraint recorded on the first push or attach
    stream: Option<StreamFormat>,
}

impl SlotRing {
    /// Create an empty ring. Capacity is backend-determined and must fit the
    /// 32-bit occupancy masks.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= 32, "ring capacity out of range");
        Self {
            slots: vec![Slot::default(); capacity],
            queued: 0,
            processed: 0,
            last_pushed: None,
            head: 0,
            mode: PlaybackMode::Undetermined,
            stream: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Stream constraint established by the first push or attach
    pub fn stream(&self) -> Option<StreamFormat> {
        self.stream
    }

    pub fn queued_count(&self) -> usize {
        self.queued.count_ones() as usize
    }

    pub fn processed_count(&self) -> usize {
        self.processed.count_ones() as usize
    }

    pub fn slot(&self, idx: usize) -> &Slot {
        &self.slots[idx]
    }

    pub fn is_queued(&self, idx: usize) -> bool {
        self.queued & (1 << idx) != 0
    }

    pub fn is_processed(&self, idx: usize) -> bool {
        self.processed & (1 << idx) != 0
    }

    /// Index of the most recently written slot
    pub fn last_pushed(&self) -> Option<usize> {
        self.last_pushed
    }

    /// Oldest slot still holding queued data, scanning in ring order from the
    /// FIFO head. This is where playback starts and where a loop cycle closes.
    pub fn first_queued(&self) -> Option<usize> {
        let n = self.capacity();
        (0..n)
            .map(|step| (self.head + step) % n)
            .find(|idx| self.is_queued(*idx))
    }

    /// Append a buffer to the stream ring.
    ///
    /// Establishes Streaming mode on first use. Fails with InvalidOperation
    /// in Static mode, and with InvalidValue when the ring is full or the
    /// payload's rate/channels do not match the session constraint. On error
    /// nothing is mutated.
    pub fn push(&mut self, buffer: BufferId, pcm: Arc<PcmData>) -> Result<usize> {
        if self.mode == PlaybackMode::Static {
            return Err(Error::InvalidOperation(
                "cannot queue buffers on a static source".to_string(),
            ));
        }

        let occupied = (self.queued | self.processed).count_ones() as usize;
        if occupied >= self.capacity() {
            return Err(Error::InvalidValue(format!(
                "too many buffers queued, ring holds {}",
                self.capacity()
            )));
        }

        let format = StreamFormat {
            rate: pcm.rate,
            channels: pcm.format.channels(),
        };
        match self.stream {
            Some(session) if session != format => {
                return Err(Error::InvalidValue(format!(
                    "stream format {}Hz/{}ch does not match session {}Hz/{}ch",
                    format.rate, format.channels, session.rate, session.channels
                )));
            }
            Some(_) => {}
            None => self.stream = Some(format),
        }

        let next_idx = match self.last_pushed {
            Some(last) => (last + 1) % self.capacity(),
            None => 0,
        };
        debug_assert!(self.slots[next_idx].is_empty(), "push target slot occupied");

        if let Some(last) = self.last_pushed {
            self.slots[last].next = Some(next_idx);
        }
        self.slots[next_idx] = Slot {
            buffer: Some(buffer),
            byte_len: pcm.bytes.len(),
            pcm: Some(pcm),
            loops: 0,
            next: None,
        };
        self.queued |= 1 << next_idx;
        self.last_pushed = Some(next_idx);
        self.mode = PlaybackMode::Streaming;

        trace!(slot = next_idx, %buffer, "buffer queued");
        Ok(next_idx)
    }

    /// Install a single attached buffer, bypassing the mask scheme's
    /// multi-slot bookkeeping: the data occupies one dedicated slot that is
    /// never marked processed.
    ///
    /// The ring must be empty (callers drop held buffers first when switching
    /// modes).
    pub fn attach_static(&mut self, buffer: BufferId, pcm: Arc<PcmData>, looping: bool) {
        debug_assert_eq!(self.queued | self.processed, 0, "attach over held buffers");

        self.stream = Some(StreamFormat {
            rate: pcm.rate,
            channels: pcm.format.channels(),
        });
        self.slots[0] = Slot {
            buffer: Some(buffer),
            byte_len: pcm.bytes.len(),
            pcm: Some(pcm),
            loops: if looping { LOOP_ENDLESS } else { 0 },
            next: None,
        };
        self.queued = 1;
        self.processed = 0;
        self.head = 0;
        self.last_pushed = Some(0);
        self.mode = PlaybackMode::Static;
    }

    /// Update the attached slot's replay count when looping is toggled on a
    /// static source.
    pub fn set_static_looping(&mut self, looping: bool) {
        if self.mode == PlaybackMode::Static {
            self.slots[0].loops = if looping { LOOP_ENDLESS } else { 0 };
        }
    }

    /// Transition a slot the mixer has finished with.
    ///
    /// Runs in the mixer's callback context with the ring lock already held:
    /// flips queued → processed and drops the slot's payload reference so the
    /// mixer will not revisit it. The buffer handle stays for the eventual
    /// pop. No allocation happens here; dropping the payload `Arc` cannot
    /// free the samples because the owning buffer keeps its own clone.
    pub fn mark_consumed(&mut self, idx: usize) {
        let bit = 1u32 << idx;
        if self.queued & bit == 0 {
            trace!(slot = idx, "consumption for a slot no longer queued, ignoring");
            return;
        }
        self.queued &= !bit;
        self.processed |= bit;
        self.slots[idx].pcm = None;
    }

    /// Hand back up to `count` consumed buffers in push order.
    ///
    /// Fails with InvalidOperation in Static mode and with InvalidValue when
    /// fewer than `count` slots are ready at the FIFO head. The caller drops
    /// the buffer references for the returned handles.
    pub fn pop(&mut self, count: usize) -> Result<Vec<BufferId>> {
        if self.mode == PlaybackMode::Static {
            return Err(Error::InvalidOperation(
                "cannot unqueue buffers from a static source".to_string(),
            ));
        }

        let ready = self.processed_prefix_len();
        if count > ready {
            return Err(Error::InvalidValue(format!(
                "{count} buffers requested, {ready} processed"
            )));
        }

        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let idx = self.head;
            debug_assert!(self.is_processed(idx));
            let buffer = self.slots[idx].buffer.take();
            out.push(buffer.expect("processed slot without a buffer handle"));
            self.processed &= !(1 << idx);
            self.slots[idx].clear();
            if self.last_pushed == Some(idx) {
                self.last_pushed = None;
                // Ring fully drained; restart fresh so the next push lands on
                // slot 0 with a clean chain.
                self.head = 0;
            } else {
                self.head = (idx + 1) % self.capacity();
            }
        }

        trace!(popped = out.len(), "buffers unqueued");
        Ok(out)
    }

    /// Consecutive processed slots at the FIFO head
    fn processed_prefix_len(&self) -> usize {
        let n = self.capacity();
        (0..n)
            .map(|step| (self.head + step) % n)
            .take_while(|idx| self.is_processed(*idx))
            .count()
    }

    /// Clear every slot and reset the ring to its initial state.
    ///
    /// Returns the handles that were still held (queued or processed) so the
    /// caller can release exactly the references taken at push/attach time.
    pub fn drop_all(&mut self) -> Vec<BufferId> {
        let mut released = Vec::new();
        for slot in &mut self.slots {
            if let Some(buffer) = slot.buffer.take() {
                released.push(buffer);
            }
            slot.clear();
        }
        self.queued = 0;
        self.processed = 0;
        self.last_pushed = None;
        self.head = 0;
        self.mode = PlaybackMode::Undetermined;
        self.stream = None;
        released
    }

    /// Re-derive the tail slot's chain link for the current looping policy.
    ///
    /// With looping enabled the last-written slot links back to the oldest
    /// queued slot, forming a cycle the mixer follows without ever marking
    /// slots processed. With looping disabled the chain is re-terminated so
    /// playback drains naturally. Called from the periodic update pass, not
    /// from the mixer callback.
    pub fn relink_for_loop(&mut self, looping: bool) {
        if self.mode != PlaybackMode::Streaming {
            return;
        }
        let Some(last) = self.last_pushed else {
            return;
        };
        self.slots[last].next = if looping { self.first_queued() } else { None };
    }
}
