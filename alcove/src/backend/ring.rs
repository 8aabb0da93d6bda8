//! Lock-free frame ring between the mix thread and the output callback
//!
//! Single-producer single-consumer: the graph mixer's render thread pushes
//! frames, the device callback pops them without taking any locks. Underruns
//! and overruns are counted and logged at a rate that cannot spam.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::{traits::*, HeapRb};
use tracing::{trace, warn};

use crate::types::AudioFrame;

/// Log every Nth underrun/overrun
const LOG_EVERY: u64 = 1000;

/// SPSC ring of stereo frames
pub struct FrameRing {
    buffer: HeapRb<AudioFrame>,
    underruns: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
    /// Set once the producer has filled the ring at least halfway, so
    /// startup underruns can be told apart from steady-state ones
    primed: Arc<AtomicBool>,
    /// Whether the callback should currently expect frames; silence while
    /// nothing is playing is normal, not an underrun worth warning about
    output_expected: Arc<AtomicBool>,
}

impl FrameRing {
    pub fn new(capacity: usize, output_expected: Arc<AtomicBool>) -> Self {
        Self {
            buffer: HeapRb::new(capacity),
            underruns: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
            primed: Arc::new(AtomicBool::new(false)),
            output_expected,
        }
    }

    /// Split into the mix-thread half and the callback half
    pub fn split(self) -> (FrameProducer, FrameConsumer) {
        let (prod, cons) = self.buffer.split();

        let producer = FrameProducer {
            producer: prod,
            overruns: Arc::clone(&self.overruns),
            primed: Arc::clone(&self.primed),
        };

        let consumer = FrameConsumer {
            consumer: cons,
            underruns: Arc::clone(&self.underruns),
            primed: Arc::clone(&self.primed),
            output_expected: Arc::clone(&self.output_expected),
        };

        (producer, consumer)
    }
}

/// Mix-thread half
pub struct FrameProducer {
    producer: ringbuf::HeapProd<AudioFrame>,
    overruns: Arc<AtomicU64>,
    primed: Arc<AtomicBool>,
}

impl FrameProducer {
    /// Push one frame. Returns false when the ring is full.
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        match self.producer.try_push(frame) {
            Ok(_) => {
                if !self.primed.load(Ordering::Relaxed)
                    && self.occupied_len() >= self.capacity() / 2
                {
                    self.primed.store(true, Ordering::Relaxed);
                    trace!("frame ring primed to half capacity");
                }
                true
            }
            Err(_) => {
                let count = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % LOG_EVERY == 0 {
                    warn!("frame ring overrun (total: {})", count);
                }
                false
            }
        }
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }

    /// The mix thread tops the ring up whenever it drops below half full
    pub fn needs_frames(&self) -> bool {
        self.occupied_len() < self.capacity() / 2
    }
}

/// Device-callback half
pub struct FrameConsumer {
    consumer: ringbuf::HeapCons<AudioFrame>,
    underruns: Arc<AtomicU64>,
    primed: Arc<AtomicBool>,
    output_expected: Arc<AtomicBool>,
}

impl FrameConsumer {
    /// Pop one frame, or None on underrun. The caller outputs silence for
    /// missing frames.
    pub fn pop(&mut self) -> Option<AudioFrame> {
        match self.consumer.try_pop() {
            Some(frame) => Some(frame),
            None => {
                let count = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % LOG_EVERY == 0 {
                    if !self.primed.load(Ordering::Relaxed) {
                        trace!("frame ring underrun during startup (total: {})", count);
                    } else if !self.output_expected.load(Ordering::Acquire) {
                        trace!("frame ring underrun while idle (total: {})", count);
                    } else {
                        warn!(
                            "frame ring underrun during active playback (total: {})",
                            count
                        );
                    }
                }
                None
            }
        }
    }

    /// Total underruns since the ring was built, for diagnostics
    #[allow(dead_code)]
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
