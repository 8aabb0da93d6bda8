//! Reference-counted PCM buffer objects
//!
//! A `Buffer` owns sample data filled by the application and lent to sources
//! while queued. The reference count is atomic because `ref_count` increments
//! happen on the application thread (enqueue) while decrements can happen
//! from unqueue calls racing the mixer. State tracks whether the data may be
//! replaced or the handle deleted.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{BufferState, SampleFormat, MAX_FREQUENCY};

/// Default storage block size reserved at creation when the backend asks for
/// eager allocation, so an out-of-memory condition surfaces at generate time.
pub const DEFAULT_STORAGE_BYTES: usize = 256;

const STATE_UNUSED: u8 = 0;
const STATE_PENDING: u8 = 1;
const STATE_PROCESSED: u8 = 2;

/// Immutable PCM payload shared between a buffer and the ring slots that
/// currently play it. Slots hold `Arc` clones; dropping a slot's clone never
/// frees the samples while the owning buffer is alive.
#[derive(Debug)]
pub struct PcmData {
    pub format: SampleFormat,
    pub rate: u32,
    pub bytes: Vec<u8>,
}

impl PcmData {
    /// Whole frames contained in the payload
    pub fn frames(&self) -> usize {
        self.bytes.len() / self.format.frame_bytes()
    }
}

#[derive(Debug, Default)]
struct BufferInner {
    pcm: Option<Arc<PcmData>>,
    /// Preallocated default block, reused as the destination of the next
    /// `set_data` to keep the eager-allocation backend's guarantee cheap.
    spare: Option<Vec<u8>>,
}

/// Application-owned audio data object
#[derive(Debug)]
pub struct Buffer {
    inner: Mutex<BufferInner>,
    state: AtomicU8,
    refs: AtomicU32,
}

impl Buffer {
    /// Create an empty buffer in the Unused state.
    ///
    /// With `eager_storage` a default block is allocated up front and the
    /// call fails with OutOfMemory if that allocation is refused.
    pub fn new(eager_storage: bool) -> Result<Self> {
        let spare = if eager_storage {
            let mut block: Vec<u8> = Vec::new();
            block
                .try_reserve_exact(DEFAULT_STORAGE_BYTES)
                .map_err(|_| Error::OutOfMemory("default buffer storage".to_string()))?;
            Some(block)
        } else {
            None
        };

        Ok(Self {
            inner: Mutex::new(BufferInner { pcm: None, spare }),
            state: AtomicU8::new(STATE_UNUSED),
            refs: AtomicU32::new(0),
        })
    }

    /// Replace the buffer's sample data.
    ///
    /// Fails with InvalidOperation while any source still references the
    /// buffer, and with InvalidValue for empty data, an unsupported sample
    /// layout, or a rate outside (0, 48000].
    pub fn set_data(&self, format: SampleFormat, data: &[u8], rate: u32) -> Result<()> {
        if self.refs.load(Ordering::Acquire) != 0 {
            return Err(Error::InvalidOperation(
                "buffer data cannot be replaced while queued on a source".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(Error::InvalidValue("empty buffer data".to_string()));
        }
        if !format.is_supported() {
            return Err(Error::InvalidValue(format!(
                "unsupported sample format {format:?}, 16-bit PCM required"
            )));
        }
        if rate == 0 || rate > MAX_FREQUENCY {
            return Err(Error::InvalidValue(format!(
                "sample rate {rate} outside (0, {MAX_FREQUENCY}]"
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        let mut bytes = inner.spare.take().unwrap_or_default();
        bytes.clear();
        bytes
            .try_reserve_exact(data.len())
            .map_err(|_| Error::OutOfMemory(format!("{} bytes of sample storage", data.len())))?;
        bytes.extend_from_slice(data);

        inner.pcm = Some(Arc::new(PcmData {
            format,
            rate,
            bytes,
        }));
        self.state.store(STATE_UNUSED, Ordering::Release);

        debug!(
            bytes = data.len(),
            rate,
            channels = format.channels(),
            "buffer data set"
        );
        Ok(())
    }

    /// Take a reference on behalf of a source.
    ///
    /// Called on the application thread when the buffer is queued or
    /// attached.
    pub fn ref_(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
        self.state.store(STATE_PENDING, Ordering::Release);
    }

    /// Drop one reference.
    ///
    /// When the count returns to zero the state becomes Processed, marking
    /// "was in use, no longer is" as distinct from "never used". Safe to call
    /// concurrently with `ref_` from another thread.
    pub fn deref(&self) {
        let prev = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match prev {
            Ok(1) => self.state.store(STATE_PROCESSED, Ordering::Release),
            Ok(_) => {}
            Err(_) => warn!("buffer dereferenced below zero, ignoring"),
        }
    }

    /// Whether the handle may be deleted (no source holds a reference)
    pub fn is_deletable(&self) -> bool {
        self.refs.load(Ordering::Acquire) == 0
    }

    pub fn state(&self) -> BufferState {
        match self.state.load(Ordering::Acquire) {
            STATE_PENDING => BufferState::Pending,
            STATE_PROCESSED => BufferState::Processed,
            _ => BufferState::Unused,
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Current payload, if data has been set
    pub fn pcm(&self) -> Option<Arc<PcmData>> {
        self.inner.lock().unwrap().pcm.clone()
    }

    /// Sample rate of the stored data, 0 before any `set_data`
    pub fn frequency(&self) -> u32 {
        self.inner.lock().unwrap().pcm.as_ref().map_or(0, |p| p.rate)
    }

    /// Bits per sample of the stored data, 0 before any `set_data`
    pub fn bits(&self) -> u16 {
        self.inner
            .lock()
            .unwrap()
            .pcm
            .as_ref()
            .map_or(0, |p| p.format.bits())
    }

    /// Channel count of the stored data, 0 before any `set_data`
    pub fn channels(&self) -> u16 {
        self.inner
            .lock()
            .unwrap()
            .pcm
            .as_ref()
            .map_or(0, |p| p.format.channels())
    }

    /// Byte size of the stored data, 0 before any `set_data`
    pub fn size(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .pcm
            .as_ref()
            .map_or(0, |p| p.bytes.len())
    }
}
