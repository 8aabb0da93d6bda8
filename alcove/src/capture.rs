//! Audio capture
//!
//! A capture device records 16-bit mono at one of two fixed rates, in
//! hardware grains of 256 samples at 16 kHz or 768 at 48 kHz. The input
//! callback pushes samples into a ring; the application polls availability
//! and drains with [`CaptureDevice::read`]. Asking for more samples than are
//! buffered is an error, not a block. When the ring fills, the oldest
//! samples are overwritten so a stalled reader resumes on fresh audio.
//!
//! [`CaptureDevice::open_offline`] builds the same object without a device
//! stream; samples arrive through [`CaptureDevice::feed`] instead, which is
//! how tests and headless callers drive it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::types::SampleFormat;

/// Supported capture rates and their hardware grain in samples
const GRAIN_16K: usize = 256;
const GRAIN_48K: usize = 768;

/// Ring capacity in grains
const RING_GRAINS: usize = 16;

/// Log every Nth overwritten sample
const LOG_EVERY: u64 = 1000;

/// Grain size in samples for a capture rate, None when unsupported
pub fn grain_for_rate(rate: u32) -> Option<usize> {
    match rate {
        16_000 => Some(GRAIN_16K),
        48_000 => Some(GRAIN_48K),
        _ => None,
    }
}

/// 16-bit mono capture device
pub struct CaptureDevice {
    rate: u32,
    grain: usize,
    capturing: AtomicBool,
    ring: Arc<Mutex<HeapRb<i16>>>,
    stream: Mutex<Option<cpal::Stream>>,
    device: Option<cpal::Device>,
    overruns: Arc<AtomicU64>,
    error_flag: Arc<AtomicBool>,
}

// The cpal stream handle is not Sync on every host API, but it is only
// touched under the mutex.
unsafe impl Sync for CaptureDevice {}
unsafe impl Send for CaptureDevice {}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("rate", &self.rate)
            .field("grain", &self.grain)
            .field("capturing", &self.capturing)
            .finish_non_exhaustive()
    }
}

impl CaptureDevice {
    /// Open a capture device bound to real input hardware.
    ///
    /// `buffer_bytes` must be exactly one grain of 16-bit samples for the
    /// chosen rate, and only [`SampleFormat::Mono16`] content is recorded.
    pub fn open(
        device_name: Option<&str>,
        rate: u32,
        format: SampleFormat,
        buffer_bytes: usize,
    ) -> Result<Self> {
        let grain = Self::validate(rate, format, buffer_bytes)?;

        let host = cpal::default_host();
        let device = if let Some(name) = device_name {
            let mut devices = host.input_devices().map_err(|e| {
                Error::InvalidOperation(format!("failed to enumerate capture devices: {e}"))
            })?;
            devices
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or_else(|| {
                    Error::InvalidValue(format!("capture device '{name}' not found"))
                })?
        } else {
            host.default_input_device().ok_or_else(|| {
                Error::InvalidOperation("no default capture device found".to_string())
            })?
        };

        info!(
            rate,
            grain,
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            "capture device opened"
        );
        Ok(Self::build(rate, grain, Some(device)))
    }

    /// Open a capture object with no hardware behind it; samples are
    /// supplied with [`CaptureDevice::feed`].
    pub fn open_offline(rate: u32, format: SampleFormat, buffer_bytes: usize) -> Result<Self> {
        let grain = Self::validate(rate, format, buffer_bytes)?;
        debug!(rate, grain, "offline capture device opened");
        Ok(Self::build(rate, grain, None))
    }

    fn validate(rate: u32, format: SampleFormat, buffer_bytes: usize) -> Result<usize> {
        let grain = grain_for_rate(rate).ok_or_else(|| {
            Error::InvalidValue(format!("unsupported capture rate {rate}"))
        })?;
        if format != SampleFormat::Mono16 {
            return Err(Error::InvalidValue(
                "capture supports 16-bit mono only".to_string(),
            ));
        }
        if buffer_bytes != grain * 2 {
            return Err(Error::InvalidValue(format!(
                "capture buffer must be exactly {} bytes at {rate}Hz",
                grain * 2
            )));
        }
        Ok(grain)
    }

    fn build(rate: u32, grain: usize, device: Option<cpal::Device>) -> Self {
        Self {
            rate,
            grain,
            capturing: AtomicBool::new(false),
            ring: Arc::new(Mutex::new(HeapRb::new(grain * RING_GRAINS))),
            stream: Mutex::new(None),
            device,
            overruns: Arc::new(AtomicU64::new(0)),
            error_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Hardware grain in samples
    pub fn grain(&self) -> usize {
        self.grain
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// Samples buffered and ready to read
    pub fn samples_available(&self) -> usize {
        self.ring.lock().unwrap().occupied_len()
    }

    /// Begin recording. With hardware attached this starts the input
    /// stream; offline it just arms [`CaptureDevice::feed`].
    pub fn start(&self) -> Result<()> {
        if self.capturing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let Some(device) = self.device.as_ref() else {
            return Ok(());
        };

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = Arc::clone(&self.ring);
        let overruns = Arc::clone(&self.overruns);
        let error_flag = Arc::clone(&self.error_flag);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push_samples(&mut ring.lock().unwrap(), data, &overruns);
                },
                move |err| {
                    error!("Capture stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::InvalidOperation(format!("failed to build capture stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::InvalidOperation(format!("failed to start capture: {e}")))?;
        *self.stream.lock().unwrap() = Some(stream);

        info!(rate = self.rate, "capture started");
        Ok(())
    }

    /// Stop recording. Buffered samples stay readable.
    pub fn stop(&self) {
        if !self.capturing.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(stream) = self.stream.lock().unwrap().take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause capture stream: {}", e);
            }
            drop(stream);
            info!("capture stopped");
        }
    }

    /// Supply samples by hand, used in place of a hardware stream
    pub fn feed(&self, samples: &[i16]) {
        push_samples(&mut self.ring.lock().unwrap(), samples, &self.overruns);
    }

    /// Drain exactly `out.len()` samples into `out`.
    ///
    /// Fails with InvalidValue when fewer samples are buffered; nothing is
    /// consumed in that case.
    pub fn read(&self, out: &mut [i16]) -> Result<()> {
        let mut ring = self.ring.lock().unwrap();
        let available = ring.occupied_len();
        if out.len() > available {
            return Err(Error::InvalidValue(format!(
                "{} samples requested, {available} available",
                out.len()
            )));
        }
        let popped = ring.pop_slice(out);
        debug_assert_eq!(popped, out.len());
        Ok(())
    }

    /// Samples overwritten before they were read, since open
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Whether the input stream has reported an error
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Push a block, overwriting the oldest samples when the ring is full
fn push_samples(ring: &mut HeapRb<i16>, samples: &[i16], overruns: &AtomicU64) {
    let mut dropped = 0u64;
    for &sample in samples {
        if ring.push_overwrite(sample).is_some() {
            dropped += 1;
        }
    }
    if dropped > 0 {
        let count = overruns.fetch_add(dropped, Ordering::Relaxed) + dropped;
        if count % LOG_EVERY < dropped {
            warn!("capture ring overrun, {} samples overwritten (total: {})", dropped, count);
        }
    }
}
