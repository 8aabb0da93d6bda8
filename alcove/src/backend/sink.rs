//! Output device sink built on cpal
//!
//! Wraps one output stream and adapts whatever sample format the device
//! negotiated (f32, i16, u16) to the engine's internal stereo f32 frames.
//! The fill callback is invoked once per device buffer with a frame slice
//! to populate, so backends render in blocks rather than per sample.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::types::AudioFrame;

/// Fill callback: populate the slice with rendered frames
pub type FillFn = dyn FnMut(&mut [AudioFrame]) + Send + 'static;

/// One cpal output stream feeding the default or a named device
pub struct DeviceSink {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Set by the stream error callback; the owner polls it
    error_flag: Arc<AtomicBool>,
}

// The cpal stream handle is not Send on every host API. The owning mixer
// keeps the sink behind a mutex and only starts and stops the stream there;
// the handle itself is never moved or touched between those calls.
unsafe impl Send for DeviceSink {}
unsafe impl Sync for DeviceSink {}

impl DeviceSink {
    /// Enumerate output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::InvalidOperation(format!("failed to enumerate devices: {e}")))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device, preferring stereo f32 at `sample_rate`.
    ///
    /// A named device that cannot be found falls back to the default device.
    /// A device that cannot run at the requested rate runs at its own; the
    /// caller reads the negotiated rate back and resamples to it.
    pub fn open(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::InvalidOperation(format!("failed to enumerate devices: {e}")))?;

            match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                Some(dev) => {
                    info!("Found requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!("Requested device '{}' not found, falling back to default", name);
                    host.default_output_device().ok_or_else(|| {
                        Error::InvalidOperation(format!(
                            "device '{name}' not found and no default device available"
                        ))
                    })?
                }
            }
        } else {
            host.default_output_device().ok_or_else(|| {
                Error::InvalidOperation("no default output device found".to_string())
            })?
        };

        let (config, sample_format) = Self::best_config(&device, sample_rate)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Pick a stereo f32 config at the requested rate if the device offers
    /// one, otherwise take the device default.
    fn best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::InvalidOperation(format!("failed to get device configs: {e}")))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::InvalidOperation(format!("failed to get default config: {e}")))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Negotiated output rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Whether the stream has reported an error since starting
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Start the stream. `fill` runs on the device thread once per buffer.
    pub fn start<F>(&mut self, fill: F) -> Result<()>
    where
        F: FnMut(&mut [AudioFrame]) + Send + 'static,
    {
        info!("Starting audio stream on '{}'", self.device_name());

        let fill: Arc<Mutex<FillFn>> = Arc::new(Mutex::new(fill));

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(fill)?,
            SampleFormat::I16 => self.build_stream_i16(fill)?,
            SampleFormat::U16 => self.build_stream_u16(fill)?,
            sample_format => {
                return Err(Error::InvalidOperation(format!(
                    "unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::InvalidOperation(format!("failed to start stream: {e}")))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream_f32(&self, fill: Arc<Mutex<FillFn>>) -> Result<Stream> {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut scratch: Vec<AudioFrame> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.clear();
                    scratch.resize(frames, AudioFrame::zero());
                    fill.lock().unwrap()(&mut scratch);

                    for (out, frame) in data.chunks_mut(channels).zip(scratch.iter()) {
                        out[0] = frame.left.clamp(-1.0, 1.0);
                        if channels > 1 {
                            out[1] = frame.right.clamp(-1.0, 1.0);
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::InvalidOperation(format!("failed to build stream: {e}")))?;

        Ok(stream)
    }

    fn build_stream_i16(&self, fill: Arc<Mutex<FillFn>>) -> Result<Stream> {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut scratch: Vec<AudioFrame> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.clear();
                    scratch.resize(frames, AudioFrame::zero());
                    fill.lock().unwrap()(&mut scratch);

                    for (out, frame) in data.chunks_mut(channels).zip(scratch.iter()) {
                        let left = frame.left.clamp(-1.0, 1.0);
                        let right = frame.right.clamp(-1.0, 1.0);
                        out[0] = (left * i16::MAX as f32) as i16;
                        if channels > 1 {
                            out[1] = (right * i16::MAX as f32) as i16;
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::InvalidOperation(format!("failed to build stream: {e}")))?;

        Ok(stream)
    }

    fn build_stream_u16(&self, fill: Arc<Mutex<FillFn>>) -> Result<Stream> {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut scratch: Vec<AudioFrame> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.clear();
                    scratch.resize(frames, AudioFrame::zero());
                    fill.lock().unwrap()(&mut scratch);

                    for (out, frame) in data.chunks_mut(channels).zip(scratch.iter()) {
                        let left = frame.left.clamp(-1.0, 1.0);
                        let right = frame.right.clamp(-1.0, 1.0);
                        // Map [-1.0, 1.0] to [0, 65535]
                        out[0] = ((left + 1.0) * 32767.5) as u16;
                        if channels > 1 {
                            out[1] = ((right + 1.0) * 32767.5) as u16;
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::InvalidOperation(format!("failed to build stream: {e}")))?;

        Ok(stream)
    }

    /// Pause and drop the stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream on stop: {}", e);
            }
            drop(stream);
        }
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.stop();
    }
}
