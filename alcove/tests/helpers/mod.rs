//! Test helper modules for alcove integration tests
//!
//! Provides reusable test infrastructure:
//! - Offline context builders (no audio hardware required)
//! - Deterministic PCM generators for known-signal assertions

pub mod pcm;

#[allow(unused_imports)]
pub use pcm::{constant_mono16, constant_stereo16, sine_mono16};

use alcove::{BackendKind, BufferId, Context, ContextConfig, SampleFormat};

/// Offline context at 48 kHz with a 60 Hz update cadence
pub fn offline_context() -> Context {
    Context::open(ContextConfig {
        backend: BackendKind::Offline,
        ..ContextConfig::default()
    })
    .expect("offline context should always open")
}

/// Generate a buffer and fill it with mono 16-bit data at 48 kHz
pub fn mono_buffer(ctx: &Context, bytes: &[u8]) -> BufferId {
    let id = ctx.gen_buffer().expect("buffer generation failed");
    ctx.buffer_data(id, SampleFormat::Mono16, bytes, 48_000)
        .expect("buffer data rejected");
    id
}
