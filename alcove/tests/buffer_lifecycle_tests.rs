//! Buffer lifecycle tests
//!
//! The reference-counted handoff between application and engine:
//! - Data cannot be replaced or the handle deleted while a source holds it
//! - The usage state walks Unused -> Pending -> Processed
//! - Released handles are immediately reusable and deletable
//! - Data validation (layout, rate, emptiness) through the public surface

mod helpers;

use alcove::{AudioFrame, BufferState, Error, PlaybackMode, SampleFormat};
use helpers::{constant_mono16, mono_buffer, offline_context};

fn render(ctx: &alcove::Context, frames: usize) {
    let mut block = vec![AudioFrame::zero(); frames];
    ctx.render_offline(&mut block).unwrap();
}

#[test]
fn test_set_data_rejected_while_queued() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(64, 100));
    ctx.queue_buffers(source, &[buffer]).unwrap();

    let err = ctx
        .buffer_data(buffer, SampleFormat::Mono16, &constant_mono16(64, 200), 48_000)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));

    // The original data is untouched.
    assert_eq!(ctx.buffer_size(buffer).unwrap(), 128);
}

#[test]
fn test_delete_rejected_while_attached() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(64, 100));
    ctx.attach_buffer(source, Some(buffer)).unwrap();

    let err = ctx.delete_buffer(buffer).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));

    ctx.attach_buffer(source, None).unwrap();
    ctx.delete_buffer(buffer).unwrap();
}

#[test]
fn test_state_walks_unused_pending_processed() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(64, 100));
    assert_eq!(ctx.buffer_state(buffer).unwrap(), BufferState::Unused);

    ctx.queue_buffers(source, &[buffer]).unwrap();
    assert_eq!(ctx.buffer_state(buffer).unwrap(), BufferState::Pending);

    ctx.play_source(source).unwrap();
    render(&ctx, 128);
    ctx.unqueue_buffers(source, 1).unwrap();
    assert_eq!(ctx.buffer_state(buffer).unwrap(), BufferState::Processed);

    // Fresh data returns the handle to Unused.
    ctx.buffer_data(buffer, SampleFormat::Mono16, &constant_mono16(32, 1), 48_000)
        .unwrap();
    assert_eq!(ctx.buffer_state(buffer).unwrap(), BufferState::Unused);
}

#[test]
fn test_delete_after_full_cycle() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(64, 100));

    ctx.queue_buffers(source, &[buffer]).unwrap();
    ctx.play_source(source).unwrap();
    render(&ctx, 128);
    ctx.unqueue_buffers(source, 1).unwrap();

    ctx.delete_buffer(buffer).unwrap();
    assert!(!ctx.is_buffer(buffer));
}

#[test]
fn test_data_validation() {
    let ctx = offline_context();
    let buffer = ctx.gen_buffer().unwrap();

    // 8-bit layouts are declared but not accepted.
    let err = ctx
        .buffer_data(buffer, SampleFormat::Mono8, &[1, 2, 3, 4], 48_000)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));

    let err = ctx
        .buffer_data(buffer, SampleFormat::Mono16, &[], 48_000)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));

    let err = ctx
        .buffer_data(buffer, SampleFormat::Mono16, &constant_mono16(4, 1), 0)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));

    let err = ctx
        .buffer_data(buffer, SampleFormat::Mono16, &constant_mono16(4, 1), 96_000)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));

    ctx.buffer_data(buffer, SampleFormat::Mono16, &constant_mono16(4, 1), 48_000)
        .unwrap();
}

#[test]
fn test_switch_to_static_releases_queue() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let queued: Vec<_> = (1..=2i16)
        .map(|n| mono_buffer(&ctx, &constant_mono16(64, 100 * n)))
        .collect();
    let replacement = mono_buffer(&ctx, &constant_mono16(64, 999));

    ctx.queue_buffers(source, &queued).unwrap();
    for id in &queued {
        assert_eq!(ctx.buffer_references(*id).unwrap(), 1);
    }

    ctx.attach_buffer(source, Some(replacement)).unwrap();
    assert_eq!(ctx.source_type(source).unwrap(), PlaybackMode::Static);
    assert_eq!(ctx.buffer_references(replacement).unwrap(), 1);

    // The displaced queue entries are free to delete straight away.
    for id in queued {
        assert_eq!(ctx.buffer_references(id).unwrap(), 0);
        ctx.delete_buffer(id).unwrap();
    }
}

#[test]
fn test_shared_buffer_counts_every_holder() {
    let ctx = offline_context();
    let sources = ctx.gen_sources(3).unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(64, 100));

    for source in &sources {
        ctx.queue_buffers(*source, &[buffer]).unwrap();
    }
    assert_eq!(ctx.buffer_references(buffer).unwrap(), 3);

    let err = ctx.delete_buffer(buffer).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));

    for source in &sources {
        ctx.play_source(*source).unwrap();
    }
    render(&ctx, 128);
    for source in &sources {
        ctx.unqueue_buffers(*source, 1).unwrap();
    }

    assert_eq!(ctx.buffer_references(buffer).unwrap(), 0);
    ctx.delete_buffer(buffer).unwrap();
}
