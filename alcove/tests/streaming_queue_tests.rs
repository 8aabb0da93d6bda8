//! Streaming queue integrity tests
//!
//! End-to-end checks of the buffer queue through the public surface:
//! - Queued/processed counts track pushes and consumption
//! - Reference counts match unpopped holdings
//! - FIFO order is preserved through a full play cycle
//! - Loop relinking keeps slots unprocessed until looping is disabled
//! - The steady-state refill pattern (unqueue, refill, requeue) works while
//!   playback continues

mod helpers;

use alcove::{AudioFrame, BufferState, Error, SourceState};
use helpers::{constant_mono16, mono_buffer, offline_context};

fn render(ctx: &alcove::Context, frames: usize) {
    let mut block = vec![AudioFrame::zero(); frames];
    ctx.render_offline(&mut block).unwrap();
}

#[test]
fn test_counts_follow_pushes_and_consumption() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let ids: Vec<_> = (1..=3i16)
        .map(|n| mono_buffer(&ctx, &constant_mono16(64, 100 * n)))
        .collect();

    ctx.queue_buffers(source, &ids).unwrap();
    assert_eq!(ctx.buffers_queued(source).unwrap(), 3);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 0);

    ctx.play_source(source).unwrap();
    render(&ctx, 256);

    // Fully drained: everything queued is now processed but not yet popped.
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Stopped);
    assert_eq!(ctx.buffers_queued(source).unwrap(), 3);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 3);

    ctx.unqueue_buffers(source, 2).unwrap();
    assert_eq!(ctx.buffers_queued(source).unwrap(), 1);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 1);

    ctx.unqueue_buffers(source, 1).unwrap();
    assert_eq!(ctx.buffers_queued(source).unwrap(), 0);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 0);
}

#[test]
fn test_refcounts_match_unpopped_holdings() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(64, 500));

    assert_eq!(ctx.buffer_references(buffer).unwrap(), 0);
    ctx.queue_buffers(source, &[buffer]).unwrap();
    assert_eq!(ctx.buffer_references(buffer).unwrap(), 1);

    ctx.play_source(source).unwrap();
    render(&ctx, 128);

    // Consumption alone does not release the handle; popping does.
    assert_eq!(ctx.buffer_references(buffer).unwrap(), 1);
    ctx.unqueue_buffers(source, 1).unwrap();
    assert_eq!(ctx.buffer_references(buffer).unwrap(), 0);
}

#[test]
fn test_single_buffer_stream_cycle() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(100, 1000));

    ctx.queue_buffers(source, &[buffer]).unwrap();
    ctx.play_source(source).unwrap();
    render(&ctx, 128);

    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Stopped);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 1);

    let popped = ctx.unqueue_buffers(source, 1).unwrap();
    assert_eq!(popped, vec![buffer]);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 0);
    assert_eq!(ctx.buffer_state(buffer).unwrap(), BufferState::Processed);
}

#[test]
fn test_fifo_order_preserved() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let ids: Vec<_> = (1..=4i16)
        .map(|n| mono_buffer(&ctx, &constant_mono16(32, n)))
        .collect();

    ctx.queue_buffers(source, &ids).unwrap();
    ctx.play_source(source).unwrap();
    render(&ctx, 192);

    let popped = ctx.unqueue_buffers(source, 4).unwrap();
    assert_eq!(popped, ids);
}

#[test]
fn test_unqueue_beyond_processed_rejected() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let buffer = mono_buffer(&ctx, &constant_mono16(4096, 100));
    ctx.queue_buffers(source, &[buffer]).unwrap();
    ctx.play_source(source).unwrap();
    render(&ctx, 64);

    // Still mid-buffer, nothing processed yet.
    assert_eq!(ctx.buffers_processed(source).unwrap(), 0);
    let err = ctx.unqueue_buffers(source, 1).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
}

#[test]
fn test_looping_stream_cycles_without_processing() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let a = mono_buffer(&ctx, &constant_mono16(64, 100));
    let b = mono_buffer(&ctx, &constant_mono16(64, 200));

    ctx.queue_buffers(source, &[a, b]).unwrap();
    ctx.set_source_looping(source, true).unwrap();
    ctx.play_source(source).unwrap();

    // Three full cycles plus half a buffer.
    render(&ctx, 416);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Playing);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 0);
    assert_eq!(ctx.buffers_queued(source).unwrap(), 2);
}

#[test]
fn test_disabling_loop_drains_stream() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let a = mono_buffer(&ctx, &constant_mono16(64, 100));
    let b = mono_buffer(&ctx, &constant_mono16(64, 200));

    ctx.queue_buffers(source, &[a, b]).unwrap();
    ctx.set_source_looping(source, true).unwrap();
    ctx.play_source(source).unwrap();

    // Stop mid-way through the first buffer of a later cycle so both slots
    // lie ahead of the cursor when the loop link is removed.
    render(&ctx, 416);
    ctx.set_source_looping(source, false).unwrap();
    ctx.process();

    render(&ctx, 128);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Stopped);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 2);
    assert_eq!(ctx.unqueue_buffers(source, 2).unwrap(), vec![a, b]);
}

#[test]
fn test_refill_pattern_keeps_stream_alive() {
    let ctx = offline_context();
    let source = ctx.gen_source().unwrap();
    let a = mono_buffer(&ctx, &constant_mono16(64, 100));
    let b = mono_buffer(&ctx, &constant_mono16(64, 200));

    ctx.queue_buffers(source, &[a, b]).unwrap();
    ctx.play_source(source).unwrap();

    // Midway through the second buffer, the first is ready to recycle.
    render(&ctx, 96);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Playing);
    assert_eq!(ctx.buffers_processed(source).unwrap(), 1);

    let popped = ctx.unqueue_buffers(source, 1).unwrap();
    assert_eq!(popped, vec![a]);

    // Refill the recycled buffer and extend the stream with it.
    ctx.buffer_data(
        a,
        alcove::SampleFormat::Mono16,
        &constant_mono16(64, 300),
        48_000,
    )
    .unwrap();
    ctx.queue_buffers(source, &[a]).unwrap();
    assert_eq!(ctx.buffers_queued(source).unwrap(), 2);

    render(&ctx, 128);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Stopped);
    assert_eq!(ctx.unqueue_buffers(source, 2).unwrap(), vec![b, a]);
    assert_eq!(ctx.source_sample_offset(source).unwrap(), 192);
}
