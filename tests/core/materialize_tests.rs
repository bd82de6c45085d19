//! Tests for frame materialization and filtered traces
//!
//! Tests cover:
//! - Byte-identical frames for stateless compositions
//! - Zero fill and sample_stop past the end of a recording
//! - Idempotent trace extraction
//! - Parallel and sequential trace extraction agree
//! - Failed reads leave the displayed frame untouched
//! - Shared contexts reject overlapping navigation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use edfview::clock::TICKS_PER_SECOND;
use edfview::composition::CompositionSpec;
use edfview::filters::{FilterSpec, IirBand, IirModel, MathFunc};
use edfview::recording::{RecordError, SampleFormat};
use edfview::settings::ViewSettings;
use edfview::viewbuf::{RenderContext, SharedRenderContext, ViewError};

use crate::common::assertions::assert_close;
use crate::common::doubles::FailingStore;
use crate::common::synthetic;

const SECOND: i64 = TICKS_PER_SECOND;

fn ramp_context(records: u64) -> (RenderContext, edfview::viewbuf::RecordingId) {
    let mut ctx = RenderContext::default();
    let store = synthetic::store(SampleFormat::Bdf24, records, &[("C3", 100), ("C4", 100)], |c, n| {
        if c == 0 {
            n as i32 - 5000
        } else {
            2 * n as i32
        }
    });
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    (ctx, rec)
}

// ============================================
// Determinism Tests
// ============================================

#[test]
fn test_stateless_frames_are_byte_identical() {
    let (mut ctx, rec) = ramp_context(20);
    ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();
    ctx.add_composition(rec, CompositionSpec::single("C4", 1).with_post_math(MathFunc::Abs))
        .unwrap();

    ctx.materialize_at(4_321_000, 3 * SECOND, None).unwrap();
    let first = ctx.buffer().to_vec();
    ctx.materialize_at(4_321_000, 3 * SECOND, None).unwrap();
    assert_eq!(ctx.buffer(), &first[..]);

    ctx.materialize_at(15 * SECOND, SECOND, None).unwrap();
    ctx.materialize_at(4_321_000, 3 * SECOND, None).unwrap();
    assert_eq!(ctx.buffer(), &first[..]);
}

#[test]
fn test_weighted_sum_of_bdf_channels() {
    let (mut ctx, rec) = ramp_context(5);
    let comp = ctx
        .add_composition(rec, CompositionSpec::single("C3-C4", 0).with_term(1, -0.5))
        .unwrap();

    ctx.materialize_at(SECOND, SECOND, None).unwrap();
    let trace = ctx.filtered_trace(comp).unwrap();
    assert_eq!(trace.len(), 100);
    // (n - 5000) - 0.5 * 2n
    for v in &trace.values {
        assert_close(*v, -5000.0, 1e-9);
    }
}

// ============================================
// End of Recording Tests
// ============================================

#[test]
fn test_zero_fill_past_end_of_recording() {
    let (mut ctx, rec) = ramp_context(3);
    let comp = ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();

    ctx.materialize_at(25_000_000, SECOND, None).unwrap();
    let frame = ctx.composition(comp).unwrap().frame().clone();
    assert_eq!(frame.first_record, 2);
    assert_eq!(frame.records, 2);
    assert_eq!(frame.valid_samples, 100);
    assert_eq!(frame.samples_on_screen, 100);
    assert_eq!(frame.sample_stop, 50);

    // Record 2 is real, record 3 is exactly one record of zeros
    let record_size = ctx.header(rec).unwrap().record_size();
    let buffer = ctx.buffer();
    assert_eq!(buffer.len(), 2 * record_size);
    assert!(buffer[..record_size].iter().any(|&b| b != 0));
    assert!(buffer[record_size..].iter().all(|&b| b == 0));

    let trace = ctx.filtered_trace(comp).unwrap();
    assert_eq!(trace.len(), 50);
    assert_eq!(trace.get(49), Some(299.0 - 5000.0));
    assert_eq!(ctx.filtered_sample(comp, 50).unwrap(), None);
}

#[test]
fn test_view_entirely_past_end() {
    let (mut ctx, rec) = ramp_context(3);
    let comp = ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();

    let summary = ctx.materialize_at(10 * SECOND, SECOND, None).unwrap();
    assert_eq!(summary.reads, 0);
    assert!(ctx.buffer().iter().all(|&b| b == 0));
    assert!(ctx.filtered_trace(comp).unwrap().is_empty());
}

// ============================================
// Trace Tests
// ============================================

#[test]
fn test_trace_extraction_is_idempotent() {
    let (mut ctx, rec) = ramp_context(20);
    let comp = ctx
        .add_composition(
            rec,
            CompositionSpec::single("C3", 0).with_filter(FilterSpec::Iir {
                model: IirModel::Butterworth,
                band: IirBand::Highpass,
                order: 2,
                frequency_hz: 1.0,
                upper_frequency_hz: None,
                ripple_db: None,
            }),
        )
        .unwrap();

    ctx.materialize_at(7_700_000 + 5 * SECOND, 2 * SECOND, None).unwrap();
    let first = ctx.filtered_trace(comp).unwrap();
    let second = ctx.filtered_trace(comp).unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.filtered_sample(comp, 17).unwrap(), first.get(17));
    assert_eq!(ctx.filtered_sample(comp, 17).unwrap(), first.get(17));
}

#[test]
fn test_parallel_traces_match_sequential() {
    let build = |parallel: bool| {
        let mut ctx = RenderContext::new(ViewSettings {
            parallel_traces: parallel,
            ..ViewSettings::default()
        });
        let rec = ctx
            .open_recording(Box::new(synthetic::sine_store(SampleFormat::Edf16, 10, 256, 5.0, 40)))
            .unwrap();
        for cutoff_hz in [0.5, 1.0, 2.0, 4.0] {
            ctx.add_composition(
                rec,
                CompositionSpec::single("EEG", 0).with_filter(FilterSpec::FirstOrder {
                    highpass: true,
                    cutoff_hz,
                }),
            )
            .unwrap();
        }
        ctx.materialize_at(3 * SECOND, 2 * SECOND, None).unwrap();
        ctx.filtered_traces()
    };

    let sequential = build(false);
    let parallel = build(true);
    assert_eq!(sequential.len(), 4);
    assert_eq!(sequential, parallel);
}

#[test]
fn test_new_composition_empty_until_next_frame() {
    let (mut ctx, rec) = ramp_context(5);
    ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();
    ctx.materialize_at(0, SECOND, None).unwrap();

    let late = ctx.add_composition(rec, CompositionSpec::single("C4", 1)).unwrap();
    assert!(ctx.filtered_trace(late).unwrap().is_empty());

    ctx.materialize(None).unwrap();
    assert_eq!(ctx.filtered_trace(late).unwrap().len(), 100);

    ctx.remove_composition(late).unwrap();
    assert!(matches!(ctx.filtered_trace(late), Err(ViewError::UnknownComposition(_))));
}

// ============================================
// Failure Tests
// ============================================

#[test]
fn test_failed_read_keeps_displayed_frame() {
    let fail = Arc::new(AtomicBool::new(false));
    let store = FailingStore {
        inner: synthetic::sine_store(SampleFormat::Edf16, 20, 128, 3.0, 0),
        fail: fail.clone(),
    };
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let comp = ctx
        .add_composition(
            rec,
            CompositionSpec::single("EEG", 0).with_filter(FilterSpec::MovingAverage {
                highpass: true,
                window: 16,
            }),
        )
        .unwrap();

    ctx.materialize_at(5 * SECOND, SECOND, None).unwrap();
    let buffer = ctx.buffer().to_vec();
    let trace = ctx.filtered_trace(comp).unwrap();
    let frame = ctx.composition(comp).unwrap().frame().clone();

    fail.store(true, Ordering::SeqCst);
    let err = ctx.materialize_at(9 * SECOND, 2 * SECOND, None).unwrap_err();
    assert!(matches!(err, ViewError::Io(RecordError::ShortRead { .. })));

    assert_eq!(ctx.buffer(), &buffer[..]);
    assert_eq!(ctx.composition(comp).unwrap().frame(), &frame);
    assert_eq!(ctx.filtered_trace(comp).unwrap(), trace);
    assert_eq!(ctx.view_time(rec).unwrap(), 5 * SECOND);
    assert_eq!(ctx.page_time(), SECOND);

    fail.store(false, Ordering::SeqCst);
    ctx.materialize(None).unwrap();
    assert_eq!(ctx.filtered_trace(comp).unwrap(), trace);
}

// ============================================
// Shared Context Tests
// ============================================

#[test]
fn test_shared_context_rejects_overlapping_navigation() {
    let (mut ctx, rec) = ramp_context(10);
    ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();
    let shared = SharedRenderContext::new(ctx);

    let inner = shared
        .with(|_| shared.navigate(SECOND, SECOND, None))
        .unwrap();
    assert!(matches!(inner, Err(ViewError::Busy)));

    let other = shared.clone();
    let summary = std::thread::spawn(move || other.navigate(2 * SECOND, SECOND, None))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(summary.page_time, SECOND);
    assert_eq!(shared.with(|ctx| ctx.view_time(rec)).unwrap().unwrap(), 2 * SECOND);
}
