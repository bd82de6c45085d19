//! Tests for frame planning through the render context
//!
//! Tests cover:
//! - Compositions on one recording share a region and a single read
//! - Separate recordings get separate regions
//! - Negative view times read from record 0
//! - Capacity fallback and failure, warm-up records included

use edfview::clock::TICKS_PER_SECOND;
use edfview::composition::CompositionSpec;
use edfview::filters::FilterSpec;
use edfview::recording::SampleFormat;
use edfview::settings::ViewSettings;
use edfview::viewbuf::{RenderContext, ViewError};

use crate::common::doubles::CountingStore;
use crate::common::synthetic;

const SECOND: i64 = TICKS_PER_SECOND;

fn two_channel_store() -> edfview::recording::MemoryStore {
    synthetic::store(SampleFormat::Edf16, 30, &[("C3", 128), ("C4", 128)], |c, n| {
        (n % 500) as i32 * if c == 0 { 1 } else { -1 }
    })
}

// ============================================
// Shared Read Tests
// ============================================

#[test]
fn test_single_read_for_shared_recording() {
    let (store, log) = CountingStore::new(two_channel_store());
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let a = ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();
    let b = ctx
        .add_composition(rec, CompositionSpec::single("C3-C4", 0).with_term(1, -1.0))
        .unwrap();

    let summary = ctx.materialize_at(0, 2 * SECOND, None).unwrap();
    assert_eq!(log.calls(), 1);
    assert_eq!(summary.reads, 1);
    assert_eq!(log.ranges(), vec![(0, 3)]);

    let fa = ctx.composition(a).unwrap().frame().clone();
    let fb = ctx.composition(b).unwrap().frame().clone();
    assert_eq!(fa.buffer_offset, fb.buffer_offset);
    assert_eq!(ctx.frame_plan().recordings.len(), 1);
    assert_eq!(summary.bytes, 3 * 512);
}

#[test]
fn test_shared_recording_with_warmup_reads_each_range_once() {
    let (store, log) = CountingStore::new(two_channel_store());
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let highpass = FilterSpec::FirstOrder {
        highpass: true,
        cutoff_hz: 0.5,
    };
    ctx.add_composition(rec, CompositionSpec::single("C3", 0).with_filter(highpass.clone()))
        .unwrap();
    ctx.add_composition(rec, CompositionSpec::single("C4", 1).with_filter(highpass))
        .unwrap();

    let summary = ctx.materialize_at(10 * SECOND, SECOND, None).unwrap();
    // One warm-up read over [8 s, 10 s) and one visible read
    assert_eq!(log.ranges(), vec![(8, 2), (10, 2)]);
    assert_eq!(summary.reads, 2);
    // Warm-up records live in the view buffer next to the visible ones
    assert_eq!(summary.bytes, 4 * 512);
    assert_eq!(ctx.buffer().len(), 4 * 512);
}

#[test]
fn test_separate_recordings_get_separate_regions() {
    let mut ctx = RenderContext::default();
    let first = ctx.open_recording(Box::new(two_channel_store())).unwrap();
    let second = ctx.open_recording(Box::new(two_channel_store())).unwrap();
    let a = ctx.add_composition(first, CompositionSpec::single("C3", 0)).unwrap();
    let b = ctx.add_composition(second, CompositionSpec::single("C3", 0)).unwrap();

    ctx.set_view_time(second, 5 * SECOND).unwrap();
    let summary = ctx.materialize(None).unwrap();
    assert_eq!(summary.recordings, 2);

    let fa = ctx.composition(a).unwrap().frame().clone();
    let fb = ctx.composition(b).unwrap().frame().clone();
    assert_eq!(fa.buffer_offset, 0);
    assert_eq!(fb.buffer_offset, fa.records * 512);
    assert_eq!(fb.first_record, 5);
    assert_eq!(ctx.view_time(second).unwrap(), 5 * SECOND);
}

#[test]
fn test_recording_without_compositions_is_not_read() {
    let (store, log) = CountingStore::new(two_channel_store());
    let mut ctx = RenderContext::default();
    ctx.open_recording(Box::new(store)).unwrap();
    let other = ctx.open_recording(Box::new(two_channel_store())).unwrap();
    ctx.add_composition(other, CompositionSpec::single("C3", 0)).unwrap();

    ctx.materialize_at(0, SECOND, None).unwrap();
    assert_eq!(log.calls(), 0);
}

// ============================================
// Negative View Tests
// ============================================

#[test]
fn test_negative_view_reads_from_record_zero() {
    let (store, log) = CountingStore::new(synthetic::sine_store(SampleFormat::Edf16, 5, 256, 3.0, 0));
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let comp = ctx.add_composition(rec, CompositionSpec::single("EEG", 0)).unwrap();

    ctx.materialize_at(-2_000_000, 1_000_000, None).unwrap();
    let frame = ctx.composition(comp).unwrap().frame().clone();

    assert_eq!(log.ranges(), vec![(0, 1)]);
    assert!(frame.sample_start > 0);
    assert_eq!(frame.first_record, 0);
    assert_eq!(ctx.prefilter_time(rec).unwrap(), 0);
}

// ============================================
// Capacity Tests
// ============================================

#[test]
fn test_capacity_fallback_to_short_page() {
    let settings = ViewSettings {
        // Two records of 512 bytes fit, six do not
        buffer_ceiling: Some(2000),
        ..ViewSettings::default()
    };
    let mut ctx = RenderContext::new(settings);
    let rec = ctx.open_recording(Box::new(two_channel_store())).unwrap();
    let comp = ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();

    let summary = ctx.materialize_at(0, 5 * SECOND, None).unwrap();
    assert!(summary.page_clamped);
    assert_eq!(summary.page_time, SECOND);
    assert_eq!(ctx.composition(comp).unwrap().frame().samples_on_screen, 128);
}

#[test]
fn test_capacity_failure_leaves_view_unchanged() {
    let settings = ViewSettings {
        buffer_ceiling: Some(600),
        ..ViewSettings::default()
    };
    let mut ctx = RenderContext::new(settings);
    let rec = ctx.open_recording(Box::new(two_channel_store())).unwrap();
    ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();

    // A 0.5 s page inside one record fits
    ctx.materialize_at(SECOND / 4, SECOND / 2, None).unwrap();

    let err = ctx.materialize_at(3 * SECOND, 5 * SECOND, None).unwrap_err();
    assert!(matches!(err, ViewError::Capacity { ceiling: 600, .. }));
    assert_eq!(ctx.view_time(rec).unwrap(), SECOND / 4);
    assert_eq!(ctx.page_time(), SECOND / 2);
    assert_eq!(ctx.frame_count(), 1);
}

#[test]
fn test_warmup_records_count_towards_ceiling() {
    let settings = ViewSettings {
        // Two visible records of 200 bytes fit, 200 s of history does not
        buffer_ceiling: Some(1000),
        ..ViewSettings::default()
    };
    let (store, log) = CountingStore::new(synthetic::store(SampleFormat::Edf16, 300, &[("C3", 100)], |_, n| {
        (n % 1000) as i32
    }));
    let mut ctx = RenderContext::new(settings);
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    ctx.add_composition(
        rec,
        CompositionSpec::single("C3", 0).with_filter(FilterSpec::FirstOrder {
            highpass: true,
            cutoff_hz: 0.005,
        }),
    )
    .unwrap();

    let err = ctx.materialize_at(250 * SECOND, SECOND, None).unwrap_err();
    assert!(matches!(err, ViewError::Capacity { ceiling: 1000, .. }));
    assert_eq!(log.calls(), 0);
    assert_eq!(ctx.frame_count(), 0);
    assert_eq!(ctx.view_time(rec).unwrap(), 0);

    // Without history the same page fits
    ctx.materialize_at(0, SECOND, None).unwrap();
    assert!(ctx.buffer().len() < 1000);
}
