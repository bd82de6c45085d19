//! Data integrity integration tests
//!
//! Tests that every frame shows exactly the samples its view time selects,
//! across record boundaries, the recording edges and sub-second records.

use edfview::clock::TICKS_PER_SECOND;
use edfview::composition::CompositionSpec;
use edfview::recording::{ChannelInfo, MemoryStore, RecordingHeader, SampleFormat};
use edfview::viewbuf::RenderContext;

use crate::common::assertions::assert_close;
use crate::common::synthetic;

const SECOND: i64 = TICKS_PER_SECOND;

// ============================================
// Scrolling Tests
// ============================================

#[test]
fn test_scrolling_shows_consecutive_samples() {
    let total_records = 8;
    let spr = 100;
    let store = synthetic::store(SampleFormat::Bdf24, total_records, &[("C3", spr)], |_, n| n as i32 - 5000);
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let comp = ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();

    let total_samples = total_records * spr as u64;
    let mut view = -SECOND;
    while view <= 9 * SECOND {
        ctx.materialize_at(view, SECOND, None).unwrap();
        let frame = ctx.composition(comp).unwrap().frame().clone();
        let trace = ctx.filtered_trace(comp).unwrap();
        let first = frame.first_visible_sample(spr);

        assert_eq!(trace.first_position, frame.sample_start, "view {}", view);
        for (i, v) in trace.values.iter().enumerate() {
            assert_eq!(*v, (first + i as u64) as f64 - 5000.0, "view {} position {}", view, i);
        }
        // Frames stop at the last recorded sample
        let expected_len = (total_samples.saturating_sub(first) as usize).min(100 - frame.sample_start);
        assert_eq!(trace.len(), expected_len, "view {}", view);

        view += SECOND / 4;
    }
}

#[test]
fn test_view_before_start_leads_with_empty_positions() {
    let store = synthetic::store(SampleFormat::Edf16, 4, &[("C3", 100)], |_, n| n as i32);
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let comp = ctx.add_composition(rec, CompositionSpec::single("C3", 0)).unwrap();

    ctx.materialize_at(-3_000_000, SECOND, None).unwrap();
    let frame = ctx.composition(comp).unwrap().frame().clone();
    assert_eq!(frame.sample_start, 30);
    assert_eq!(frame.sample_stop, 100);

    assert_eq!(ctx.filtered_sample(comp, 29).unwrap(), None);
    assert_eq!(ctx.filtered_sample(comp, 30).unwrap(), Some(0.0));
    assert_eq!(ctx.filtered_sample(comp, 99).unwrap(), Some(69.0));
}

// ============================================
// Record Layout Tests
// ============================================

#[test]
fn test_half_second_records() {
    let header = RecordingHeader::new(
        SampleFormat::Edf16,
        512,
        20,
        SECOND / 2,
        0,
        vec![ChannelInfo::new("EEG", 50)],
    );
    let data = synthetic::records(&header, |_, n| n as i32);
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(MemoryStore::new(header, data))).unwrap();
    let comp = ctx.add_composition(rec, CompositionSpec::single("EEG", 0)).unwrap();

    ctx.materialize_at(12_300_000, SECOND, None).unwrap();
    let frame = ctx.composition(comp).unwrap().frame().clone();
    assert_eq!(frame.first_record, 2);
    assert_eq!(frame.sample_timeoffset, 23);
    assert_eq!(frame.samples_on_screen, 100);

    let trace = ctx.filtered_trace(comp).unwrap();
    assert_eq!(trace.values.first(), Some(&123.0));
    assert_eq!(trace.values.last(), Some(&222.0));
}

#[test]
fn test_mixed_rate_channels_share_one_region() {
    let store = synthetic::store(SampleFormat::Edf16, 10, &[("EEG", 200), ("Resp", 10)], |c, n| {
        if c == 0 {
            n as i32
        } else {
            -(n as i32)
        }
    });
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(store)).unwrap();
    let eeg = ctx.add_composition(rec, CompositionSpec::single("EEG", 0)).unwrap();
    let resp = ctx.add_composition(rec, CompositionSpec::single("Resp", 1)).unwrap();

    ctx.materialize_at(4_500_000, 2 * SECOND, None).unwrap();
    let eeg_trace = ctx.filtered_trace(eeg).unwrap();
    let resp_trace = ctx.filtered_trace(resp).unwrap();

    assert_eq!(eeg_trace.len(), 400);
    assert_eq!(eeg_trace.values[0], 90.0);
    assert_eq!(resp_trace.len(), 20);
    assert_eq!(resp_trace.values[0], -4.0);
}

// ============================================
// Physical Scaling Tests
// ============================================

#[test]
fn test_physical_scaling_applied_per_channel() {
    let header = RecordingHeader::new(
        SampleFormat::Bdf24,
        768,
        3,
        SECOND,
        0,
        vec![
            ChannelInfo::new("Fp1", 64).with_scaling(0.5, 10.0),
            ChannelInfo::new("Fp2", 64).with_scaling(0.25, -4.0),
        ],
    );
    let data = synthetic::records(&header, |c, n| if c == 0 { n as i32 } else { -(n as i32) });
    let mut ctx = RenderContext::default();
    let rec = ctx.open_recording(Box::new(MemoryStore::new(header, data))).unwrap();
    let comp = ctx
        .add_composition(rec, CompositionSpec::single("Fp1+2Fp2", 0).with_term(1, 2.0))
        .unwrap();

    ctx.materialize_at(SECOND, SECOND, None).unwrap();
    let trace = ctx.filtered_trace(comp).unwrap();
    for (i, v) in trace.values.iter().enumerate() {
        let n = (64 + i) as f64;
        let expected = 0.5 * (n + 10.0) + 2.0 * 0.25 * (-n - 4.0);
        assert_close(*v, expected, 1e-9);
    }
}
