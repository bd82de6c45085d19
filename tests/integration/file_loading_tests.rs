//! File loading integration tests
//!
//! Tests for end-to-end loading of EDF and BDF files through the buffered,
//! mapped and in-memory stores.

use std::path::PathBuf;

use edfview::clock::TICKS_PER_SECOND;
use edfview::composition::CompositionSpec;
use edfview::filters::{FilterSpec, IirBand, IirModel};
use edfview::recording::{MemoryStore, RecordError, SampleFormat};
use edfview::viewbuf::{RenderContext, Trace, ViewError};

use crate::common::synthetic::{self, sine_value};
use crate::common::temp_path;

const SECOND: i64 = TICKS_PER_SECOND;

fn two_channel_image(format: SampleFormat, records: u64) -> Vec<u8> {
    let header = synthetic::header(format, records, &[("C3", 256), ("C4", 256)]);
    synthetic::file_image(&header, |c, n| {
        if c == 0 {
            sine_value(n, 256, 10.0, 200)
        } else {
            sine_value(n, 256, 3.0, -150)
        }
    })
}

fn write_image(name: &str, image: &[u8]) -> PathBuf {
    let path = temp_path(name);
    std::fs::write(&path, image).unwrap();
    path
}

fn bandpass_derivation() -> CompositionSpec {
    CompositionSpec::single("C3-C4", 0)
        .with_term(1, -1.0)
        .with_filter(FilterSpec::Iir {
            model: IirModel::Butterworth,
            band: IirBand::Bandpass,
            order: 2,
            frequency_hz: 1.0,
            upper_frequency_hz: Some(30.0),
            ripple_db: None,
        })
}

fn scroll(ctx: &mut RenderContext) -> Vec<Trace> {
    let rec = ctx.recording_ids().next().unwrap();
    let comp = ctx.add_composition(rec, bandpass_derivation()).unwrap();
    [0, 37_000_000, 122_500_000, 37_000_000]
        .into_iter()
        .map(|view| {
            ctx.materialize_at(view, 2 * SECOND, None).unwrap();
            ctx.filtered_trace(comp).unwrap()
        })
        .collect()
}

// ============================================
// Store Equivalence Tests
// ============================================

#[test]
fn test_bdf_file_complete_cycle() {
    let image = two_channel_image(SampleFormat::Bdf24, 20);
    let path = write_image("cycle_bdf", &image);

    let mut buffered = RenderContext::default();
    buffered.open_file(&path).unwrap();
    let mut mapped = RenderContext::default();
    mapped.open_mapped(&path).unwrap();
    let mut memory = RenderContext::default();
    memory
        .open_recording(Box::new(MemoryStore::from_bytes(&image).unwrap()))
        .unwrap();

    let a = scroll(&mut buffered);
    let b = scroll(&mut mapped);
    let c = scroll(&mut memory);
    std::fs::remove_file(&path).ok();

    assert_eq!(a, b);
    assert_eq!(a, c);
    // Returning to a view reproduces its trace
    assert_eq!(a[1], a[3]);
    assert_eq!(a[0].len(), 512);
}

#[test]
fn test_edf_file_header_fields() {
    let image = two_channel_image(SampleFormat::Edf16, 6);
    let path = write_image("header_edf", &image);

    let mut ctx = RenderContext::default();
    let rec = ctx.open_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let header = ctx.header(rec).unwrap();
    assert_eq!(header.format, SampleFormat::Edf16);
    assert_eq!(header.total_records(), 6);
    assert_eq!(header.duration(), 6 * SECOND);
    assert_eq!(header.find_channel("C4"), Some(1));
    assert_eq!(header.sample_rate(0), Some(256.0));
}

#[test]
fn test_recording_in_progress_counts_records_from_file_size() {
    let mut image = two_channel_image(SampleFormat::Edf16, 4);
    image[236..244].copy_from_slice(b"-1      ");
    // Half a record of trailing bytes is ignored
    image.extend(vec![0u8; 512]);
    let path = write_image("in_progress", &image);

    let mut ctx = RenderContext::default();
    let rec = ctx.open_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(ctx.header(rec).unwrap().total_records(), 4);
}

// ============================================
// Error Tests
// ============================================

#[test]
fn test_truncated_file_is_rejected() {
    let image = two_channel_image(SampleFormat::Bdf24, 5);
    let cut = image.len() - 100;
    let path = write_image("truncated", &image[..cut]);

    let mut ctx = RenderContext::default();
    let err = ctx.open_mapped(&path).unwrap_err();
    std::fs::remove_file(&path).ok();

    assert!(matches!(
        err,
        ViewError::Io(RecordError::Truncated {
            declared: 5,
            available: 4
        })
    ));
}

#[test]
fn test_unknown_version_field_is_rejected() {
    let mut image = two_channel_image(SampleFormat::Edf16, 2);
    image[0] = b'X';
    let path = write_image("bad_version", &image);

    let mut ctx = RenderContext::default();
    let err = ctx.open_file(&path).unwrap_err();
    std::fs::remove_file(&path).ok();

    assert!(matches!(err, ViewError::Io(RecordError::InvalidHeader(_))));
}
