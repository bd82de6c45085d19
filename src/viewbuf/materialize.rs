//! Reading visible records into the view buffer.

use super::planner::{frame_layout, readable_records, RecordingPlan};
use crate::composition::{FrameLayout, SignalComposition};
use crate::recording::{RecordError, RecordStore};

/// Read `records` records starting at `first_record` into `out`.
///
/// Records past the end of the recording are not read; their bytes are
/// zeroed instead. `out` must be exactly `records * record_size` bytes.
/// Returns the number of records read from the store.
pub fn read_region(
    store: &mut dyn RecordStore,
    first_record: u64,
    records: u64,
    out: &mut [u8],
) -> Result<u64, RecordError> {
    let header = store.header();
    let record_size = header.record_size();
    let readable = readable_records(header.total_records(), first_record, records);
    debug_assert_eq!(out.len(), records as usize * record_size);

    let (data, tail) = out.split_at_mut(readable as usize * record_size);
    if readable > 0 {
        store.read_records(first_record, readable as usize, data)?;
    }
    tail.fill(0);
    Ok(readable)
}

/// Read one recording's visible records into its region of `buffer`
pub fn read_visible(store: &mut dyn RecordStore, plan: &RecordingPlan, buffer: &mut [u8]) -> Result<u64, RecordError> {
    let region = &mut buffer[plan.buffer_offset..plan.buffer_offset + plan.bytes];
    read_region(store, plan.range.first_record, plan.range.records, region)
}

/// Screen layout of `composition` inside its recording's region
pub fn composition_layout(
    composition: &SignalComposition,
    plan: &RecordingPlan,
    page_time: i64,
    record_duration: i64,
    prefilter_samples: u64,
) -> FrameLayout {
    let mut layout = frame_layout(
        &plan.range,
        page_time,
        record_duration,
        composition.samples_per_record(),
        plan.readable_records,
    );
    layout.buffer_offset = plan.buffer_offset;
    layout.prefilter_samples = prefilter_samples;
    layout
}
