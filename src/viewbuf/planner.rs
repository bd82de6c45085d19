//! Record ranges and buffer layout for one frame.
//!
//! All arithmetic is on integer ticks. Sample counts derived from tick spans
//! are computed in `i128` as `ticks * samples_per_record / record_duration`
//! so no intermediate product can overflow and the result is the same for
//! every scroll position that lands on the same tick.

use serde::Serialize;

use super::prefilter::{warmup_bytes, WarmupWindow};
use super::{RecordingId, ViewError};
use crate::composition::FrameLayout;
use crate::recording::RecordingHeader;

/// Records covering a page of one recording
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VisibleRange {
    /// First record to read; 0 when the view starts before the recording
    pub first_record: u64,
    /// Records spanning the page, including any past the end of the file
    pub records: u64,
    /// Ticks from the start of `first_record` to the view time
    pub record_offset: i64,
    /// Ticks between the view time and the recording start, when negative
    pub lead: i64,
}

/// Record range covering `[view_time, view_time + page_time]`
pub fn visible_range(view_time: i64, page_time: i64, record_duration: i64) -> VisibleRange {
    if view_time >= 0 {
        let record_offset = view_time % record_duration;
        VisibleRange {
            first_record: (view_time / record_duration) as u64,
            records: (page_time.saturating_add(record_offset) / record_duration) as u64 + 1,
            record_offset,
            lead: 0,
        }
    } else {
        VisibleRange {
            first_record: 0,
            records: (view_time.saturating_add(page_time).max(0) / record_duration) as u64 + 1,
            record_offset: 0,
            lead: view_time.saturating_neg(),
        }
    }
}

/// Records of `[first_record, first_record + records)` present in a
/// recording of `total_records`
#[inline]
pub fn readable_records(total_records: u64, first_record: u64, records: u64) -> u64 {
    total_records.saturating_sub(first_record).min(records)
}

/// `ticks * samples_per_record / record_duration`, floored
#[inline]
pub(crate) fn ticks_to_samples(ticks: i64, samples_per_record: usize, record_duration: i64) -> i128 {
    ticks as i128 * samples_per_record as i128 / record_duration as i128
}

fn to_usize(value: i128) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}

/// Screen layout of one composition over a visible range.
///
/// `readable_records` is how many records of the range hold real data; the
/// rest of the region is zero fill. The buffer offset and warm-up count are
/// left for the caller to fill in.
pub fn frame_layout(
    range: &VisibleRange,
    page_time: i64,
    record_duration: i64,
    samples_per_record: usize,
    readable_records: u64,
) -> FrameLayout {
    let samples_on_screen = to_usize(ticks_to_samples(page_time, samples_per_record, record_duration));

    let shifted = range.record_offset as i128 * samples_per_record as i128;
    let sample_timeoffset = to_usize(shifted / record_duration as i128);
    let sample_timeoffset_part = (shifted % record_duration as i128) as f64 / record_duration as f64;

    let sample_start = if range.lead > 0 {
        to_usize(ticks_to_samples(range.lead, samples_per_record, record_duration)).min(samples_on_screen)
    } else {
        0
    };

    let samples = to_usize(range.records as i128 * samples_per_record as i128);
    let valid_samples = to_usize(readable_records as i128 * samples_per_record as i128);
    let sample_stop = samples_on_screen
        .min(valid_samples.saturating_sub(sample_timeoffset).saturating_add(sample_start))
        .max(sample_start);

    FrameLayout {
        buffer_offset: 0,
        first_record: range.first_record,
        records: to_usize(range.records as i128),
        samples,
        valid_samples,
        prefilter_samples: 0,
        samples_on_screen,
        sample_start,
        sample_stop,
        sample_timeoffset,
        sample_timeoffset_part,
    }
}

/// One recording to place in the frame
#[derive(Clone, Copy, Debug)]
pub struct PlanTarget<'a> {
    pub recording: RecordingId,
    pub view_time: i64,
    /// Warm-up history wanted before the view time, in ticks
    pub prefilter_time: i64,
    pub header: &'a RecordingHeader,
}

/// Where one recording's records land in the view buffer.
///
/// The region holds the warm-up records, if any, followed by the visible
/// records.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordingPlan {
    pub recording: RecordingId,
    pub view_time: i64,
    pub range: VisibleRange,
    /// Records of the range present in the file
    pub readable_records: u64,
    pub record_size: usize,
    /// History replayed through stateful filters before the page
    pub warmup: Option<WarmupWindow>,
    /// Byte offset of the warm-up records
    pub warmup_offset: usize,
    pub warmup_bytes: usize,
    /// Byte offset of the visible records
    pub buffer_offset: usize,
    /// Size of the visible records, zero fill included
    pub bytes: usize,
}

impl RecordingPlan {
    /// Bytes of the visible records that come from the file
    pub fn readable_bytes(&self) -> usize {
        self.readable_records as usize * self.record_size
    }

    /// Tick the warm-up starts at, or the view time without one
    pub fn prefilter_start_time(&self) -> i64 {
        self.warmup.map_or(self.view_time, |w| w.start_time())
    }

    /// Warm-up in use, in ticks
    pub fn prefilter_time(&self) -> i64 {
        self.warmup.map_or(0, |w| w.prefilter_time)
    }
}

/// Layout of the whole view buffer for one frame
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FramePlan {
    pub page_time: i64,
    pub recordings: Vec<RecordingPlan>,
    pub total_bytes: usize,
}

impl FramePlan {
    pub fn find(&self, recording: RecordingId) -> Option<&RecordingPlan> {
        self.recordings.iter().find(|p| p.recording == recording)
    }
}

/// Lay out the view buffer for every distinct recording in `targets`.
///
/// A recording listed more than once is planned once with the longest
/// warm-up any of its targets asks for, so every composition on it shares
/// one region and one read of each range. Warm-up records count towards
/// the buffer like visible ones; fails with [`ViewError::Capacity`] when
/// the buffer would reach `ceiling` bytes.
pub fn plan<'a>(
    targets: impl IntoIterator<Item = PlanTarget<'a>>,
    page_time: i64,
    ceiling: u64,
) -> Result<FramePlan, ViewError> {
    if page_time <= 0 {
        return Err(ViewError::Configuration(format!("page time must be positive, got {}", page_time)));
    }

    let mut distinct: Vec<PlanTarget<'a>> = Vec::new();
    for target in targets {
        match distinct.iter_mut().find(|t| t.recording == target.recording) {
            Some(t) => t.prefilter_time = t.prefilter_time.max(target.prefilter_time),
            None => distinct.push(target),
        }
    }

    let mut sized = Vec::with_capacity(distinct.len());
    let mut total: u128 = 0;
    for target in distinct {
        let header = target.header;
        let record_duration = header.record_duration();
        let range = visible_range(target.view_time, page_time, record_duration);
        let warmup = WarmupWindow::new(target.view_time, target.prefilter_time, record_duration);
        let warmup_size = warmup.map_or(0, |w| warmup_bytes(&w, header.record_size()));
        let bytes = range.records as u128 * header.record_size() as u128;
        sized.push((target, range, warmup, total, warmup_size, bytes));
        total += warmup_size + bytes;
    }

    if total >= ceiling as u128 {
        return Err(ViewError::Capacity {
            requested: u64::try_from(total).unwrap_or(u64::MAX),
            ceiling,
        });
    }

    let recordings: Vec<RecordingPlan> = sized
        .into_iter()
        .map(|(target, range, warmup, offset, warmup_size, bytes)| RecordingPlan {
            recording: target.recording,
            view_time: target.view_time,
            readable_records: readable_records(target.header.total_records(), range.first_record, range.records),
            record_size: target.header.record_size(),
            range,
            warmup,
            warmup_offset: offset as usize,
            warmup_bytes: warmup_size as usize,
            buffer_offset: (offset + warmup_size) as usize,
            bytes: bytes as usize,
        })
        .collect();

    for p in &recordings {
        tracing::debug!(
            "Planned {}: warm-up {} bytes at {}, records {}+{} ({} readable) at offset {}, {} bytes",
            p.recording,
            p.warmup_bytes,
            p.warmup_offset,
            p.range.first_record,
            p.range.records,
            p.readable_records,
            p.buffer_offset,
            p.bytes
        );
    }

    Ok(FramePlan {
        page_time,
        recordings,
        total_bytes: total as usize,
    })
}
