//! Filter warm-up ahead of the visible page.
//!
//! Stateful filters only produce correct output at the left edge of the
//! page if they have already seen enough of the signal before it. The
//! frame's warm-up requirement is the largest requirement of any stateful
//! composition; each recording is warmed up over that much history, clamped
//! at the recording start. Warm-up always begins on a record boundary and
//! ends on the sample just before the first visible one, so the replayed
//! history and the visible samples form one unbroken run.

use serde::Serialize;

use super::planner::{readable_records, ticks_to_samples};
use super::{check_cancel, CancelCheck, ViewError};
use crate::composition::SignalComposition;
use crate::filters::FilterChain;
use crate::recording::RecordStore;

use super::materialize::read_region;

/// Largest warm-up requirement of any stateful composition, in ticks
pub fn frame_warmup<'a>(compositions: impl IntoIterator<Item = &'a SignalComposition>) -> i64 {
    compositions
        .into_iter()
        .filter(|c| c.is_stateful())
        .map(SignalComposition::warmup_ticks)
        .max()
        .unwrap_or(0)
}

/// Warm-up actually available before `view_time`: never more than the
/// history the recording has, and none when the view starts at or before
/// the recording start
#[inline]
pub fn prefilter_time(pre_time: i64, view_time: i64) -> i64 {
    if view_time <= 0 || pre_time <= 0 {
        0
    } else {
        pre_time.min(view_time)
    }
}

/// History replayed through the filters of one recording
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WarmupWindow {
    /// Record the warm-up starts on
    pub first_record: u64,
    /// Whole records between the warm-up start and the view time
    pub whole_records: u64,
    /// Ticks of the record holding the view time that precede it
    pub partial_ticks: i64,
    pub record_duration: i64,
    /// Requested warm-up, in ticks
    pub prefilter_time: i64,
}

impl WarmupWindow {
    /// Window ending at `view_time`; `None` when there is nothing to replay
    pub fn new(view_time: i64, prefilter_time: i64, record_duration: i64) -> Option<Self> {
        if prefilter_time <= 0 || view_time <= 0 {
            return None;
        }
        let start = (view_time - prefilter_time).max(0);
        let first_record = (start / record_duration) as u64;
        Some(Self {
            first_record,
            whole_records: (view_time / record_duration) as u64 - first_record,
            partial_ticks: view_time % record_duration,
            record_duration,
            prefilter_time,
        })
    }

    /// Tick where replay begins
    pub fn start_time(&self) -> i64 {
        self.first_record as i64 * self.record_duration
    }

    /// Records that must be read to cover the window
    pub fn records_to_read(&self) -> u64 {
        self.whole_records + u64::from(self.partial_ticks > 0)
    }

    /// Samples of a channel with `samples_per_record` inside the window.
    ///
    /// The record holding the view time contributes the samples that fall
    /// strictly before it, in proportion to the elapsed ticks.
    pub fn samples(&self, samples_per_record: usize) -> u64 {
        self.whole_records * samples_per_record as u64
            + ticks_to_samples(self.partial_ticks, samples_per_record, self.record_duration) as u64
    }

    /// Absolute index of the first replayed sample
    pub fn first_sample(&self, samples_per_record: usize) -> u64 {
        self.first_record * samples_per_record as u64
    }
}

/// Bytes of the records a warm-up window reads
pub fn warmup_bytes(window: &WarmupWindow, record_size: usize) -> u128 {
    window.records_to_read() as u128 * record_size as u128
}

/// Read the records of a warm-up window into `region`, zero-filling any
/// past the end of the recording. Returns how many reads were issued.
pub fn read_warmup(
    store: &mut dyn RecordStore,
    window: &WarmupWindow,
    region: &mut [u8],
    cancel: CancelCheck<'_>,
) -> Result<usize, ViewError> {
    check_cancel(cancel)?;
    let records = window.records_to_read();
    let issued = usize::from(readable_records(store.header().total_records(), window.first_record, records) > 0);
    read_region(store, window.first_record, records, region)?;
    Ok(issued)
}

/// Replay a warm-up region through `chain` and checkpoint the result.
///
/// The chain is reset and positioned at the first sample of the window, so
/// block-based stages keep their epochs on absolute recording time. The
/// cancellation check runs once per record. Returns the number of samples
/// replayed.
pub fn replay(
    composition: &SignalComposition,
    chain: &mut FilterChain,
    region: &[u8],
    window: &WarmupWindow,
    cancel: CancelCheck<'_>,
) -> Result<u64, ViewError> {
    let spr = composition.samples_per_record();
    let samples = window.samples(spr) as usize;

    chain.reset();
    chain.seek(window.first_sample(spr));
    for record_start in (0..samples).step_by(spr) {
        check_cancel(cancel)?;
        for index in record_start..(record_start + spr).min(samples) {
            let x = composition.sample_value(region, index);
            chain.apply(x);
        }
    }
    chain.save_state();
    Ok(samples as u64)
}

/// Checkpoint a freshly reset chain positioned at `absolute_sample`
pub fn checkpoint_at(chain: &mut FilterChain, absolute_sample: u64) {
    chain.reset();
    chain.seek(absolute_sample);
    chain.save_state();
}
