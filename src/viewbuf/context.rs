//! The render context: open recordings, compositions and the view buffer.
//!
//! [`RenderContext`] owns everything a frame is built from. Navigation sets
//! view times and the page duration; [`RenderContext::materialize`] then
//! builds the next frame into the back buffer with cloned filter chains and
//! swaps it in only if every read and warm-up succeeded.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use rayon::prelude::*;
use serde::Serialize;

use super::materialize::{composition_layout, read_visible};
use super::planner::{plan, FramePlan, PlanTarget};
use super::prefilter::{checkpoint_at, frame_warmup, prefilter_time, read_warmup, replay};
use super::trace::{extract, Trace};
use super::{check_cancel, CancelCheck, CompositionId, RecordingId, ViewError};
use crate::clock::format_offset;
use crate::composition::{CompositionSpec, FrameLayout, SignalComposition};
use crate::filters::FilterChain;
use crate::recording::{FileStore, MappedStore, RecordStore, RecordingHeader};
use crate::settings::ViewSettings;

/// An open recording and its navigation state
struct Recording {
    store: Box<dyn RecordStore>,
    /// Requested view time, in ticks from the recording start
    view_time: i64,
    /// View time of the frame on screen
    displayed_view_time: i64,
    /// Warm-up used for the frame on screen
    prefilter_time: i64,
    /// Tick where that warm-up began
    prefilter_start_time: i64,
}

/// Outcome of a committed frame
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameSummary {
    /// Page duration of the frame, after any capacity fallback
    pub page_time: i64,
    /// Whether the page had to be shortened to fit the buffer ceiling
    pub page_clamped: bool,
    pub bytes: usize,
    /// Read calls issued to the stores
    pub reads: usize,
    /// Frame-wide warm-up requirement, in ticks
    pub warmup_ticks: i64,
    pub recordings: usize,
    pub compositions: usize,
}

/// A frame built in the back buffer, not yet visible
struct PendingFrame {
    plan: FramePlan,
    chains: Vec<(CompositionId, FilterChain)>,
    layouts: Vec<(CompositionId, FrameLayout)>,
    /// Per recording: warm-up used and the tick it started at
    warmups: Vec<(RecordingId, i64, i64)>,
    reads: usize,
    warmup_ticks: i64,
}

/// Explicit state for building view buffers
pub struct RenderContext {
    settings: ViewSettings,
    recordings: BTreeMap<RecordingId, Recording>,
    compositions: BTreeMap<CompositionId, SignalComposition>,
    page_time: i64,
    displayed_page_time: i64,
    front: Vec<u8>,
    back: Vec<u8>,
    plan: FramePlan,
    traces: HashMap<CompositionId, Trace>,
    next_recording: u32,
    next_composition: u32,
    frames: u64,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(ViewSettings::default())
    }
}

impl RenderContext {
    pub fn new(settings: ViewSettings) -> Self {
        let page_time = settings.default_page_time;
        Self {
            settings,
            recordings: BTreeMap::new(),
            compositions: BTreeMap::new(),
            page_time,
            displayed_page_time: page_time,
            front: Vec::new(),
            back: Vec::new(),
            plan: FramePlan::default(),
            traces: HashMap::new(),
            next_recording: 1,
            next_composition: 1,
            frames: 0,
        }
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    // ========================================================================
    // Recordings
    // ========================================================================

    /// Take ownership of an open recording
    pub fn open_recording(&mut self, store: Box<dyn RecordStore>) -> Result<RecordingId, ViewError> {
        let header = store.header();
        if header.record_duration() <= 0 {
            return Err(ViewError::Configuration(format!(
                "record duration must be positive, got {}",
                header.record_duration()
            )));
        }

        let id = RecordingId(self.next_recording);
        self.next_recording += 1;
        tracing::info!(
            "Opened {}: {} records of {}, {} channels",
            id,
            header.total_records(),
            format_offset(header.record_duration()),
            header.channels.len()
        );
        self.recordings.insert(
            id,
            Recording {
                store,
                view_time: 0,
                displayed_view_time: 0,
                prefilter_time: 0,
                prefilter_start_time: 0,
            },
        );
        Ok(id)
    }

    /// Open a file with buffered reads
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<RecordingId, ViewError> {
        let store = FileStore::open(path)?;
        self.open_recording(Box::new(store))
    }

    /// Open a file through a memory map
    pub fn open_mapped(&mut self, path: impl AsRef<Path>) -> Result<RecordingId, ViewError> {
        let store = MappedStore::open(path)?;
        self.open_recording(Box::new(store))
    }

    /// Close a recording and drop every composition built on it
    pub fn close_recording(&mut self, id: RecordingId) -> Result<(), ViewError> {
        self.recordings.remove(&id).ok_or(ViewError::UnknownRecording(id))?;
        self.compositions.retain(|_, c| c.recording() != id);
        self.traces.retain(|cid, _| self.compositions.contains_key(cid));
        tracing::info!("Closed {}", id);
        Ok(())
    }

    pub fn header(&self, id: RecordingId) -> Result<&RecordingHeader, ViewError> {
        self.recording(id).map(|r| r.store.header())
    }

    pub fn recording_ids(&self) -> impl Iterator<Item = RecordingId> + '_ {
        self.recordings.keys().copied()
    }

    fn recording(&self, id: RecordingId) -> Result<&Recording, ViewError> {
        self.recordings.get(&id).ok_or(ViewError::UnknownRecording(id))
    }

    // ========================================================================
    // Compositions
    // ========================================================================

    /// Build a composition on an open recording.
    ///
    /// Construction errors reject the composition; it never joins the
    /// active set in a degraded form. It has no samples until the next frame.
    pub fn add_composition(&mut self, recording: RecordingId, spec: CompositionSpec) -> Result<CompositionId, ViewError> {
        let header = self.recording(recording)?.store.header();
        let id = CompositionId(self.next_composition);
        let composition = SignalComposition::build(id, recording, header, spec)?;
        self.next_composition += 1;
        self.compositions.insert(id, composition);
        Ok(id)
    }

    pub fn remove_composition(&mut self, id: CompositionId) -> Result<SignalComposition, ViewError> {
        self.traces.remove(&id);
        self.compositions.remove(&id).ok_or(ViewError::UnknownComposition(id))
    }

    pub fn composition(&self, id: CompositionId) -> Result<&SignalComposition, ViewError> {
        self.compositions.get(&id).ok_or(ViewError::UnknownComposition(id))
    }

    pub fn compositions(&self) -> impl Iterator<Item = &SignalComposition> {
        self.compositions.values()
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Request a view time for one recording; takes effect on the next frame
    pub fn set_view_time(&mut self, id: RecordingId, view_time: i64) -> Result<(), ViewError> {
        let recording = self.recordings.get_mut(&id).ok_or(ViewError::UnknownRecording(id))?;
        recording.view_time = view_time;
        Ok(())
    }

    /// Request the page duration; takes effect on the next frame
    pub fn set_page_time(&mut self, page_time: i64) -> Result<(), ViewError> {
        if page_time <= 0 {
            return Err(ViewError::Configuration(format!("page time must be positive, got {}", page_time)));
        }
        self.page_time = page_time;
        Ok(())
    }

    pub fn page_time(&self) -> i64 {
        self.page_time
    }

    /// View time of the frame on screen
    pub fn view_time(&self, id: RecordingId) -> Result<i64, ViewError> {
        self.recording(id).map(|r| r.displayed_view_time)
    }

    /// Warm-up used for the frame on screen, in ticks
    pub fn prefilter_time(&self, id: RecordingId) -> Result<i64, ViewError> {
        self.recording(id).map(|r| r.prefilter_time)
    }

    /// Tick where the warm-up of the frame on screen began
    pub fn prefilter_start_time(&self, id: RecordingId) -> Result<i64, ViewError> {
        self.recording(id).map(|r| r.prefilter_start_time)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Move every recording to `view_time` with the given page, then build
    /// the frame
    pub fn materialize_at(
        &mut self,
        view_time: i64,
        page_time: i64,
        cancel: CancelCheck<'_>,
    ) -> Result<FrameSummary, ViewError> {
        self.set_page_time(page_time)?;
        for recording in self.recordings.values_mut() {
            recording.view_time = view_time;
        }
        self.materialize(cancel)
    }

    /// Build and commit the frame for the requested view times and page.
    ///
    /// If the buffer would not fit under the ceiling, the page is shortened
    /// to the fallback page time and the frame retried once. On any error
    /// the requested view times and page revert to the frame on screen and
    /// nothing else changes.
    pub fn materialize(&mut self, cancel: CancelCheck<'_>) -> Result<FrameSummary, ViewError> {
        let requested = self.page_time;
        let mut result = self.build_frame(requested, cancel);

        if let Err(ViewError::Capacity { requested: bytes, ceiling }) = result {
            let fallback = requested.min(self.settings.fallback_page_time);
            if fallback < requested {
                tracing::warn!(
                    "View buffer of {} bytes exceeds {} bytes, retrying with a {} page",
                    bytes,
                    ceiling,
                    format_offset(fallback)
                );
                result = self.build_frame(fallback, cancel);
            }
        }

        match result {
            Ok(frame) => Ok(self.commit(frame, requested)),
            Err(e) => {
                for recording in self.recordings.values_mut() {
                    recording.view_time = recording.displayed_view_time;
                }
                self.page_time = self.displayed_page_time;
                tracing::warn!("Frame abandoned: {}", e);
                Err(e)
            }
        }
    }

    fn build_frame(&mut self, page_time: i64, cancel: CancelCheck<'_>) -> Result<PendingFrame, ViewError> {
        let pre_time = frame_warmup(self.compositions.values());
        let targets = self
            .compositions
            .values()
            .map(|c| {
                let recording = self.recording(c.recording())?;
                let prefilter = if c.is_stateful() {
                    prefilter_time(pre_time, recording.view_time)
                } else {
                    0
                };
                Ok(PlanTarget {
                    recording: c.recording(),
                    view_time: recording.view_time,
                    prefilter_time: prefilter,
                    header: recording.store.header(),
                })
            })
            .collect::<Result<Vec<_>, ViewError>>()?;
        let frame_plan = plan(targets, page_time, self.settings.buffer_ceiling())?;

        let mut chains = Vec::with_capacity(self.compositions.len());
        let mut layouts = Vec::with_capacity(self.compositions.len());
        let mut warmups = Vec::with_capacity(frame_plan.recordings.len());
        let mut reads = 0;

        self.back.clear();
        self.back.resize(frame_plan.total_bytes, 0);
        for recording_plan in &frame_plan.recordings {
            let id = recording_plan.recording;
            let recording = self
                .recordings
                .get_mut(&id)
                .ok_or(ViewError::UnknownRecording(id))?;
            let record_duration = recording.store.header().record_duration();
            let warmup_region =
                &mut self.back[recording_plan.warmup_offset..recording_plan.warmup_offset + recording_plan.warmup_bytes];
            if let Some(w) = &recording_plan.warmup {
                reads += read_warmup(recording.store.as_mut(), w, warmup_region, cancel)?;
            }

            for composition in self.compositions.values().filter(|c| c.recording() == id) {
                let mut chain = composition.chain().clone();
                let prefilter_samples = match &recording_plan.warmup {
                    Some(w) if composition.is_stateful() => replay(composition, &mut chain, warmup_region, w, cancel)?,
                    _ => {
                        let layout = composition_layout(composition, recording_plan, page_time, record_duration, 0);
                        checkpoint_at(&mut chain, layout.first_visible_sample(composition.samples_per_record()));
                        0
                    }
                };
                let layout =
                    composition_layout(composition, recording_plan, page_time, record_duration, prefilter_samples);
                chains.push((composition.id(), chain));
                layouts.push((composition.id(), layout));
            }
            warmups.push((id, recording_plan.prefilter_time(), recording_plan.prefilter_start_time()));

            check_cancel(cancel)?;
            if read_visible(recording.store.as_mut(), recording_plan, &mut self.back)? > 0 {
                reads += 1;
            }
        }

        Ok(PendingFrame {
            plan: frame_plan,
            chains,
            layouts,
            warmups,
            reads,
            warmup_ticks: pre_time,
        })
    }

    fn commit(&mut self, frame: PendingFrame, requested_page: i64) -> FrameSummary {
        std::mem::swap(&mut self.front, &mut self.back);

        for (id, chain) in frame.chains {
            if let Some(c) = self.compositions.get_mut(&id) {
                c.chain = chain;
            }
        }
        for (id, layout) in frame.layouts {
            if let Some(c) = self.compositions.get_mut(&id) {
                c.frame = layout;
            }
        }
        for recording in self.recordings.values_mut() {
            recording.displayed_view_time = recording.view_time;
        }
        for (id, prefilter, start) in frame.warmups {
            if let Some(r) = self.recordings.get_mut(&id) {
                r.prefilter_time = prefilter;
                r.prefilter_start_time = start;
            }
        }

        let page_time = frame.plan.page_time;
        self.page_time = page_time;
        self.displayed_page_time = page_time;
        self.traces.clear();
        self.frames += 1;

        let summary = FrameSummary {
            page_time,
            page_clamped: page_time < requested_page,
            bytes: frame.plan.total_bytes,
            reads: frame.reads,
            warmup_ticks: frame.warmup_ticks,
            recordings: frame.plan.recordings.len(),
            compositions: self.compositions.len(),
        };
        self.plan = frame.plan;

        tracing::info!(
            "Frame {}: page {}, {} recording(s), {} composition(s), {} bytes in {} read(s), warm-up {}",
            self.frames,
            format_offset(summary.page_time),
            summary.recordings,
            summary.compositions,
            summary.bytes,
            summary.reads,
            format_offset(summary.warmup_ticks)
        );
        summary
    }

    /// The view buffer of the frame on screen
    pub fn buffer(&self) -> &[u8] {
        &self.front
    }

    /// Buffer layout of the frame on screen
    pub fn frame_plan(&self) -> &FramePlan {
        &self.plan
    }

    /// Frames committed so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    // ========================================================================
    // Traces
    // ========================================================================

    /// Filter the visible samples of a composition from its warm-up
    /// checkpoint
    pub fn filtered_trace(&mut self, id: CompositionId) -> Result<Trace, ViewError> {
        let composition = self.compositions.get_mut(&id).ok_or(ViewError::UnknownComposition(id))?;
        let trace = extract(composition, &self.front);
        self.traces.insert(id, trace.clone());
        Ok(trace)
    }

    /// Filtered value at a screen position; `None` where the frame holds no
    /// data
    pub fn filtered_sample(&mut self, id: CompositionId, position: usize) -> Result<Option<f64>, ViewError> {
        if let Some(trace) = self.traces.get(&id) {
            return Ok(trace.get(position));
        }
        Ok(self.filtered_trace(id)?.get(position))
    }

    /// Filtered traces of every composition, in id order.
    ///
    /// With [`ViewSettings::parallel_traces`] set, compositions are filtered
    /// on the rayon pool; each one still runs in temporal order.
    pub fn filtered_traces(&mut self) -> Vec<Trace> {
        let front = &self.front;
        let traces: Vec<Trace> = if self.settings.parallel_traces {
            self.compositions.par_iter_mut().map(|(_, c)| extract(c, front)).collect()
        } else {
            self.compositions.values_mut().map(|c| extract(c, front)).collect()
        };
        for trace in &traces {
            self.traces.insert(trace.composition, trace.clone());
        }
        traces
    }
}

// ============================================================================
// Shared access
// ============================================================================

/// A render context shared between threads.
///
/// Navigation requests never queue: a request made while another is still
/// building its frame fails with [`ViewError::Busy`].
#[derive(Clone)]
pub struct SharedRenderContext {
    inner: Arc<Mutex<RenderContext>>,
}

impl SharedRenderContext {
    pub fn new(context: RenderContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    fn enter(&self) -> Result<MutexGuard<'_, RenderContext>, ViewError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(ViewError::Busy),
            // Frames commit atomically, so a panic mid-frame leaves the
            // displayed state intact
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    /// Move to a new view and build its frame
    pub fn navigate(&self, view_time: i64, page_time: i64, cancel: CancelCheck<'_>) -> Result<FrameSummary, ViewError> {
        self.enter()?.materialize_at(view_time, page_time, cancel)
    }

    /// Run `f` with exclusive access to the context
    pub fn with<R>(&self, f: impl FnOnce(&mut RenderContext) -> R) -> Result<R, ViewError> {
        let mut guard = self.enter()?;
        Ok(f(&mut guard))
    }
}
