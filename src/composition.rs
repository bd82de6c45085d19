//! Signal compositions: derived channels built from raw channels.
//!
//! A composition is a weighted sum of channels from one recording, passed
//! through an ordered chain of pre-sum math, filters and post math. The
//! serializable [`CompositionSpec`] carries everything needed to rebuild the
//! composition; [`SignalComposition`] is the built, runnable form together
//! with the bookkeeping of the last materialized frame.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::filters::{FilterChain, FilterSpec, MathFunc};
use crate::recording::{decode_sample, RecordingHeader, SampleFormat};
use crate::viewbuf::ViewError;

/// Stable identity of an open recording within a render context
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordingId(pub u32);

/// Stable identity of a composition within a render context
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositionId(pub u32);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recording #{}", self.0)
    }
}

impl fmt::Display for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composition #{}", self.0)
    }
}

/// One raw channel in a composition
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelTerm {
    /// Channel index in the recording header
    pub channel: usize,
    /// Signed weight applied to the channel's physical value
    pub coefficient: f64,
}

/// Serializable description of a composition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionSpec {
    pub label: String,
    pub terms: Vec<ChannelTerm>,
    /// Applied to the summed value before the filters
    #[serde(default)]
    pub pre_math: Vec<MathFunc>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Applied to the filtered value
    #[serde(default)]
    pub post_math: Vec<MathFunc>,
}

impl CompositionSpec {
    /// A single channel with unit weight and no processing
    pub fn single(label: impl Into<String>, channel: usize) -> Self {
        Self {
            label: label.into(),
            terms: vec![ChannelTerm {
                channel,
                coefficient: 1.0,
            }],
            pre_math: Vec::new(),
            filters: Vec::new(),
            post_math: Vec::new(),
        }
    }

    /// Add another weighted channel
    pub fn with_term(mut self, channel: usize, coefficient: f64) -> Self {
        self.terms.push(ChannelTerm { channel, coefficient });
        self
    }

    /// Append a filter stage
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_pre_math(mut self, func: MathFunc) -> Self {
        self.pre_math.push(func);
        self
    }

    pub fn with_post_math(mut self, func: MathFunc) -> Self {
        self.post_math.push(func);
        self
    }
}

/// A channel term resolved against the recording layout
#[derive(Clone, Copy, Debug)]
struct ResolvedTerm {
    byte_offset: usize,
    gain: f64,
    offset: f64,
    coefficient: f64,
}

/// Per-frame bookkeeping of a composition, read by the renderer
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameLayout {
    /// Byte offset of the recording's region in the shared view buffer
    pub buffer_offset: usize,
    /// First record held in the region
    pub first_record: u64,
    /// Records held in the region, including zero-filled ones
    pub records: usize,
    /// Samples of this composition held in the region
    pub samples: usize,
    /// Samples that came from the recording rather than zero fill
    pub valid_samples: usize,
    /// Samples replayed through the filters before the visible window
    pub prefilter_samples: u64,
    /// Sample positions spanned by the page
    pub samples_on_screen: usize,
    /// First screen position holding data
    pub sample_start: usize,
    /// One past the last screen position holding data
    pub sample_stop: usize,
    /// Whole samples between the region start and the view time
    pub sample_timeoffset: usize,
    /// Fraction of a sample between the region start and the view time
    pub sample_timeoffset_part: f64,
}

impl FrameLayout {
    /// Region sample index shown at screen position `position`
    #[inline]
    pub fn buffer_index(&self, position: usize) -> Option<usize> {
        if position < self.sample_start || position >= self.sample_stop {
            return None;
        }
        Some(position - self.sample_start + self.sample_timeoffset)
    }

    /// Number of screen positions holding data
    pub fn visible_samples(&self) -> usize {
        self.sample_stop.saturating_sub(self.sample_start)
    }

    /// Absolute sample index shown at the first data position
    pub fn first_visible_sample(&self, samples_per_record: usize) -> u64 {
        self.first_record * samples_per_record as u64 + self.sample_timeoffset as u64
    }
}

/// A built composition
#[derive(Clone, Debug)]
pub struct SignalComposition {
    id: CompositionId,
    recording: RecordingId,
    spec: CompositionSpec,
    terms: Vec<ResolvedTerm>,
    format: SampleFormat,
    record_size: usize,
    samples_per_record: usize,
    sample_rate: f64,
    pub(crate) chain: FilterChain,
    pub(crate) frame: FrameLayout,
}

impl SignalComposition {
    /// Validate `spec` against the recording and build its filter chain
    pub fn build(
        id: CompositionId,
        recording: RecordingId,
        header: &RecordingHeader,
        spec: CompositionSpec,
    ) -> Result<Self, ViewError> {
        let first = spec
            .terms
            .first()
            .ok_or_else(|| ViewError::Configuration(format!("composition '{}' has no channels", spec.label)))?;

        let channel_info = |index: usize| {
            header.channels.get(index).ok_or_else(|| {
                ViewError::Configuration(format!(
                    "composition '{}' references channel {} but the recording has {}",
                    spec.label,
                    index,
                    header.channels.len()
                ))
            })
        };

        let samples_per_record = channel_info(first.channel)?.samples_per_record;
        let mut terms = Vec::with_capacity(spec.terms.len());
        for term in &spec.terms {
            let info = channel_info(term.channel)?;
            if info.is_annotation {
                return Err(ViewError::Configuration(format!(
                    "channel '{}' is an annotation channel",
                    info.label
                )));
            }
            if info.samples_per_record != samples_per_record {
                return Err(ViewError::Configuration(format!(
                    "composition '{}' sums channels with different sample rates ({} and {} samples per record)",
                    spec.label, samples_per_record, info.samples_per_record
                )));
            }
            if !term.coefficient.is_finite() {
                return Err(ViewError::Configuration(format!(
                    "channel '{}' has a non-finite coefficient",
                    info.label
                )));
            }
            terms.push(ResolvedTerm {
                byte_offset: info.byte_offset,
                gain: info.gain,
                offset: info.offset,
                coefficient: term.coefficient,
            });
        }
        if samples_per_record == 0 {
            return Err(ViewError::Configuration(format!(
                "composition '{}' uses a channel with no samples",
                spec.label
            )));
        }

        let sample_rate = header
            .sample_rate(first.channel)
            .ok_or_else(|| ViewError::Configuration("invalid record duration".to_string()))?;
        let chain = FilterChain::build(&spec.pre_math, &spec.filters, &spec.post_math, sample_rate)?;

        tracing::debug!(
            "Built {} '{}': {} channel(s) at {} Hz, {} filter stage(s)",
            id,
            spec.label,
            terms.len(),
            sample_rate,
            chain.stages().len()
        );

        Ok(Self {
            id,
            recording,
            terms,
            format: header.format,
            record_size: header.record_size(),
            samples_per_record,
            sample_rate,
            spec,
            chain,
            frame: FrameLayout::default(),
        })
    }

    pub fn id(&self) -> CompositionId {
        self.id
    }

    pub fn recording(&self) -> RecordingId {
        self.recording
    }

    pub fn spec(&self) -> &CompositionSpec {
        &self.spec
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn samples_per_record(&self) -> usize {
        self.samples_per_record
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Bookkeeping of the last materialized frame
    pub fn frame(&self) -> &FrameLayout {
        &self.frame
    }

    pub fn is_stateful(&self) -> bool {
        self.chain.is_stateful()
    }

    /// Warm-up this composition needs, in ticks
    pub fn warmup_ticks(&self) -> i64 {
        self.chain.warmup_ticks()
    }

    /// Summed physical value of sample `index` of a region of whole records.
    ///
    /// `region` starts at a record boundary; `index` counts this
    /// composition's samples from the start of the region.
    #[inline]
    pub fn sample_value(&self, region: &[u8], index: usize) -> f64 {
        let record = index / self.samples_per_record;
        let within = index % self.samples_per_record;
        let bps = self.format.bytes_per_sample();
        let base = record * self.record_size + within * bps;

        self.terms
            .iter()
            .map(|t| {
                let at = base + t.byte_offset;
                let digital = decode_sample(self.format, &region[at..at + bps]);
                t.coefficient * t.gain * (digital as f64 + t.offset)
            })
            .sum()
    }
}
