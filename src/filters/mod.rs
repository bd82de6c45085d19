//! Stateful filter primitives applied to composed signals.
//!
//! Every filter runs sample by sample and owns its running state plus one
//! saved snapshot. The view-buffer code warms filters up on the data that
//! precedes the visible window, checkpoints them with
//! [`SignalFilter::save_state`], and rewinds to that checkpoint with
//! [`SignalFilter::restore_state`] every time it extracts the visible trace.
//!
//! Filter parameters live in [`FilterSpec`], which is plain serializable data
//! in physical units. [`FilterSpec::build`] turns a spec into a runnable
//! [`FilterStage`] for a given sample rate, validating the constraints of
//! each variant.

pub mod ecg;
pub mod fir;
pub mod first_order;
pub mod iir;
pub mod math;
pub mod moving_average;
pub mod powerline;
pub mod spike;
pub mod zratio;

pub use ecg::EcgFilter;
pub use fir::{windowed_sinc_lowpass, FirFilter};
pub use first_order::FirstOrderFilter;
pub use iir::{IirBand, IirFilter, IirModel};
pub use math::{MathFunc, MathStage};
pub use moving_average::MovingAverageFilter;
pub use powerline::{PowerlineFilter, PowerlineVariant};
pub use spike::SpikeFilter;
pub use zratio::ZRatioFilter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised when a filter cannot be built for a channel
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("Invalid filter parameter: {0}")]
    InvalidParameter(String),

    #[error("Sample rate {rate} Hz is below the {required} Hz this filter needs")]
    SampleRateTooLow { rate: f64, required: f64 },

    #[error("Sample rate {rate} Hz is not an integer multiple of {multiple_of} Hz")]
    SampleRateMismatch { rate: f64, multiple_of: f64 },

    #[error("Block of {samples} samples is too small, need at least {required}")]
    BlockTooSmall { samples: f64, required: usize },
}

// ============================================================================
// Filter contract
// ============================================================================

/// Uniform contract of every stateful filter
pub trait SignalFilter {
    /// Filter one sample
    fn apply(&mut self, x: f64) -> f64;

    /// Copy the running state into the saved snapshot
    fn save_state(&mut self);

    /// Copy the saved snapshot back into the running state
    fn restore_state(&mut self);

    /// Return the running state to its initial value; the saved snapshot
    /// is left alone
    fn reset(&mut self);

    /// Data this filter needs to reach steady state, in ticks
    fn warmup_ticks(&self) -> i64;
}

/// Check a cutoff frequency against the Nyquist limit
pub(crate) fn check_frequency(name: &str, hz: f64, sample_rate: f64) -> Result<(), FilterError> {
    if !(hz > 0.0 && hz < sample_rate / 2.0) {
        return Err(FilterError::InvalidParameter(format!(
            "{} {} Hz must be above 0 and below {} Hz",
            name,
            hz,
            sample_rate / 2.0
        )));
    }
    Ok(())
}

/// One stage of a composition's filter chain
#[derive(Clone, Debug)]
pub enum FilterStage {
    FirstOrder(FirstOrderFilter),
    Iir(IirFilter),
    MovingAverage(MovingAverageFilter),
    Fir(FirFilter),
    Spike(SpikeFilter),
    Powerline(PowerlineFilter),
    Ecg(EcgFilter),
    ZRatio(ZRatioFilter),
}

macro_rules! dispatch {
    ($self:ident, $f:ident => $body:expr) => {
        match $self {
            FilterStage::FirstOrder($f) => $body,
            FilterStage::Iir($f) => $body,
            FilterStage::MovingAverage($f) => $body,
            FilterStage::Fir($f) => $body,
            FilterStage::Spike($f) => $body,
            FilterStage::Powerline($f) => $body,
            FilterStage::Ecg($f) => $body,
            FilterStage::ZRatio($f) => $body,
        }
    };
}

impl SignalFilter for FilterStage {
    #[inline]
    fn apply(&mut self, x: f64) -> f64 {
        dispatch!(self, f => f.apply(x))
    }

    fn save_state(&mut self) {
        dispatch!(self, f => f.save_state())
    }

    fn restore_state(&mut self) {
        dispatch!(self, f => f.restore_state())
    }

    fn reset(&mut self) {
        dispatch!(self, f => f.reset())
    }

    fn warmup_ticks(&self) -> i64 {
        dispatch!(self, f => f.warmup_ticks())
    }
}

impl FilterStage {
    /// Position the stage at an absolute sample index of the recording.
    ///
    /// Only block-based stages care where they are; the rest ignore it.
    pub fn seek(&mut self, absolute_sample: u64) {
        if let FilterStage::ZRatio(f) = self {
            f.seek(absolute_sample);
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::FirstOrder(_) => "first-order",
            FilterStage::Iir(_) => "iir",
            FilterStage::MovingAverage(_) => "moving-average",
            FilterStage::Fir(_) => "fir",
            FilterStage::Spike(_) => "spike",
            FilterStage::Powerline(_) => "powerline",
            FilterStage::Ecg(_) => "ecg",
            FilterStage::ZRatio(_) => "z-ratio",
        }
    }
}

// ============================================================================
// Filter specs
// ============================================================================

/// Serializable description of one filter stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Single-pole highpass or lowpass
    FirstOrder { highpass: bool, cutoff_hz: f64 },
    /// Butterworth, Chebyshev or Bessel cascade
    Iir {
        model: IirModel,
        band: IirBand,
        order: usize,
        frequency_hz: f64,
        /// Upper corner for bandpass and bandstop
        #[serde(default)]
        upper_frequency_hz: Option<f64>,
        /// Passband ripple for Chebyshev
        #[serde(default)]
        ripple_db: Option<f64>,
    },
    MovingAverage { highpass: bool, window: usize },
    Fir { taps: Vec<f64> },
    /// Velocity in physical units per 0.5 ms
    Spike { velocity: f64, holdoff_ms: u32 },
    Powerline {
        line_hz: u32,
        variant: PowerlineVariant,
        #[serde(default)]
        threshold: Option<f64>,
    },
    Ecg,
    ZRatio { crossover_hz: f64 },
}

impl FilterSpec {
    /// Build a runnable stage for a channel sampled at `sample_rate` Hz
    pub fn build(&self, sample_rate: f64) -> Result<FilterStage, FilterError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(FilterError::InvalidParameter(format!("sample rate {}", sample_rate)));
        }
        let stage = match self {
            FilterSpec::FirstOrder { highpass, cutoff_hz } => {
                FilterStage::FirstOrder(FirstOrderFilter::new(*highpass, *cutoff_hz, sample_rate)?)
            }
            FilterSpec::Iir {
                model,
                band,
                order,
                frequency_hz,
                upper_frequency_hz,
                ripple_db,
            } => FilterStage::Iir(IirFilter::new(
                *model,
                *band,
                *order,
                *frequency_hz,
                *upper_frequency_hz,
                ripple_db.unwrap_or(1.0),
                sample_rate,
            )?),
            FilterSpec::MovingAverage { highpass, window } => {
                FilterStage::MovingAverage(MovingAverageFilter::new(*highpass, *window, sample_rate)?)
            }
            FilterSpec::Fir { taps } => FilterStage::Fir(FirFilter::new(taps.clone(), sample_rate)?),
            FilterSpec::Spike { velocity, holdoff_ms } => {
                FilterStage::Spike(SpikeFilter::new(*velocity, *holdoff_ms, sample_rate)?)
            }
            FilterSpec::Powerline {
                line_hz,
                variant,
                threshold,
            } => FilterStage::Powerline(PowerlineFilter::new(*line_hz, *variant, *threshold, sample_rate)?),
            FilterSpec::Ecg => FilterStage::Ecg(EcgFilter::new(sample_rate)?),
            FilterSpec::ZRatio { crossover_hz } => FilterStage::ZRatio(ZRatioFilter::new(*crossover_hz, sample_rate)?),
        };
        Ok(stage)
    }
}

// ============================================================================
// Filter chain
// ============================================================================

/// The ordered processing of one composition: pre math, filters, post math
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    pre: Vec<MathStage>,
    stages: Vec<FilterStage>,
    post: Vec<MathStage>,
}

impl FilterChain {
    /// Build every stage for the given sample rate
    pub fn build(
        pre: &[MathFunc],
        filters: &[FilterSpec],
        post: &[MathFunc],
        sample_rate: f64,
    ) -> Result<Self, FilterError> {
        let pre = pre
            .iter()
            .map(|f| MathStage::new(*f, sample_rate))
            .collect::<Result<Vec<_>, _>>()?;
        let stages = filters
            .iter()
            .map(|s| s.build(sample_rate))
            .collect::<Result<Vec<_>, _>>()?;
        let post = post
            .iter()
            .map(|f| MathStage::new(*f, sample_rate))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pre, stages, post })
    }

    /// Run one sample through every stage in order
    #[inline]
    pub fn apply(&mut self, x: f64) -> f64 {
        let mut v = x;
        for m in &mut self.pre {
            v = m.apply(v);
        }
        for s in &mut self.stages {
            v = s.apply(v);
        }
        for m in &mut self.post {
            v = m.apply(v);
        }
        v
    }

    pub fn save_state(&mut self) {
        self.pre.iter_mut().for_each(MathStage::save_state);
        self.stages.iter_mut().for_each(|s| s.save_state());
        self.post.iter_mut().for_each(MathStage::save_state);
    }

    pub fn restore_state(&mut self) {
        self.pre.iter_mut().for_each(MathStage::restore_state);
        self.stages.iter_mut().for_each(|s| s.restore_state());
        self.post.iter_mut().for_each(MathStage::restore_state);
    }

    pub fn reset(&mut self) {
        self.pre.iter_mut().for_each(MathStage::reset);
        self.stages.iter_mut().for_each(|s| s.reset());
        self.post.iter_mut().for_each(MathStage::reset);
    }

    /// Position block-based stages at an absolute sample index
    pub fn seek(&mut self, absolute_sample: u64) {
        for s in &mut self.stages {
            s.seek(absolute_sample);
        }
    }

    /// Largest warm-up requirement of any stage, in ticks
    pub fn warmup_ticks(&self) -> i64 {
        let math = self.pre.iter().chain(&self.post).map(MathStage::warmup_ticks);
        self.stages
            .iter()
            .map(|s| s.warmup_ticks())
            .chain(math)
            .max()
            .unwrap_or(0)
    }

    /// Whether the output depends on samples before the current one
    pub fn is_stateful(&self) -> bool {
        !self.stages.is_empty() || self.pre.iter().chain(&self.post).any(MathStage::is_stateful)
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.stages.is_empty() && self.post.is_empty()
    }
}
