//! Powerline interference subtraction.
//!
//! A moving average over exactly one line period cancels the line frequency
//! and all its harmonics, which gives a clean estimate of the signal. The
//! residual is accumulated into a per-phase interference template while the
//! signal is locally linear, and the template is subtracted from the input.
//! Steep signal segments (QRS complexes, spikes) leave the template alone, so
//! they pass undistorted.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::{FilterError, SignalFilter};
use crate::clock::TICKS_PER_SECOND;

/// Lowest sample rate the subtraction method supports
pub const MIN_SAMPLE_RATE: f64 = 100.0;

/// Template update weight per period
const ADAPT_RATE: f64 = 0.1;

/// Signal type the filter is tuned for
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PowerlineVariant {
    Ecg,
    Eeg,
}

impl PowerlineVariant {
    /// Largest change over one period still treated as linear, in physical units
    pub fn default_threshold(self) -> f64 {
        match self {
            PowerlineVariant::Ecg => 100.0,
            PowerlineVariant::Eeg => 20.0,
        }
    }

    fn warmup_ticks(self) -> i64 {
        match self {
            PowerlineVariant::Ecg => 2 * TICKS_PER_SECOND,
            PowerlineVariant::Eeg => TICKS_PER_SECOND,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct PowerlineState {
    period: Vec<f64>,
    sum: f64,
    index: usize,
    primed: bool,
    template: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct PowerlineFilter {
    line_hz: u32,
    variant: PowerlineVariant,
    threshold: f64,
    state: PowerlineState,
    saved: PowerlineState,
}

impl PowerlineFilter {
    pub fn new(
        line_hz: u32,
        variant: PowerlineVariant,
        threshold: Option<f64>,
        sample_rate: f64,
    ) -> Result<Self, FilterError> {
        if line_hz != 50 && line_hz != 60 {
            return Err(FilterError::InvalidParameter(format!(
                "line frequency {} Hz must be 50 or 60 Hz",
                line_hz
            )));
        }
        if sample_rate < MIN_SAMPLE_RATE {
            return Err(FilterError::SampleRateTooLow {
                rate: sample_rate,
                required: MIN_SAMPLE_RATE,
            });
        }
        let ratio = sample_rate / line_hz as f64;
        if (ratio - ratio.round()).abs() > 1e-9 {
            return Err(FilterError::SampleRateMismatch {
                rate: sample_rate,
                multiple_of: line_hz as f64,
            });
        }
        let threshold = threshold.unwrap_or_else(|| variant.default_threshold());
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(FilterError::InvalidParameter(format!("linear threshold {}", threshold)));
        }

        let n = ratio.round() as usize;
        let state = PowerlineState {
            period: vec![0.0; n],
            sum: 0.0,
            index: 0,
            primed: false,
            template: vec![0.0; n],
        };
        Ok(Self {
            line_hz,
            variant,
            threshold,
            saved: state.clone(),
            state,
        })
    }

    pub fn line_hz(&self) -> u32 {
        self.line_hz
    }

    pub fn variant(&self) -> PowerlineVariant {
        self.variant
    }

    /// Samples per line period
    pub fn period_samples(&self) -> usize {
        self.state.period.len()
    }
}

impl SignalFilter for PowerlineFilter {
    fn apply(&mut self, x: f64) -> f64 {
        let s = &mut self.state;
        let n = s.period.len();
        if !s.primed {
            s.period.fill(x);
            s.sum = x * n as f64;
            s.primed = true;
        }

        let phase = s.index;
        let one_period_ago = s.period[phase];
        s.sum += x - one_period_ago;
        s.period[phase] = x;
        s.index = (phase + 1) % n;

        if (x - one_period_ago).abs() < self.threshold {
            let residual = x - s.sum / n as f64;
            s.template[phase] += ADAPT_RATE * (residual - s.template[phase]);
        }
        x - s.template[phase]
    }

    fn save_state(&mut self) {
        self.saved.clone_from(&self.state);
    }

    fn restore_state(&mut self) {
        self.state.clone_from(&self.saved);
    }

    fn reset(&mut self) {
        let s = &mut self.state;
        s.period.fill(0.0);
        s.template.fill(0.0);
        s.sum = 0.0;
        s.index = 0;
        s.primed = false;
    }

    fn warmup_ticks(&self) -> i64 {
        self.variant.warmup_ticks()
    }
}
