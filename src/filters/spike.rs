//! Velocity-triggered spike suppression.

use super::{FilterError, SignalFilter};
use crate::clock::TICKS_PER_SECOND;

/// Lowest sample rate the velocity measurement works at
pub const MIN_SAMPLE_RATE: f64 = 4000.0;

/// Accepted hold-off, in milliseconds
pub const HOLDOFF_RANGE_MS: (u32, u32) = (10, 1000);

/// Interval over which velocity is measured, in seconds
const VELOCITY_INTERVAL: f64 = 0.0005;

#[derive(Clone, Debug, PartialEq)]
struct SpikeState {
    history: Vec<f64>,
    index: usize,
    primed: bool,
    holdoff_left: usize,
    last_accepted: f64,
}

/// Replaces fast transients with the last accepted value.
///
/// When the signal changes by more than `velocity` within 0.5 ms, the output
/// freezes at the last accepted sample for the hold-off period.
#[derive(Clone, Debug)]
pub struct SpikeFilter {
    velocity: f64,
    holdoff_samples: usize,
    state: SpikeState,
    saved: SpikeState,
}

impl SpikeFilter {
    pub fn new(velocity: f64, holdoff_ms: u32, sample_rate: f64) -> Result<Self, FilterError> {
        if sample_rate < MIN_SAMPLE_RATE {
            return Err(FilterError::SampleRateTooLow {
                rate: sample_rate,
                required: MIN_SAMPLE_RATE,
            });
        }
        if !(HOLDOFF_RANGE_MS.0..=HOLDOFF_RANGE_MS.1).contains(&holdoff_ms) {
            return Err(FilterError::InvalidParameter(format!(
                "spike hold-off {} ms must be between {} and {} ms",
                holdoff_ms, HOLDOFF_RANGE_MS.0, HOLDOFF_RANGE_MS.1
            )));
        }
        if !(velocity.is_finite() && velocity > 0.0) {
            return Err(FilterError::InvalidParameter(format!("spike velocity {}", velocity)));
        }

        let lag = ((sample_rate * VELOCITY_INTERVAL).round() as usize).max(1);
        let holdoff_samples = ((sample_rate * holdoff_ms as f64 / 1000.0).round() as usize).max(1);
        let state = SpikeState {
            history: vec![0.0; lag],
            index: 0,
            primed: false,
            holdoff_left: 0,
            last_accepted: 0.0,
        };
        Ok(Self {
            velocity,
            holdoff_samples,
            saved: state.clone(),
            state,
        })
    }

    /// Samples spanned by the velocity measurement
    pub fn lag(&self) -> usize {
        self.state.history.len()
    }
}

impl SignalFilter for SpikeFilter {
    fn apply(&mut self, x: f64) -> f64 {
        let s = &mut self.state;
        if !s.primed {
            s.history.fill(x);
            s.last_accepted = x;
            s.primed = true;
        }

        // Oldest entry is the sample `lag` periods back
        let before = s.history[s.index];
        s.history[s.index] = x;
        s.index = (s.index + 1) % s.history.len();

        if s.holdoff_left > 0 {
            s.holdoff_left -= 1;
            return s.last_accepted;
        }
        if (x - before).abs() > self.velocity {
            s.holdoff_left = self.holdoff_samples - 1;
            return s.last_accepted;
        }
        s.last_accepted = x;
        x
    }

    fn save_state(&mut self) {
        self.saved.clone_from(&self.state);
    }

    fn restore_state(&mut self) {
        self.state.clone_from(&self.saved);
    }

    fn reset(&mut self) {
        let s = &mut self.state;
        s.history.fill(0.0);
        s.index = 0;
        s.primed = false;
        s.holdoff_left = 0;
        s.last_accepted = 0.0;
    }

    fn warmup_ticks(&self) -> i64 {
        5 * TICKS_PER_SECOND
    }
}
