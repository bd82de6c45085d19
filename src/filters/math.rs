//! Point-wise math functions applied before or after the filter stages.

use serde::{Deserialize, Serialize};

use super::FilterError;
use crate::clock::TICKS_PER_SECOND;

/// A math function in a composition's processing chain
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MathFunc {
    Square,
    /// Square root of the magnitude, keeping the sign
    Sqrt,
    Abs,
    /// Hold the largest value for `hold_ms` before following the signal down
    PeakHold { hold_ms: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PeakState {
    peak: f64,
    left: usize,
    primed: bool,
}

/// Runnable math function, with state for peak hold
#[derive(Clone, Debug)]
pub struct MathStage {
    func: MathFunc,
    hold_samples: usize,
    state: PeakState,
    saved: PeakState,
}

impl MathStage {
    pub fn new(func: MathFunc, sample_rate: f64) -> Result<Self, FilterError> {
        let hold_samples = match func {
            MathFunc::PeakHold { hold_ms } => {
                if hold_ms == 0 {
                    return Err(FilterError::InvalidParameter("peak hold time must be positive".to_string()));
                }
                ((sample_rate * hold_ms as f64 / 1000.0).round() as usize).max(1)
            }
            _ => 0,
        };
        Ok(Self {
            func,
            hold_samples,
            state: PeakState::default(),
            saved: PeakState::default(),
        })
    }

    pub fn func(&self) -> MathFunc {
        self.func
    }

    #[inline]
    pub fn apply(&mut self, x: f64) -> f64 {
        match self.func {
            MathFunc::Square => x * x,
            MathFunc::Sqrt => x.signum() * x.abs().sqrt(),
            MathFunc::Abs => x.abs(),
            MathFunc::PeakHold { .. } => {
                let s = &mut self.state;
                if !s.primed || x >= s.peak || s.left == 0 {
                    s.peak = x;
                    s.left = self.hold_samples;
                    s.primed = true;
                } else {
                    s.left -= 1;
                }
                s.peak
            }
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self.func, MathFunc::PeakHold { .. })
    }

    /// One hold time for peak hold, nothing for point-wise functions
    pub fn warmup_ticks(&self) -> i64 {
        match self.func {
            MathFunc::PeakHold { hold_ms } => hold_ms as i64 * TICKS_PER_SECOND / 1000,
            _ => 0,
        }
    }

    pub fn save_state(&mut self) {
        self.saved = self.state;
    }

    pub fn restore_state(&mut self) {
        self.state = self.saved;
    }

    pub fn reset(&mut self) {
        self.state = PeakState::default();
    }
}
