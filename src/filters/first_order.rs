//! Single-pole IIR highpass and lowpass.

use std::f64::consts::PI;

use super::{check_frequency, FilterError, SignalFilter};
use crate::clock;

/// Exponential smoother; the highpass output is the input minus the smoothed
/// value
#[derive(Clone, Debug)]
pub struct FirstOrderFilter {
    highpass: bool,
    cutoff_hz: f64,
    alpha: f64,
    state: f64,
    saved: f64,
}

impl FirstOrderFilter {
    pub fn new(highpass: bool, cutoff_hz: f64, sample_rate: f64) -> Result<Self, FilterError> {
        check_frequency("cutoff", cutoff_hz, sample_rate)?;
        let alpha = 1.0 - (-2.0 * PI * cutoff_hz / sample_rate).exp();
        Ok(Self {
            highpass,
            cutoff_hz,
            alpha,
            state: 0.0,
            saved: 0.0,
        })
    }

    pub fn is_highpass(&self) -> bool {
        self.highpass
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }
}

impl SignalFilter for FirstOrderFilter {
    #[inline]
    fn apply(&mut self, x: f64) -> f64 {
        self.state += self.alpha * (x - self.state);
        if self.highpass {
            x - self.state
        } else {
            self.state
        }
    }

    fn save_state(&mut self) {
        self.saved = self.state;
    }

    fn restore_state(&mut self) {
        self.state = self.saved;
    }

    fn reset(&mut self) {
        self.state = 0.0;
    }

    /// One period of the cutoff frequency
    fn warmup_ticks(&self) -> i64 {
        clock::ticks_for_period(self.cutoff_hz)
    }
}
