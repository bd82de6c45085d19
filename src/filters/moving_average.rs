//! Running-mean highpass and lowpass.

use super::{FilterError, SignalFilter};
use crate::clock;

/// Accepted window sizes, in samples
pub const WINDOW_RANGE: (usize, usize) = (2, 10_000);

#[derive(Clone, Debug, PartialEq)]
struct Window {
    buffer: Vec<f64>,
    sum: f64,
    index: usize,
    primed: bool,
}

/// Mean over the last `window` samples. The lowpass outputs the mean, the
/// highpass the input minus the mean.
///
/// On the first sample after a reset the window is filled with that sample,
/// so the output starts settled instead of ramping up from zero.
#[derive(Clone, Debug)]
pub struct MovingAverageFilter {
    highpass: bool,
    sample_rate: f64,
    state: Window,
    saved: Window,
}

impl MovingAverageFilter {
    pub fn new(highpass: bool, window: usize, sample_rate: f64) -> Result<Self, FilterError> {
        if !(WINDOW_RANGE.0..=WINDOW_RANGE.1).contains(&window) {
            return Err(FilterError::InvalidParameter(format!(
                "moving average window {} must be between {} and {}",
                window, WINDOW_RANGE.0, WINDOW_RANGE.1
            )));
        }
        let state = Window {
            buffer: vec![0.0; window],
            sum: 0.0,
            index: 0,
            primed: false,
        };
        Ok(Self {
            highpass,
            sample_rate,
            saved: state.clone(),
            state,
        })
    }

    pub fn window(&self) -> usize {
        self.state.buffer.len()
    }
}

impl SignalFilter for MovingAverageFilter {
    #[inline]
    fn apply(&mut self, x: f64) -> f64 {
        let w = &mut self.state;
        let n = w.buffer.len();
        if !w.primed {
            w.buffer.fill(x);
            w.sum = x * n as f64;
            w.primed = true;
        }
        w.sum += x - w.buffer[w.index];
        w.buffer[w.index] = x;
        w.index = (w.index + 1) % n;

        let mean = w.sum / n as f64;
        if self.highpass {
            x - mean
        } else {
            mean
        }
    }

    fn save_state(&mut self) {
        self.saved.clone_from(&self.state);
    }

    fn restore_state(&mut self) {
        self.state.clone_from(&self.saved);
    }

    fn reset(&mut self) {
        let w = &mut self.state;
        w.buffer.fill(0.0);
        w.sum = 0.0;
        w.index = 0;
        w.primed = false;
    }

    /// `window + 3` sample periods
    fn warmup_ticks(&self) -> i64 {
        clock::ticks_for_samples(self.window() + 3, self.sample_rate)
    }
}
