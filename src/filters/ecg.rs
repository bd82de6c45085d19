//! QRS detection producing a heart-rate trace.
//!
//! Pan-Tompkins style: derivative, squaring, 150 ms moving-window
//! integration, then an adaptive threshold between the running signal and
//! noise peak levels. The output is the heart rate in beats per minute,
//! held constant between detections.

use super::{FilterError, SignalFilter};
use crate::clock::TICKS_PER_SECOND;

/// Lowest sample rate the detector works at
pub const MIN_SAMPLE_RATE: f64 = 200.0;

/// Integration window, in seconds
const INTEGRATION_WINDOW: f64 = 0.150;

/// No beat is accepted this soon after the previous one, in seconds
const REFRACTORY: f64 = 0.200;

/// Initial learning period that seeds the peak levels, in seconds
const LEARNING: f64 = 2.0;

#[derive(Clone, Debug, PartialEq)]
struct EcgState {
    raw: [f64; 2],
    window: Vec<f64>,
    window_sum: f64,
    window_index: usize,
    samples: u64,
    learn_max: f64,
    learn_sum: f64,
    signal_peak: f64,
    noise_peak: f64,
    above: bool,
    current_peak: f64,
    previous_mwi: f64,
    rising: bool,
    last_beat: Option<u64>,
    bpm: f64,
}

impl EcgState {
    fn new(window: usize) -> Self {
        Self {
            raw: [0.0; 2],
            window: vec![0.0; window],
            window_sum: 0.0,
            window_index: 0,
            samples: 0,
            learn_max: 0.0,
            learn_sum: 0.0,
            signal_peak: 0.0,
            noise_peak: 0.0,
            above: false,
            current_peak: 0.0,
            previous_mwi: 0.0,
            rising: false,
            last_beat: None,
            bpm: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EcgFilter {
    sample_rate: f64,
    learning_samples: u64,
    refractory_samples: u64,
    state: EcgState,
    saved: EcgState,
}

impl EcgFilter {
    pub fn new(sample_rate: f64) -> Result<Self, FilterError> {
        if sample_rate < MIN_SAMPLE_RATE {
            return Err(FilterError::SampleRateTooLow {
                rate: sample_rate,
                required: MIN_SAMPLE_RATE,
            });
        }
        let window = ((sample_rate * INTEGRATION_WINDOW).round() as usize).max(1);
        let state = EcgState::new(window);
        Ok(Self {
            sample_rate,
            learning_samples: (sample_rate * LEARNING).round() as u64,
            refractory_samples: (sample_rate * REFRACTORY).round() as u64,
            saved: state.clone(),
            state,
        })
    }

    fn threshold(&self) -> f64 {
        let s = &self.state;
        s.noise_peak + 0.25 * (s.signal_peak - s.noise_peak)
    }
}

impl SignalFilter for EcgFilter {
    fn apply(&mut self, x: f64) -> f64 {
        let threshold = self.threshold();
        let s = &mut self.state;
        let n = s.samples;
        s.samples += 1;

        // Derivative over two samples, squared
        let d = if n >= 2 { x - s.raw[1] } else { 0.0 };
        s.raw[1] = s.raw[0];
        s.raw[0] = x;
        let sq = d * d;

        // Moving-window integration
        s.window_sum += sq - s.window[s.window_index];
        s.window[s.window_index] = sq;
        s.window_index = (s.window_index + 1) % s.window.len();
        let mwi = (s.window_sum / s.window.len() as f64).max(0.0);

        // A local maximum of the integrated signal just passed
        let peak = (s.rising && mwi < s.previous_mwi).then_some(s.previous_mwi);
        if mwi != s.previous_mwi {
            s.rising = mwi > s.previous_mwi;
        }
        s.previous_mwi = mwi;

        if n < self.learning_samples {
            s.learn_max = s.learn_max.max(mwi);
            s.learn_sum += mwi;
            if n + 1 == self.learning_samples {
                s.signal_peak = s.learn_max;
                s.noise_peak = s.learn_sum / self.learning_samples as f64;
            }
            return s.bpm;
        }

        if mwi > threshold && s.signal_peak > 0.0 {
            if !s.above {
                let refractory_over = s.last_beat.map_or(true, |b| n - b >= self.refractory_samples);
                if refractory_over {
                    if let Some(previous) = s.last_beat {
                        s.bpm = 60.0 * self.sample_rate / (n - previous) as f64;
                    }
                    s.last_beat = Some(n);
                    s.above = true;
                    s.current_peak = mwi;
                }
            } else {
                s.current_peak = s.current_peak.max(mwi);
            }
        } else {
            if s.above {
                s.signal_peak = 0.125 * s.current_peak + 0.875 * s.signal_peak;
                s.above = false;
            }
            if let Some(p) = peak {
                s.noise_peak = 0.125 * p + 0.875 * s.noise_peak;
            }
        }
        s.bpm
    }

    fn save_state(&mut self) {
        self.saved.clone_from(&self.state);
    }

    fn restore_state(&mut self) {
        self.state.clone_from(&self.saved);
    }

    fn reset(&mut self) {
        self.state = EcgState::new(self.state.window.len());
    }

    fn warmup_ticks(&self) -> i64 {
        10 * TICKS_PER_SECOND
    }
}
