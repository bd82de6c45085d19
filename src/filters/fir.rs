//! Direct-form FIR convolution.

use std::f64::consts::PI;

use super::{check_frequency, FilterError, SignalFilter};
use crate::clock;

/// Most taps a FIR stage accepts
pub const MAX_TAPS: usize = 1000;

/// FIR filter over a circular delay line
#[derive(Clone, Debug)]
pub struct FirFilter {
    taps: Vec<f64>,
    sample_rate: f64,
    delay_line: Vec<f64>,
    index: usize,
    saved_line: Vec<f64>,
    saved_index: usize,
}

impl FirFilter {
    pub fn new(taps: Vec<f64>, sample_rate: f64) -> Result<Self, FilterError> {
        if taps.is_empty() || taps.len() > MAX_TAPS {
            return Err(FilterError::InvalidParameter(format!(
                "FIR needs 1 to {} taps, got {}",
                MAX_TAPS,
                taps.len()
            )));
        }
        if taps.iter().any(|t| !t.is_finite()) {
            return Err(FilterError::InvalidParameter("FIR taps must be finite".to_string()));
        }
        let n = taps.len();
        Ok(Self {
            taps,
            sample_rate,
            delay_line: vec![0.0; n],
            index: 0,
            saved_line: vec![0.0; n],
            saved_index: 0,
        })
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }
}

impl SignalFilter for FirFilter {
    #[inline]
    fn apply(&mut self, x: f64) -> f64 {
        let n = self.taps.len();
        self.delay_line[self.index] = x;

        let mut y = 0.0;
        for (k, tap) in self.taps.iter().enumerate() {
            y += tap * self.delay_line[(self.index + n - k) % n];
        }

        self.index = (self.index + 1) % n;
        y
    }

    fn save_state(&mut self) {
        self.saved_line.copy_from_slice(&self.delay_line);
        self.saved_index = self.index;
    }

    fn restore_state(&mut self) {
        self.delay_line.copy_from_slice(&self.saved_line);
        self.index = self.saved_index;
    }

    fn reset(&mut self) {
        self.delay_line.fill(0.0);
        self.index = 0;
    }

    /// `taps + 3` sample periods
    fn warmup_ticks(&self) -> i64 {
        clock::ticks_for_samples(self.taps.len() + 3, self.sample_rate)
    }
}

/// Hamming-windowed sinc lowpass taps, normalized to unity gain at DC.
///
/// `length` must be odd so the filter has an integer group delay.
pub fn windowed_sinc_lowpass(cutoff_hz: f64, sample_rate: f64, length: usize) -> Result<Vec<f64>, FilterError> {
    if length % 2 == 0 || length > MAX_TAPS {
        return Err(FilterError::InvalidParameter(format!(
            "windowed sinc length {} must be odd and at most {}",
            length, MAX_TAPS
        )));
    }
    check_frequency("cutoff", cutoff_hz, sample_rate)?;

    let fc = cutoff_hz / sample_rate;
    let m = (length - 1) / 2;
    let mut taps: Vec<f64> = (0..length)
        .map(|i| {
            let n = i as f64 - m as f64;
            let sinc = if i == m {
                2.0 * fc
            } else {
                (2.0 * PI * fc * n).sin() / (PI * n)
            };
            let window = if length == 1 {
                1.0
            } else {
                0.54 - 0.46 * (2.0 * PI * i as f64 / (length - 1) as f64).cos()
            };
            sinc * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    if sum.abs() > f64::EPSILON {
        taps.iter_mut().for_each(|t| *t /= sum);
    }
    Ok(taps)
}
