//! Z-ratio: the balance between slow and fast EEG activity.
//!
//! The signal is cut into 2-second epochs aligned to sample 0 of the
//! recording. At the end of each complete epoch the power spectrum is
//! computed over four bands, delta `[0.5, 3)`, theta `[3, crossover)`,
//! alpha `[crossover, 12)` and beta `[12, 25]` Hz, and the ratio
//! `((delta + theta) - (alpha + beta)) / total` is taken. Power outside the
//! bands is ignored. The output holds the last ratio until the next epoch
//! completes.

use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::{FilterError, SignalFilter};
use crate::clock::TICKS_PER_SECOND;

/// Epoch length, in seconds
pub const EPOCH_SECONDS: f64 = 2.0;

/// Fewest samples an epoch may hold
pub const MIN_EPOCH_SAMPLES: usize = 200;

/// Band edges in Hz: delta from `DELTA_LOW`, theta from `THETA_LOW`, beta
/// from `BETA_LOW` up to and including `BETA_HIGH`
const DELTA_LOW: f64 = 0.5;
const THETA_LOW: f64 = 3.0;
const BETA_LOW: f64 = 12.0;
const BETA_HIGH: f64 = 25.0;

/// Band power below this share of the epoch's power counts as none
const EMPTY_BANDS: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
struct ZState {
    /// Absolute index of the next sample
    position: u64,
    /// Absolute index of the first sample of the current epoch
    epoch_start: u64,
    /// Whether the epoch started on its boundary
    complete: bool,
    buffer: Vec<f64>,
    ratio: f64,
}

impl ZState {
    fn new(epoch_len: usize) -> Self {
        Self {
            position: 0,
            epoch_start: 0,
            complete: true,
            buffer: Vec::with_capacity(epoch_len),
            ratio: 0.0,
        }
    }
}

#[derive(Clone)]
pub struct ZRatioFilter {
    crossover_hz: f64,
    sample_rate: f64,
    epoch_len: usize,
    fft: Arc<dyn Fft<f64>>,
    state: ZState,
    saved: ZState,
}

impl fmt::Debug for ZRatioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZRatioFilter")
            .field("crossover_hz", &self.crossover_hz)
            .field("epoch_len", &self.epoch_len)
            .field("epoch_start", &self.state.epoch_start)
            .field("ratio", &self.state.ratio)
            .finish_non_exhaustive()
    }
}

impl ZRatioFilter {
    pub fn new(crossover_hz: f64, sample_rate: f64) -> Result<Self, FilterError> {
        let exact = sample_rate * EPOCH_SECONDS;
        if exact < MIN_EPOCH_SAMPLES as f64 {
            return Err(FilterError::BlockTooSmall {
                samples: exact,
                required: MIN_EPOCH_SAMPLES,
            });
        }
        if (exact - exact.round()).abs() > 1e-9 {
            return Err(FilterError::InvalidParameter(format!(
                "a {} s epoch at {} Hz is not a whole number of samples",
                EPOCH_SECONDS, sample_rate
            )));
        }
        if !(crossover_hz > THETA_LOW && crossover_hz < BETA_LOW) {
            return Err(FilterError::InvalidParameter(format!(
                "crossover {} Hz must lie between {} and {} Hz",
                crossover_hz, THETA_LOW, BETA_LOW
            )));
        }

        let epoch_len = exact.round() as usize;
        let fft = FftPlanner::<f64>::new().plan_fft_forward(epoch_len);
        let state = ZState::new(epoch_len);
        Ok(Self {
            crossover_hz,
            sample_rate,
            epoch_len,
            fft,
            saved: state.clone(),
            state,
        })
    }

    /// Samples per epoch
    pub fn epoch_len(&self) -> usize {
        self.epoch_len
    }

    /// Absolute sample index where the current epoch began
    pub fn epoch_start(&self) -> u64 {
        self.state.epoch_start
    }

    /// Last completed ratio
    pub fn ratio(&self) -> f64 {
        self.state.ratio
    }

    /// Position the filter so the next sample is absolute sample
    /// `absolute_sample`. Any partial epoch is discarded; if the position
    /// falls inside an epoch, that epoch is incomplete and yields no ratio.
    pub fn seek(&mut self, absolute_sample: u64) {
        let len = self.epoch_len as u64;
        let s = &mut self.state;
        s.position = absolute_sample;
        s.epoch_start = absolute_sample - absolute_sample % len;
        s.complete = absolute_sample % len == 0;
        s.buffer.clear();
    }

    fn band_ratio(&self, epoch: &[f64]) -> f64 {
        let mean = epoch.iter().sum::<f64>() / epoch.len() as f64;
        let mut spectrum: Vec<Complex64> = epoch.iter().map(|&x| Complex64::new(x - mean, 0.0)).collect();
        self.fft.process(&mut spectrum);

        let resolution = self.sample_rate / self.epoch_len as f64;
        let mut bands = [0.0f64; 4];
        let mut all = 0.0;
        for (k, bin) in spectrum.iter().enumerate().take(self.epoch_len / 2 + 1) {
            let hz = k as f64 * resolution;
            let power = bin.norm_sqr();
            all += power;
            let band = if (DELTA_LOW..THETA_LOW).contains(&hz) {
                0
            } else if (THETA_LOW..self.crossover_hz).contains(&hz) {
                1
            } else if (self.crossover_hz..BETA_LOW).contains(&hz) {
                2
            } else if (BETA_LOW..=BETA_HIGH).contains(&hz) {
                3
            } else {
                continue;
            };
            bands[band] += power;
        }

        let [delta, theta, alpha, beta] = bands;
        let total = delta + theta + alpha + beta;
        if total > 0.0 && total > all * EMPTY_BANDS {
            ((delta + theta) - (alpha + beta)) / total
        } else {
            0.0
        }
    }
}

impl SignalFilter for ZRatioFilter {
    fn apply(&mut self, x: f64) -> f64 {
        let len = self.epoch_len as u64;
        if self.state.position % len == 0 && self.state.position != self.state.epoch_start {
            self.state.epoch_start = self.state.position;
            self.state.complete = true;
            self.state.buffer.clear();
        }

        self.state.buffer.push(x);
        self.state.position += 1;

        if self.state.position % len == 0 {
            if self.state.complete && self.state.buffer.len() == self.epoch_len {
                self.state.ratio = self.band_ratio(&self.state.buffer);
            }
            self.state.buffer.clear();
        }
        self.state.ratio
    }

    fn save_state(&mut self) {
        self.saved.clone_from(&self.state);
    }

    fn restore_state(&mut self) {
        self.state.clone_from(&self.saved);
    }

    fn reset(&mut self) {
        self.state = ZState::new(self.epoch_len);
    }

    fn warmup_ticks(&self) -> i64 {
        4 * TICKS_PER_SECOND
    }
}
