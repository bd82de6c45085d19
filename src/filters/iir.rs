//! Higher-order IIR filters realized as cascades of second-order sections.
//!
//! Design follows the classic analog-prototype route:
//! - lowpass prototype poles for Butterworth, Chebyshev type I or Bessel
//! - band transform (lowpass, highpass, bandpass, bandstop) on frequencies
//!   pre-warped with `tan(pi * f / fs)`
//! - bilinear transform `z = (1 + s) / (1 - s)`
//! - poles paired into biquads, each normalized to unity gain at the
//!   passband reference point; even-order Chebyshev cascades are then
//!   scaled to the prototype's `-ripple` dB level at that point, so the
//!   passband peaks touch unity
//!
//! Sections run in Direct Form II Transposed, so each keeps two delay
//! elements of run state.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::{check_frequency, FilterError, SignalFilter};
use crate::clock;

/// Highest supported filter order
pub const MAX_ORDER: usize = 8;

/// Accepted Chebyshev passband ripple, in dB
pub const RIPPLE_RANGE: (f64, f64) = (0.01, 6.0);

/// Prototype roots closer than this (relative) to the real axis are real
const REAL_EPS: f64 = 1e-10;

/// z-plane poles closer than this to the real axis are real
const REAL_Z_EPS: f64 = 1e-7;

/// Analog prototype family
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IirModel {
    Butterworth,
    Chebyshev,
    Bessel,
}

/// Frequency band shape
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IirBand {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

// ============================================================================
// Second-order sections
// ============================================================================

/// A second-order section (biquad) filter
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sos {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Sos {
    /// Run one sample through this section in Direct Form II Transposed
    #[inline]
    fn process(&self, x: f64, z: &mut [f64; 2]) -> f64 {
        let y = self.b0 * x + z[0];
        z[0] = self.b1 * x - self.a1 * y + z[1];
        z[1] = self.b2 * x - self.a2 * y;
        y
    }

    /// Complex response at a point `z` on the unit circle
    fn response(&self, z: Complex64) -> Complex64 {
        let zi = Complex64::new(1.0, 0.0) / z;
        let zi2 = zi * zi;
        (zi * self.b1 + zi2 * self.b2 + self.b0) / (zi * self.a1 + zi2 * self.a2 + 1.0)
    }

    /// Whether both poles lie strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }
}

// ============================================================================
// Analog prototypes
// ============================================================================

/// Poles of the normalized lowpass prototype
fn prototype_poles(model: IirModel, order: usize, ripple_db: f64) -> Vec<Complex64> {
    let n = order as f64;
    match model {
        IirModel::Butterworth => (0..order)
            .map(|k| {
                let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * n);
                Complex64::new(-theta.sin(), theta.cos())
            })
            .collect(),
        IirModel::Chebyshev => {
            let eps = (10f64.powf(ripple_db / 10.0) - 1.0).sqrt();
            let mu = (1.0 / eps).asinh() / n;
            (0..order)
                .map(|k| {
                    let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * n);
                    Complex64::new(-mu.sinh() * theta.sin(), mu.cosh() * theta.cos())
                })
                .collect()
        }
        IirModel::Bessel => bessel_poles(order),
    }
}

/// Coefficients of the reverse Bessel polynomial, lowest power first
fn bessel_coefficients(order: usize) -> Vec<f64> {
    let factorial = |k: usize| -> f64 { (1..=k).map(|i| i as f64).product() };
    (0..=order)
        .map(|k| factorial(2 * order - k) / (2f64.powi((order - k) as i32) * factorial(k) * factorial(order - k)))
        .collect()
}

/// Bessel poles normalized to -3 dB at 1 rad/s
fn bessel_poles(order: usize) -> Vec<Complex64> {
    let coeffs = bessel_coefficients(order);
    let roots = polynomial_roots(&coeffs);

    // |H(jw)| for H(s) = prod(-p) / prod(s - p)
    let magnitude = |w: f64| -> f64 {
        let s = Complex64::new(0.0, w);
        roots.iter().map(|p| p.norm() / (s - *p).norm()).product()
    };

    let target = std::f64::consts::FRAC_1_SQRT_2;
    let (mut lo, mut hi) = (1e-3_f64, 1e3_f64);
    for _ in 0..200 {
        let mid = (lo * hi).sqrt();
        if magnitude(mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let w3 = (lo * hi).sqrt();
    roots.into_iter().map(|p| p / w3).collect()
}

/// Roots of a monic polynomial by Durand-Kerner iteration.
///
/// `coeffs` holds the coefficients lowest power first; the leading one must
/// be 1.
fn polynomial_roots(coeffs: &[f64]) -> Vec<Complex64> {
    let n = coeffs.len() - 1;
    let eval = |x: Complex64| -> Complex64 {
        coeffs
            .iter()
            .rev()
            .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * x + c)
    };

    // Start on a circle sized to the root magnitudes, off the real axis
    let radius = coeffs[0].abs().powf(1.0 / n as f64).max(1.0);
    let mut roots: Vec<Complex64> = (0..n)
        .map(|k| Complex64::from_polar(radius, 2.0 * PI * k as f64 / n as f64 + 0.4))
        .collect();

    for _ in 0..2000 {
        let mut delta = 0.0f64;
        for i in 0..n {
            let mut denom = Complex64::new(1.0, 0.0);
            for j in 0..n {
                if i != j {
                    denom *= roots[i] - roots[j];
                }
            }
            let step = eval(roots[i]) / denom;
            roots[i] -= step;
            delta = delta.max(step.norm());
        }
        if delta < 1e-14 * radius {
            break;
        }
    }

    for r in &mut roots {
        if r.im.abs() < REAL_EPS * radius.max(r.norm()) {
            r.im = 0.0;
        }
    }
    roots
}

// ============================================================================
// Digital design
// ============================================================================

fn bilinear(s: Complex64) -> Complex64 {
    (Complex64::new(1.0, 0.0) + s) / (Complex64::new(1.0, 0.0) - s)
}

/// Pre-warped analog frequency for a digital frequency in Hz
fn prewarp(hz: f64, sample_rate: f64) -> f64 {
    (PI * hz / sample_rate).tan()
}

/// Map prototype poles through the band transform into the z-plane
fn digital_poles(prototype: &[Complex64], band: IirBand, w1: f64, w2: f64) -> Vec<Complex64> {
    let one = Complex64::new(1.0, 0.0);
    let mut analog = Vec::with_capacity(prototype.len() * 2);
    match band {
        IirBand::Lowpass => analog.extend(prototype.iter().map(|p| *p * w1)),
        IirBand::Highpass => analog.extend(prototype.iter().map(|p| one * w1 / *p)),
        IirBand::Bandpass | IirBand::Bandstop => {
            let w0_sq = w1 * w2;
            let bw = w2 - w1;
            for p in prototype {
                let q = if band == IirBand::Bandpass { *p * bw } else { one * bw / *p };
                let root = (q * q - 4.0 * w0_sq).sqrt();
                analog.push((q + root) / 2.0);
                analog.push((q - root) / 2.0);
            }
        }
    }
    analog.into_iter().map(bilinear).collect()
}

/// Group z-plane poles into denominators of first- and second-order sections
fn pole_sections(poles: &[Complex64]) -> Vec<(f64, f64, bool)> {
    let mut sections = Vec::new();
    let mut reals = Vec::new();
    for p in poles {
        if p.im.abs() <= REAL_Z_EPS {
            reals.push(p.re);
        } else if p.im > 0.0 {
            sections.push((-2.0 * p.re, p.norm_sqr(), true));
        }
    }
    let mut chunks = reals.chunks(2);
    for pair in &mut chunks {
        match pair {
            [r1, r2] => sections.push((-(r1 + r2), r1 * r2, true)),
            [r] => sections.push((-r, 0.0, false)),
            _ => {}
        }
    }
    sections
}

/// Design the cascade for validated parameters
fn design(
    model: IirModel,
    band: IirBand,
    order: usize,
    f1: f64,
    f2: f64,
    ripple_db: f64,
    sample_rate: f64,
) -> Vec<Sos> {
    let prototype = prototype_poles(model, order, ripple_db);
    let w1 = prewarp(f1, sample_rate);
    let w2 = prewarp(f2, sample_rate);
    let poles = digital_poles(&prototype, band, w1, w2);

    let center = 2.0 * (w1 * w2).sqrt().atan();
    let reference = match band {
        IirBand::Lowpass | IirBand::Bandstop => Complex64::new(1.0, 0.0),
        IirBand::Highpass => Complex64::new(-1.0, 0.0),
        IirBand::Bandpass => Complex64::from_polar(1.0, center),
    };

    let mut sections: Vec<Sos> = pole_sections(&poles)
        .into_iter()
        .map(|(a1, a2, second_order)| {
            let (b0, b1, b2) = match (band, second_order) {
                (IirBand::Lowpass, true) => (1.0, 2.0, 1.0),
                (IirBand::Lowpass, false) => (1.0, 1.0, 0.0),
                (IirBand::Highpass, true) => (1.0, -2.0, 1.0),
                (IirBand::Highpass, false) => (1.0, -1.0, 0.0),
                (IirBand::Bandpass, _) => (1.0, 0.0, -1.0),
                (IirBand::Bandstop, _) => (1.0, -2.0 * center.cos(), 1.0),
            };
            let mut sos = Sos { b0, b1, b2, a1, a2 };
            let gain = sos.response(reference).norm();
            if gain > 0.0 && gain.is_finite() {
                sos.b0 /= gain;
                sos.b1 /= gain;
                sos.b2 /= gain;
            }
            sos
        })
        .collect();

    if model == IirModel::Chebyshev && order % 2 == 0 {
        if let Some(first) = sections.first_mut() {
            let level = 10f64.powf(-ripple_db / 20.0);
            first.b0 *= level;
            first.b1 *= level;
            first.b2 *= level;
        }
    }
    sections
}

// ============================================================================
// Filter
// ============================================================================

/// Cascade of biquads with per-section run state
#[derive(Clone, Debug)]
pub struct IirFilter {
    model: IirModel,
    band: IirBand,
    order: usize,
    /// Lowest corner frequency, which sets the warm-up time
    frequency_hz: f64,
    sections: Vec<Sos>,
    state: Vec<[f64; 2]>,
    saved: Vec<[f64; 2]>,
}

impl IirFilter {
    /// Design a filter.
    ///
    /// `upper_frequency_hz` is required for bandpass and bandstop and must
    /// lie above `frequency_hz`; `ripple_db` only matters for Chebyshev.
    pub fn new(
        model: IirModel,
        band: IirBand,
        order: usize,
        frequency_hz: f64,
        upper_frequency_hz: Option<f64>,
        ripple_db: f64,
        sample_rate: f64,
    ) -> Result<Self, FilterError> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(FilterError::InvalidParameter(format!(
                "order {} must be between 1 and {}",
                order, MAX_ORDER
            )));
        }
        if model == IirModel::Chebyshev && !(RIPPLE_RANGE.0..=RIPPLE_RANGE.1).contains(&ripple_db) {
            return Err(FilterError::InvalidParameter(format!(
                "ripple {} dB must be between {} and {} dB",
                ripple_db, RIPPLE_RANGE.0, RIPPLE_RANGE.1
            )));
        }
        check_frequency("frequency", frequency_hz, sample_rate)?;

        let upper = match band {
            IirBand::Lowpass | IirBand::Highpass => frequency_hz,
            IirBand::Bandpass | IirBand::Bandstop => {
                let upper = upper_frequency_hz.ok_or_else(|| {
                    FilterError::InvalidParameter(format!("{} needs an upper frequency", band))
                })?;
                check_frequency("upper frequency", upper, sample_rate)?;
                if upper <= frequency_hz {
                    return Err(FilterError::InvalidParameter(format!(
                        "upper frequency {} Hz must be above {} Hz",
                        upper, frequency_hz
                    )));
                }
                upper
            }
        };

        let sections = design(model, band, order, frequency_hz, upper, ripple_db, sample_rate);
        if sections.iter().any(|s| !s.is_stable()) {
            return Err(FilterError::InvalidParameter(format!(
                "{} {} order {} at {} Hz is numerically unstable",
                model, band, order, frequency_hz
            )));
        }

        let n = sections.len();
        Ok(Self {
            model,
            band,
            order,
            frequency_hz,
            sections,
            state: vec![[0.0; 2]; n],
            saved: vec![[0.0; 2]; n],
        })
    }

    pub fn model(&self) -> IirModel {
        self.model
    }

    pub fn band(&self) -> IirBand {
        self.band
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn sections(&self) -> &[Sos] {
        &self.sections
    }

    /// Magnitude response at `hz`
    pub fn magnitude_at(&self, hz: f64, sample_rate: f64) -> f64 {
        let z = Complex64::from_polar(1.0, 2.0 * PI * hz / sample_rate);
        self.sections.iter().map(|s| s.response(z).norm()).product()
    }
}

impl SignalFilter for IirFilter {
    #[inline]
    fn apply(&mut self, x: f64) -> f64 {
        let mut v = x;
        for (section, z) in self.sections.iter().zip(self.state.iter_mut()) {
            v = section.process(v, z);
        }
        v
    }

    fn save_state(&mut self) {
        self.saved.copy_from_slice(&self.state);
    }

    fn restore_state(&mut self) {
        self.state.copy_from_slice(&self.saved);
    }

    fn reset(&mut self) {
        self.state.iter_mut().for_each(|z| *z = [0.0; 2]);
    }

    /// `2 * order` periods of the lowest corner frequency
    fn warmup_ticks(&self) -> i64 {
        clock::ceil_ticks(2.0 * self.order as f64 / self.frequency_hz)
    }
}
