//! Polyphase rational-factor resampling
//!
//! Rate change by `up/down` is done as zero insertion, a linear-phase FIR
//! lowpass, then keeping every `down`-th sample. The zero insertion and
//! discarding are folded into the filter loop (polyphase form), so only taps
//! that land on real input samples are evaluated.
//!
//! Time compression keeps the sample rate metadata: decimating by M gives a
//! buffer that plays M times faster at the same rate, and interpolating by M
//! brings it back to the original duration.
//!
//! Samples outside the buffer are treated as zero (zero padding). The first
//! and last `half_len / up` input samples therefore see a partially empty
//! filter, which slightly softens the leading and trailing bursts.

use crate::error::{Result, ToneWarpError};
use crate::waveform::{RestoreHint, Waveform};
use log::{debug, warn};
use std::f64::consts::PI;

/// Kaiser window shape parameter, about 50 dB stopband attenuation
const DEFAULT_KAISER_BETA: f64 = 5.0;

/// Filter half length per unit of max(up, down)
const DEFAULT_TAPS_PER_PHASE: usize = 10;

/// Largest reduced term `convert_rate` designs a filter for
const MAX_CONVERSION_TERM: u32 = 1024;

/// Rational resampling factor `up/down`, kept reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResampleFactor {
    up: u32,
    down: u32,
}

impl ResampleFactor {
    pub fn new(up: u32, down: u32) -> Result<Self> {
        if up == 0 || down == 0 {
            return Err(ToneWarpError::InvalidFactor { up, down });
        }
        let g = gcd(up, down);
        Ok(Self {
            up: up / g,
            down: down / g,
        })
    }

    /// Speed-up by `m` (keep one sample in `m`)
    pub fn decimation(m: u32) -> Result<Self> {
        Self::new(1, m)
    }

    /// Slow-down by `m` (insert `m - 1` samples between originals)
    pub fn interpolation(m: u32) -> Result<Self> {
        Self::new(m, 1)
    }

    pub fn up(&self) -> u32 {
        self.up
    }

    pub fn down(&self) -> u32 {
        self.down
    }

    pub fn inverse(&self) -> Self {
        Self {
            up: self.down,
            down: self.up,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.up == self.down
    }

    /// Output length for an input of `len` samples
    pub fn output_len(&self, len: usize) -> usize {
        let up = self.up as usize;
        let down = self.down as usize;
        (len * up + down - 1) / down
    }
}

/// Lowpass design parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ResamplerConfig {
    pub kaiser_beta: f64,
    /// Half length of the filter is `taps_per_phase * max(up, down)`
    pub taps_per_phase: usize,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            kaiser_beta: DEFAULT_KAISER_BETA,
            taps_per_phase: DEFAULT_TAPS_PER_PHASE,
        }
    }
}

impl ResamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.kaiser_beta >= 0.0) {
            return Err(ToneWarpError::InvalidConfig(format!(
                "kaiser beta {} must be non-negative",
                self.kaiser_beta
            )));
        }
        if self.taps_per_phase == 0 {
            return Err(ToneWarpError::InvalidConfig(
                "taps per phase must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Resampler bound to one factor; the filter is designed once in `new`
pub struct PolyphaseResampler {
    factor: ResampleFactor,
    taps: Vec<f32>,
    half_len: usize,
}

impl PolyphaseResampler {
    pub fn new(factor: ResampleFactor, config: &ResamplerConfig) -> Result<Self> {
        config.validate()?;
        let (taps, half_len) = design_lowpass(factor, config);
        debug!(
            "Designed {}-tap lowpass for factor {}/{}",
            taps.len(),
            factor.up,
            factor.down
        );
        Ok(Self {
            factor,
            taps,
            half_len,
        })
    }

    pub fn factor(&self) -> ResampleFactor {
        self.factor
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Time-compress or expand `input`, keeping its sample rate.
    ///
    /// If `input` was produced by the inverse factor, the output has exactly
    /// the length the waveform had before that step.
    pub fn resample(&self, input: &Waveform) -> Waveform {
        if self.factor.is_identity() {
            return input.clone();
        }

        let mut out_len = self.factor.output_len(input.len());
        let mut hint = Some(RestoreHint {
            factor: self.factor,
            original_len: input.len(),
        });

        if let Some(prev) = input.restore_hint() {
            if prev.factor == self.factor.inverse() && prev.original_len <= out_len {
                out_len = prev.original_len;
                hint = None;
            }
        }

        let samples = self.filter(input.samples(), out_len);
        Waveform::new(samples, input.sample_rate()).with_restore_hint(hint)
    }

    /// Polyphase evaluation of `y[m] = Σ x[i]·h[m·down + half_len − i·up]`
    fn filter(&self, input: &[f32], out_len: usize) -> Vec<f32> {
        let up = self.factor.up as usize;
        let down = self.factor.down as usize;
        let last_tap = self.taps.len() - 1;
        let mut output = Vec::with_capacity(out_len);

        if input.is_empty() {
            output.resize(out_len, 0.0);
            return output;
        }

        for m in 0..out_len {
            let center = m * down + self.half_len;
            let i_max = (center / up).min(input.len() - 1);
            let i_min = if center > last_tap {
                (center - last_tap + up - 1) / up
            } else {
                0
            };

            let mut acc = 0.0f32;
            if i_min <= i_max {
                for i in i_min..=i_max {
                    acc += input[i] * self.taps[center - i * up];
                }
            }
            output.push(acc);
        }

        output
    }
}

/// Resample with the default filter design
pub fn resample(input: &Waveform, factor: ResampleFactor) -> Result<Waveform> {
    Ok(PolyphaseResampler::new(factor, &ResamplerConfig::default())?.resample(input))
}

/// Speed up by `m`
pub fn accelerate(input: &Waveform, m: u32) -> Result<Waveform> {
    resample(input, ResampleFactor::decimation(m)?)
}

/// Undo `accelerate(_, m)`
pub fn restore(input: &Waveform, m: u32) -> Result<Waveform> {
    resample(input, ResampleFactor::interpolation(m)?)
}

/// True sample rate conversion: output plays at `target_rate` with the same
/// duration as the input.
pub fn convert_rate(input: &Waveform, target_rate: u32) -> Result<Waveform> {
    if input.sample_rate() == target_rate {
        return Ok(input.clone());
    }
    let exact = ResampleFactor::new(target_rate, input.sample_rate())?;
    let factor = if exact.up.max(exact.down) > MAX_CONVERSION_TERM {
        let (up, down) = approximate_ratio(exact.up, exact.down, MAX_CONVERSION_TERM);
        let approx = ResampleFactor::new(up, down)?;
        let exact_ratio = exact.up as f64 / exact.down as f64;
        let error = (up as f64 / down as f64 - exact_ratio).abs() / exact_ratio;
        warn!(
            "Converting {} Hz -> {} Hz with ratio {}/{} instead of {}/{} ({:.2e} relative error)",
            input.sample_rate(),
            target_rate,
            up,
            down,
            exact.up,
            exact.down,
            error
        );
        approx
    } else {
        exact
    };
    let resampler = PolyphaseResampler::new(factor, &ResamplerConfig::default())?;
    // Length follows the exact ratio so the duration is unchanged
    let out_len = exact.output_len(input.len());
    Ok(Waveform::new(resampler.filter(input.samples(), out_len), target_rate))
}

/// Fraction closest to `num/den` with both terms at most `limit`, from the
/// continued fraction convergents and the last semiconvergent that fits
fn approximate_ratio(num: u32, den: u32, limit: u32) -> (u32, u32) {
    let limit = limit as u64;
    let target = num as f64 / den as f64;
    let (mut h0, mut h1) = (0u64, 1u64);
    let (mut k0, mut k1) = (1u64, 0u64);
    let (mut n, mut d) = (num as u64, den as u64);

    while d != 0 {
        let a = n / d;
        let h2 = a * h1 + h0;
        let k2 = a * k1 + k0;
        if h2 > limit || k2 > limit {
            let t_h = (limit - h0) / h1.max(1);
            let t_k = if k1 == 0 { u64::MAX } else { (limit - k0) / k1 };
            let t = a.min(t_h).min(t_k);
            let semi = (t * h1 + h0, t * k1 + k0);

            let distance = |(p, q): (u64, u64)| {
                if p == 0 || q == 0 {
                    f64::INFINITY
                } else {
                    (p as f64 / q as f64 - target).abs()
                }
            };
            let best = if distance(semi) <= distance((h1, k1)) { semi } else { (h1, k1) };
            return (best.0 as u32, best.1 as u32);
        }
        (h0, h1) = (h1, h2);
        (k0, k1) = (k1, k2);
        (n, d) = (d, n - a * d);
    }
    (h1 as u32, k1 as u32)
}

/// Average interleaved multi-channel audio down to mono
///
/// A trailing partial frame is ignored.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Kaiser-windowed sinc lowpass with cutoff `1/max(up, down)` of Nyquist,
/// unity DC gain, scaled by `up` to make up for the inserted zeros.
fn design_lowpass(factor: ResampleFactor, config: &ResamplerConfig) -> (Vec<f32>, usize) {
    let max_rate = factor.up.max(factor.down) as usize;
    let half_len = config.taps_per_phase * max_rate;
    let len = 2 * half_len + 1;
    let cutoff = 1.0 / max_rate as f64;
    let beta = config.kaiser_beta;
    let i0_beta = bessel_i0(beta);

    let mut taps: Vec<f64> = (0..len)
        .map(|k| {
            let m = k as f64 - half_len as f64;
            let ratio = 2.0 * k as f64 / (len - 1) as f64 - 1.0;
            let window = bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / i0_beta;
            cutoff * sinc(cutoff * m) * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    let gain = factor.up as f64 / sum;
    for tap in taps.iter_mut() {
        *tap *= gain;
    }

    (taps.into_iter().map(|t| t as f32).collect(), half_len)
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Zeroth-order modified Bessel function of the first kind (power series)
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    loop {
        term *= (half / k) * (half / k);
        sum += term;
        if term < sum * 1e-12 {
            break;
        }
        k += 1.0;
    }
    sum
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
