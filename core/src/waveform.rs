use crate::resample::ResampleFactor;

/// Mono sample buffer plus its sample rate
///
/// Every pipeline stage takes a waveform by reference and returns a new one;
/// buffers are never shared between stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
    restore_hint: Option<RestoreHint>,
}

/// Left on a decimated waveform so the matching interpolation can return the
/// exact pre-decimation length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreHint {
    /// Factor that produced the waveform carrying the hint
    pub factor: ResampleFactor,
    /// Length of the waveform before that factor was applied
    pub original_len: usize,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            restore_hint: None,
        }
    }

    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub(crate) fn with_restore_hint(mut self, hint: Option<RestoreHint>) -> Self {
        self.restore_hint = hint;
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn restore_hint(&self) -> Option<RestoreHint> {
        self.restore_hint
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Convert a duration in milliseconds to a sample count at `sample_rate`
pub fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    if ms <= 0.0 {
        return 0;
    }
    (sample_rate as f64 * ms as f64 / 1000.0).round() as usize
}
