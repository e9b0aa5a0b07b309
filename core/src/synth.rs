use crate::error::{Result, ToneWarpError};
use crate::symbols::{FrequencyPair, SymbolTable};
use crate::waveform::{ms_to_samples, Waveform};
use log::debug;
use std::f64::consts::PI;

/// Default working sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Timing and level parameters for tone synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// Length of each dual-tone burst
    pub tone_ms: f32,
    /// Silence after each burst
    pub silence_ms: f32,
    /// Peak level of a burst, full scale is 1.0
    pub amplitude: f32,
    /// Raised-cosine attack/decay applied to each burst
    pub fade_ms: f32,
    /// Extra silence rendered for a space character
    pub word_gap_ms: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            tone_ms: 100.0,
            silence_ms: 50.0,
            amplitude: 0.9,
            fade_ms: 10.0,
            word_gap_ms: 150.0,
        }
    }
}

impl SynthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ToneWarpError::InvalidConfig("sample rate must be positive".into()));
        }
        if !(self.tone_ms > 0.0) || ms_to_samples(self.tone_ms, self.sample_rate) == 0 {
            return Err(ToneWarpError::InvalidConfig(format!(
                "tone duration {} ms is too short",
                self.tone_ms
            )));
        }
        if self.silence_ms < 0.0 || self.fade_ms < 0.0 || self.word_gap_ms < 0.0 {
            return Err(ToneWarpError::InvalidConfig(
                "durations must not be negative".into(),
            ));
        }
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return Err(ToneWarpError::InvalidConfig(format!(
                "amplitude {} outside (0, 1]",
                self.amplitude
            )));
        }
        Ok(())
    }

    fn tone_samples(&self) -> usize {
        ms_to_samples(self.tone_ms, self.sample_rate)
    }

    fn silence_samples(&self) -> usize {
        ms_to_samples(self.silence_ms, self.sample_rate)
    }

    fn word_gap_samples(&self) -> usize {
        ms_to_samples(self.word_gap_ms, self.sample_rate)
    }
}

/// Renders text as a sequence of dual-tone bursts separated by silence
pub struct ToneSynthesizer {
    config: SynthConfig,
    table: &'static SymbolTable,
}

impl ToneSynthesizer {
    pub fn new(config: SynthConfig) -> Result<Self> {
        Self::with_table(config, SymbolTable::standard())
    }

    pub fn with_table(config: SynthConfig, table: &'static SymbolTable) -> Result<Self> {
        config.validate()?;
        let nyquist = config.sample_rate as f32 / 2.0;
        if table.high_freqs().iter().any(|&f| f >= nyquist) {
            return Err(ToneWarpError::InvalidConfig(format!(
                "sample rate {} Hz cannot carry the high tone band",
                config.sample_rate
            )));
        }
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Render `text`. Any character outside the alphabet (other than a space)
    /// fails the whole call before anything is rendered.
    ///
    /// A space is only extra silence, so spaces survive decoding only as single
    /// separators between characters: leading and trailing spaces vanish and
    /// a run of spaces comes back as one.
    pub fn synthesize(&self, text: &str) -> Result<Waveform> {
        let plan = self.plan(text)?;
        let mut samples = Vec::with_capacity(self.planned_len(&plan));

        for step in &plan {
            match step {
                Step::Tone(pair) => {
                    samples.extend(self.render_tone(*pair));
                    samples.resize(samples.len() + self.config.silence_samples(), 0.0);
                }
                Step::WordGap => {
                    samples.resize(samples.len() + self.config.word_gap_samples(), 0.0);
                }
            }
        }

        debug!(
            "Synthesized {} symbols into {} samples at {} Hz",
            plan.len(),
            samples.len(),
            self.config.sample_rate
        );
        Ok(Waveform::new(samples, self.config.sample_rate))
    }

    /// Exact number of samples `synthesize(text)` produces
    pub fn expected_len(&self, text: &str) -> Result<usize> {
        Ok(self.planned_len(&self.plan(text)?))
    }

    fn planned_len(&self, plan: &[Step]) -> usize {
        let per_tone = self.config.tone_samples() + self.config.silence_samples();
        plan.iter()
            .map(|step| match step {
                Step::Tone(_) => per_tone,
                Step::WordGap => self.config.word_gap_samples(),
            })
            .sum()
    }

    /// Render a single burst for `pair`, without trailing silence
    pub fn render_tone(&self, pair: FrequencyPair) -> Vec<f32> {
        let len = self.config.tone_samples();
        let sample_rate = self.config.sample_rate as f64;
        // Two unit sines sum to at most 2.0
        let gain = self.config.amplitude as f64 / 2.0;
        let fade = raised_cosine_window(len, ms_to_samples(self.config.fade_ms, self.config.sample_rate));

        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate;
                let low = (2.0 * PI * pair.low as f64 * t).sin();
                let high = (2.0 * PI * pair.high as f64 * t).sin();
                ((low + high) * gain) as f32 * fade[i]
            })
            .collect()
    }

    fn plan(&self, text: &str) -> Result<Vec<Step>> {
        text.chars()
            .map(|c| {
                if c == ' ' {
                    Ok(Step::WordGap)
                } else {
                    self.table.encode(c).map(Step::Tone)
                }
            })
            .collect()
    }
}

enum Step {
    Tone(FrequencyPair),
    WordGap,
}

/// Synthesize `text` with the standard table
pub fn synthesize(text: &str, config: &SynthConfig) -> Result<Waveform> {
    ToneSynthesizer::new(config.clone())?.synthesize(text)
}

/// Raised-cosine attack/decay envelope, flat 1.0 in the middle
fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f32> {
    let taper = taper_len.min(len / 2);
    let mut window = vec![1.0; len];
    if taper == 0 {
        return window;
    }

    for i in 0..taper {
        let progress = i as f32 / taper as f32;
        let value = (std::f32::consts::PI * progress / 2.0).sin().powi(2);
        window[i] = value;
        window[len - 1 - i] = value;
    }

    window
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_config() -> SynthConfig {
        SynthConfig {
            sample_rate: 44_100,
            tone_ms: 100.0,
            silence_ms: 50.0,
            ..SynthConfig::default()
        }
    }

    #[test]
    fn test_hello_length_is_deterministic() {
        let wave = synthesize("HELLO", &hello_config()).unwrap();
        // 5 × (4410 tone + 2205 silence)
        assert_eq!(wave.len(), 5 * (4410 + 2205));
        assert_eq!(wave.sample_rate(), 44_100);

        let again = synthesize("HELLO", &hello_config()).unwrap();
        assert_eq!(wave, again);
    }

    #[test]
    fn test_expected_len_matches_output() {
        let synth = ToneSynthesizer::new(hello_config()).unwrap();
        for text in ["", "A", "HELLO WORLD", "0123 45678"] {
            let wave = synth.synthesize(text).unwrap();
            assert_eq!(wave.len(), synth.expected_len(text).unwrap(), "text {:?}", text);
        }
    }

    #[test]
    fn test_unsupported_symbol_aborts() {
        let result = synthesize("HEL9LO", &hello_config());
        assert!(matches!(result, Err(ToneWarpError::UnsupportedSymbol('9'))));

        let result = synthesize("TAB\tHERE", &hello_config());
        assert!(matches!(result, Err(ToneWarpError::UnsupportedSymbol('\t'))));
    }

    #[test]
    fn test_peak_never_exceeds_amplitude() {
        let table = SymbolTable::standard();
        for amplitude in [1.0, 0.9, 0.25] {
            let config = SynthConfig {
                amplitude,
                ..hello_config()
            };
            let text: String = table.alphabet().collect();
            let wave = synthesize(&text, &config).unwrap();
            assert!(wave.peak() <= amplitude + 1e-6, "peak {} > {}", wave.peak(), amplitude);
            assert!(wave.peak() > amplitude * 0.8, "peak {} too low", wave.peak());
        }
    }

    #[test]
    fn test_silence_follows_each_tone() {
        let config = hello_config();
        let wave = synthesize("AB", &config).unwrap();
        let samples = wave.samples();
        assert!(samples[4410..6615].iter().all(|&s| s == 0.0));
        assert!(samples[6615..6615 + 4410].iter().any(|&s| s != 0.0));
        assert!(samples[6615 + 4410..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_space_renders_word_gap() {
        let config = hello_config();
        let plain = synthesize("AB", &config).unwrap();
        let spaced = synthesize("A B", &config).unwrap();
        assert_eq!(spaced.len(), plain.len() + ms_to_samples(config.word_gap_ms, 44_100));
    }

    #[test]
    fn test_fade_starts_and_ends_at_zero() {
        let synth = ToneSynthesizer::new(hello_config()).unwrap();
        let tone = synth.render_tone(FrequencyPair::new(697.0, 1336.0));
        assert_eq!(tone.len(), 4410);
        assert_eq!(tone[0], 0.0);
        assert!(tone[tone.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn test_lowercase_matches_uppercase() {
        let config = hello_config();
        assert_eq!(
            synthesize("hello", &config).unwrap(),
            synthesize("HELLO", &config).unwrap()
        );
    }

    #[test]
    fn test_invalid_configs() {
        let bad_amplitude = SynthConfig {
            amplitude: 1.5,
            ..hello_config()
        };
        assert!(ToneSynthesizer::new(bad_amplitude).is_err());

        let zero_tone = SynthConfig {
            tone_ms: 0.0,
            ..hello_config()
        };
        assert!(ToneSynthesizer::new(zero_tone).is_err());

        // 1944 Hz does not fit under a 3 kHz Nyquist limit
        let low_rate = SynthConfig {
            sample_rate: 3000,
            ..hello_config()
        };
        assert!(ToneSynthesizer::new(low_rate).is_err());
    }

    #[test]
    fn test_raised_cosine_window() {
        let window = raised_cosine_window(100, 10);
        assert_eq!(window.len(), 100);
        assert!(window[0] < 0.1);
        assert!(window[9] > 0.9);
        assert_eq!(window[50], 1.0);
        assert!(window[99] < 0.1);

        assert!(raised_cosine_window(10, 0).iter().all(|&w| w == 1.0));
    }
}
