//! End-to-end text -> audio -> compressed audio -> text pipeline

use crate::decoder::{DecodeResult, DecoderConfig, SpectralDecoder};
use crate::error::{Result, ToneWarpError};
use crate::live::{CaptureLoop, LiveConfig};
use crate::resample::{PolyphaseResampler, ResampleFactor, ResamplerConfig};
use crate::synth::{SynthConfig, ToneSynthesizer};
use crate::waveform::{rms, Waveform};
use log::info;

/// Default time compression factor
pub const DEFAULT_COMPRESSION: u32 = 10;

/// Every stage's configuration plus the compression factor
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub synth: SynthConfig,
    pub resampler: ResamplerConfig,
    pub decoder: DecoderConfig,
    pub live: LiveConfig,
    /// Time compression factor M used by accelerate/restore
    pub compression: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let synth = SynthConfig::default();
        Self {
            decoder: DecoderConfig::for_synth(&synth),
            synth,
            resampler: ResamplerConfig::default(),
            live: LiveConfig::default(),
            compression: DEFAULT_COMPRESSION,
        }
    }
}

impl PipelineConfig {
    /// Defaults with decoder timing derived from `synth`
    pub fn for_synth(synth: SynthConfig) -> Self {
        Self {
            decoder: DecoderConfig::for_synth(&synth),
            synth,
            ..Self::default()
        }
    }
}

/// Results of one accelerate/restore/decode pass over a waveform
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedReport {
    pub factor: u32,
    pub original_len: usize,
    pub compressed_len: usize,
    pub restored_len: usize,
    /// RMS of restored minus original, relative to the original RMS
    pub relative_error: f32,
    /// Decode of the untouched input
    pub original: DecodeResult,
    /// Decode after the round trip
    pub restored: DecodeResult,
}

impl SpeedReport {
    pub fn length_preserved(&self) -> bool {
        self.original_len == self.restored_len
    }

    /// Both decodes produced the same text
    pub fn text_preserved(&self) -> bool {
        self.original.text() == self.restored.text()
    }
}

/// Configured stages, built once and reused
pub struct Pipeline {
    config: PipelineConfig,
    synth: ToneSynthesizer,
    accelerator: PolyphaseResampler,
    restorer: PolyphaseResampler,
    decoder: SpectralDecoder,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if config.compression == 0 {
            return Err(ToneWarpError::InvalidFactor { up: 1, down: 0 });
        }
        let synth = ToneSynthesizer::new(config.synth.clone())?;
        let accelerator =
            PolyphaseResampler::new(ResampleFactor::decimation(config.compression)?, &config.resampler)?;
        let restorer =
            PolyphaseResampler::new(ResampleFactor::interpolation(config.compression)?, &config.resampler)?;
        let decoder = SpectralDecoder::new(config.decoder.clone())?;
        config.live.validate()?;

        Ok(Self {
            config,
            synth,
            accelerator,
            restorer,
            decoder,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn encode(&self, text: &str) -> Result<Waveform> {
        let wave = self.synth.synthesize(text)?;
        info!(
            "Encoded {} characters into {:.2}s of audio",
            text.chars().count(),
            wave.duration_secs()
        );
        Ok(wave)
    }

    pub fn accelerate(&self, waveform: &Waveform) -> Waveform {
        let fast = self.accelerator.resample(waveform);
        info!(
            "Accelerated x{}: {} -> {} samples",
            self.config.compression,
            waveform.len(),
            fast.len()
        );
        fast
    }

    pub fn restore(&self, waveform: &Waveform) -> Waveform {
        let slow = self.restorer.resample(waveform);
        info!(
            "Restored x{}: {} -> {} samples",
            self.config.compression,
            waveform.len(),
            slow.len()
        );
        slow
    }

    pub fn decode(&self, waveform: &Waveform) -> Result<DecodeResult> {
        let result = self.decoder.decode(waveform)?;
        info!("Decoded {:?}", result.text());
        Ok(result)
    }

    /// Encode, compress, restore and decode `text`
    pub fn round_trip(&self, text: &str) -> Result<DecodeResult> {
        let wave = self.encode(text)?;
        let restored = self.restore(&self.accelerate(&wave));
        self.decode(&restored)
    }

    /// Accelerate then restore `waveform` and compare it with the input
    pub fn speed_test(&self, waveform: &Waveform) -> Result<SpeedReport> {
        let compressed = self.accelerate(waveform);
        let restored = self.restore(&compressed);

        let diff: Vec<f32> = waveform
            .samples()
            .iter()
            .zip(restored.samples())
            .map(|(a, b)| b - a)
            .collect();
        let reference = waveform.rms();
        let relative_error = if reference > 0.0 {
            rms(&diff) / reference
        } else {
            rms(&diff)
        };

        Ok(SpeedReport {
            factor: self.config.compression,
            original_len: waveform.len(),
            compressed_len: compressed.len(),
            restored_len: restored.len(),
            relative_error,
            original: self.decode(waveform)?,
            restored: self.decode(&restored)?,
        })
    }

    /// Capture loop using this pipeline's decoder and live settings
    pub fn capture_loop(&self) -> Result<CaptureLoop> {
        CaptureLoop::new(self.config.decoder.clone(), self.config.live.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pipeline(compression: u32) -> Pipeline {
        let synth = SynthConfig {
            sample_rate: 44_100,
            tone_ms: 100.0,
            silence_ms: 50.0,
            ..SynthConfig::default()
        };
        Pipeline::new(PipelineConfig {
            compression,
            ..PipelineConfig::for_synth(synth)
        })
        .unwrap()
    }

    #[test]
    fn test_round_trip_small_factor() {
        let pipeline = test_pipeline(4);
        assert_eq!(pipeline.round_trip("PIPE").unwrap().text(), "PIPE");
    }

    #[test]
    fn test_speed_test_report() {
        let pipeline = test_pipeline(10);
        let wave = pipeline.encode("SPEED").unwrap();
        let report = pipeline.speed_test(&wave).unwrap();
        assert_eq!(report.factor, 10);
        assert!(report.length_preserved());
        assert_eq!(report.compressed_len, wave.len().div_ceil(10));
        assert!(report.relative_error < 0.2, "error {}", report.relative_error);
        assert_eq!(report.original.text(), "SPEED");
        assert!(report.text_preserved(), "restored {:?}", report.restored.text());
    }

    #[test]
    fn test_zero_compression_rejected() {
        let config = PipelineConfig {
            compression: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(ToneWarpError::InvalidFactor { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_unsupported() {
        let pipeline = test_pipeline(2);
        assert!(matches!(
            pipeline.encode("NINE 9"),
            Err(ToneWarpError::UnsupportedSymbol('9'))
        ));
    }
}
