//! JSON configuration file, mirrored onto the core config structs
//!
//! Every field is optional; missing fields keep the core defaults. Decoder
//! timing defaults are derived from the final synthesis settings.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tonewarp_core::{DecoderConfig, OverrunPolicy, PipelineConfig, SynthConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub synth: SynthSection,
    pub resampler: ResamplerSection,
    pub decoder: DecoderSection,
    pub live: LiveSection,
    pub compression: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthSection {
    pub sample_rate: Option<u32>,
    pub tone_ms: Option<f32>,
    pub silence_ms: Option<f32>,
    pub amplitude: Option<f32>,
    pub fade_ms: Option<f32>,
    pub word_gap_ms: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResamplerSection {
    pub kaiser_beta: Option<f64>,
    pub taps_per_phase: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderSection {
    pub window_ms: Option<f32>,
    pub hop_ms: Option<f32>,
    pub energy_threshold: Option<f32>,
    pub min_rms: Option<f32>,
    pub tolerance_hz: Option<f32>,
    pub min_twist_ratio: Option<f32>,
    pub min_run: Option<usize>,
    pub word_gap_ms: Option<f32>,
    /// Disable space detection entirely
    pub no_spaces: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveSection {
    pub queue_capacity: Option<usize>,
    pub block_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub overrun_policy: Option<PolicyName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyName {
    Resync,
    Stop,
}

impl From<PolicyName> for OverrunPolicy {
    fn from(name: PolicyName) -> Self {
        match name {
            PolicyName::Resync => OverrunPolicy::Resync,
            PolicyName::Stop => OverrunPolicy::Stop,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let s = &self.synth;
        let base = SynthConfig::default();
        let synth = SynthConfig {
            sample_rate: s.sample_rate.unwrap_or(base.sample_rate),
            tone_ms: s.tone_ms.unwrap_or(base.tone_ms),
            silence_ms: s.silence_ms.unwrap_or(base.silence_ms),
            amplitude: s.amplitude.unwrap_or(base.amplitude),
            fade_ms: s.fade_ms.unwrap_or(base.fade_ms),
            word_gap_ms: s.word_gap_ms.unwrap_or(base.word_gap_ms),
        };

        let mut config = PipelineConfig::for_synth(synth);
        if let Some(m) = self.compression {
            config.compression = m;
        }

        let r = &self.resampler;
        if let Some(beta) = r.kaiser_beta {
            config.resampler.kaiser_beta = beta;
        }
        if let Some(taps) = r.taps_per_phase {
            config.resampler.taps_per_phase = taps;
        }

        let d = &self.decoder;
        let derived = config.decoder.clone();
        config.decoder = DecoderConfig {
            window_ms: d.window_ms.unwrap_or(derived.window_ms),
            hop_ms: d.hop_ms.unwrap_or(derived.hop_ms),
            energy_threshold: d.energy_threshold.unwrap_or(derived.energy_threshold),
            min_rms: d.min_rms.unwrap_or(derived.min_rms),
            tolerance_hz: d.tolerance_hz.unwrap_or(derived.tolerance_hz),
            min_twist_ratio: d.min_twist_ratio.unwrap_or(derived.min_twist_ratio),
            min_run: d.min_run.unwrap_or(derived.min_run),
            word_gap_ms: if d.no_spaces {
                None
            } else {
                d.word_gap_ms.or(derived.word_gap_ms)
            },
        };

        let l = &self.live;
        if let Some(capacity) = l.queue_capacity {
            config.live.queue_capacity = capacity;
        }
        if let Some(block) = l.block_size {
            config.live.block_size = block;
        }
        if let Some(poll) = l.poll_interval_ms {
            config.live.poll_interval_ms = poll;
        }
        if let Some(policy) = l.overrun_policy {
            config.live.overrun_policy = policy.into();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let parsed: FileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, FileConfig::default());
        assert_eq!(parsed.to_pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn test_partial_overrides() {
        let parsed: FileConfig = serde_json::from_str(
            r#"{
                "synth": { "tone_ms": 200, "silence_ms": 90 },
                "decoder": { "tolerance_hz": 25 },
                "live": { "overrun_policy": "stop" },
                "compression": 6
            }"#,
        )
        .unwrap();
        let config = parsed.to_pipeline_config();
        assert_eq!(config.synth.tone_ms, 200.0);
        assert_eq!(config.compression, 6);
        assert_eq!(config.decoder.tolerance_hz, 25.0);
        // Window follows the synthesis timing unless set
        assert!((config.decoder.window_ms - 60.0).abs() < 1e-4);
        assert_eq!(config.live.overrun_policy, OverrunPolicy::Stop);
    }

    #[test]
    fn test_no_spaces() {
        let parsed: FileConfig = serde_json::from_str(r#"{ "decoder": { "no_spaces": true } }"#).unwrap();
        assert_eq!(parsed.to_pipeline_config().decoder.word_gap_ms, None);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<FileConfig>(r#"{ "synth": { "tempo": 3 } }"#).is_err());
    }
}
