use crate::error::{CliError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tonewarp_core::resample::{convert_rate, downmix_to_mono};
use tonewarp_core::Waveform;

/// Sample encoding for written WAV files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    Int16,
    Float32,
}

/// Read a WAV file as mono f32, downmixing multi-channel audio
pub fn read_wav(path: &Path) -> Result<Waveform> {
    let mut reader = WavReader::new(BufReader::new(File::open(path)?))?;
    let spec = reader.spec();
    info!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    // Handle 8/16/24/32-bit int and 32-bit float
    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            let ints: std::result::Result<Vec<i32>, _> = reader.samples::<i32>().collect();
            ints?.into_iter().map(|s| s as f32 / scale).collect()
        }
        (SampleFormat::Float, 32) => {
            let floats: std::result::Result<Vec<f32>, _> = reader.samples::<f32>().collect();
            floats?
        }
        (format, bits) => {
            return Err(CliError::UnsupportedFormat {
                bits,
                format: match format {
                    SampleFormat::Int => "int",
                    SampleFormat::Float => "float",
                },
            })
        }
    };

    let mono = downmix_to_mono(&interleaved, spec.channels as usize);
    debug!("Extracted {} mono samples", mono.len());
    Ok(Waveform::new(mono, spec.sample_rate))
}

/// Read a WAV file and bring it to `sample_rate` when it differs
pub fn read_wav_at(path: &Path, sample_rate: u32) -> Result<Waveform> {
    let wave = read_wav(path)?;
    if wave.sample_rate() == sample_rate {
        return Ok(wave);
    }
    info!("Converting {} Hz -> {} Hz", wave.sample_rate(), sample_rate);
    Ok(convert_rate(&wave, sample_rate)?)
}

pub fn write_wav(path: &Path, wave: &Waveform, format: WavFormat) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate(),
        bits_per_sample: match format {
            WavFormat::Int16 => 16,
            WavFormat::Float32 => 32,
        },
        sample_format: match format {
            WavFormat::Int16 => SampleFormat::Int,
            WavFormat::Float32 => SampleFormat::Float,
        },
    };

    let mut writer = WavWriter::create(path, spec)?;
    match format {
        WavFormat::Int16 => {
            for &sample in wave.samples() {
                // Clamp to [-1.0, 1.0] to avoid overflow, then scale to i16
                let clamped = sample.clamp(-1.0, 1.0);
                writer.write_sample((clamped * 32767.0) as i16)?;
            }
        }
        WavFormat::Float32 => {
            for &sample in wave.samples() {
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize()?;

    info!(
        "Wrote {} samples ({:.2}s) to {}",
        wave.len(),
        wave.duration_secs(),
        path.display()
    );
    Ok(())
}
