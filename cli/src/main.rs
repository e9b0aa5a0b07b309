mod config;
mod error;
mod wav;

use clap::{Parser, Subcommand};
use config::FileConfig;
use error::{CliError, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tonewarp_core::{
    DecodeResult, LiveEvent, Pacing, Pipeline, PipelineConfig, ReplaySource, StopHandle, Waveform,
};
use wav::{read_wav, read_wav_at, write_wav, WavFormat};

#[derive(Parser)]
#[command(name = "tonewarp")]
#[command(about = "Extended-DTMF text modem with time compression")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "CONFIG.JSON")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text to a WAV file of dual-tone bursts
    Encode {
        /// Text to encode (A-Z, 0-8 and spaces)
        text: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Tone duration in milliseconds
        #[arg(long)]
        tone_ms: Option<f32>,

        /// Silence after each tone in milliseconds
        #[arg(long)]
        silence_ms: Option<f32>,

        /// Output sample rate
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Write 32-bit float samples instead of 16-bit PCM
        #[arg(long)]
        float: bool,
    },

    /// Compress a WAV file in time by an integer factor
    Accelerate {
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Compression factor
        #[arg(short, long)]
        factor: Option<u32>,
    },

    /// Stretch an accelerated WAV file back to its original duration
    Restore {
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Compression factor used by accelerate
        #[arg(short, long)]
        factor: Option<u32>,

        /// Original sample count, as printed by accelerate
        #[arg(long)]
        length: Option<usize>,
    },

    /// Accelerate and restore a WAV file, then compare and decode both
    SpeedTest {
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Compression factor
        #[arg(short, long)]
        factor: Option<u32>,

        /// Also write the restored audio
        #[arg(long, value_name = "RESTORED.WAV")]
        restored: Option<PathBuf>,
    },

    /// Decode text from a WAV file
    Decode {
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream a WAV file through the live decoder, printing symbols as they arrive
    Listen {
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Deliver blocks at playback speed
        #[arg(long)]
        realtime: bool,

        /// Samples per block
        #[arg(long)]
        block_size: Option<usize>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut file_config = FileConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Encode {
            text,
            output,
            tone_ms,
            silence_ms,
            sample_rate,
            float,
        } => {
            file_config.synth.tone_ms = tone_ms.or(file_config.synth.tone_ms);
            file_config.synth.silence_ms = silence_ms.or(file_config.synth.silence_ms);
            file_config.synth.sample_rate = sample_rate.or(file_config.synth.sample_rate);
            let format = if float { WavFormat::Float32 } else { WavFormat::Int16 };
            encode_command(&file_config.to_pipeline_config(), &text, &output, format)
        }
        Commands::Accelerate { input, output, factor } => {
            file_config.compression = factor.or(file_config.compression);
            accelerate_command(&file_config.to_pipeline_config(), &input, &output)
        }
        Commands::Restore {
            input,
            output,
            factor,
            length,
        } => {
            file_config.compression = factor.or(file_config.compression);
            restore_command(&file_config.to_pipeline_config(), &input, &output, length)
        }
        Commands::SpeedTest {
            input,
            factor,
            restored,
        } => {
            file_config.compression = factor.or(file_config.compression);
            speed_test_command(&file_config.to_pipeline_config(), &input, restored.as_deref())
        }
        Commands::Decode { input, json } => decode_command(&file_config.to_pipeline_config(), &input, json),
        Commands::Listen {
            input,
            realtime,
            block_size,
        } => {
            file_config.live.block_size = block_size.or(file_config.live.block_size);
            listen_command(&file_config.to_pipeline_config(), &input, realtime)
        }
    }
}

fn encode_command(config: &PipelineConfig, text: &str, output: &Path, format: WavFormat) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let wave = pipeline.encode(text)?;
    write_wav(output, &wave, format)?;
    println!(
        "Encoded {} characters to {} samples ({:.2}s) in {}",
        text.chars().count(),
        wave.len(),
        wave.duration_secs(),
        output.display()
    );
    Ok(())
}

fn accelerate_command(config: &PipelineConfig, input: &Path, output: &Path) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let wave = read_wav(input)?;
    let fast = pipeline.accelerate(&wave);
    write_wav(output, &fast, WavFormat::Float32)?;
    println!(
        "Accelerated x{}: {} -> {} samples (original length {})",
        config.compression,
        wave.len(),
        fast.len(),
        wave.len()
    );
    Ok(())
}

fn restore_command(config: &PipelineConfig, input: &Path, output: &Path, length: Option<usize>) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let fast = read_wav(input)?;
    let restored = pipeline.restore(&fast);

    // A WAV file cannot carry the restore hint, so the caller supplies the length
    let restored = match length {
        Some(len) => {
            let max = fast.len() * config.compression as usize;
            if len > max {
                return Err(CliError::InvalidArgument(format!(
                    "length {} exceeds the {} samples restorable from {}",
                    len,
                    max,
                    input.display()
                )));
            }
            let mut samples = restored.into_samples();
            samples.truncate(len);
            Waveform::new(samples, fast.sample_rate())
        }
        None => restored,
    };

    write_wav(output, &restored, WavFormat::Float32)?;
    println!(
        "Restored x{}: {} -> {} samples",
        config.compression,
        fast.len(),
        restored.len()
    );
    Ok(())
}

fn speed_test_command(config: &PipelineConfig, input: &Path, restored_out: Option<&Path>) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let wave = read_wav_at(input, config.synth.sample_rate)?;
    let report = pipeline.speed_test(&wave)?;

    println!("Speed test x{}", report.factor);
    println!(
        "  lengths: original {}, compressed {}, restored {}",
        report.original_len, report.compressed_len, report.restored_len
    );
    println!("  relative error: {:.4}", report.relative_error);
    println!("  original decodes as: {:?}", report.original.text());
    println!("  restored decodes as: {:?}", report.restored.text());
    println!(
        "  {}",
        if report.text_preserved() {
            "text preserved"
        } else {
            "text changed"
        }
    );

    if let Some(path) = restored_out {
        let restored = pipeline.restore(&pipeline.accelerate(&wave));
        write_wav(path, &restored, WavFormat::Float32)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct DecodeOutput {
    text: String,
    sample_rate: u32,
    symbols: Vec<SymbolOutput>,
    windows_analyzed: usize,
    windows_silent: usize,
    windows_unmatched: usize,
}

#[derive(Serialize)]
struct SymbolOutput {
    symbol: char,
    offset: usize,
    time_ms: f64,
    windows: usize,
    energy: f32,
}

impl DecodeOutput {
    fn new(result: &DecodeResult, sample_rate: u32) -> Self {
        Self {
            text: result.text(),
            sample_rate,
            symbols: result
                .symbols
                .iter()
                .map(|s| SymbolOutput {
                    symbol: s.symbol,
                    offset: s.offset,
                    time_ms: s.offset as f64 * 1000.0 / sample_rate as f64,
                    windows: s.windows,
                    energy: s.energy,
                })
                .collect(),
            windows_analyzed: result.windows_analyzed,
            windows_silent: result.windows_silent,
            windows_unmatched: result.windows_unmatched,
        }
    }
}

fn decode_command(config: &PipelineConfig, input: &Path, json: bool) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let wave = read_wav_at(input, config.synth.sample_rate)?;
    let result = pipeline.decode(&wave)?;

    if json {
        let output = DecodeOutput::new(&result, wave.sample_rate());
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Decoded: {}", result.text());
    }
    Ok(())
}

fn listen_command(config: &PipelineConfig, input: &Path, realtime: bool) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let wave = read_wav_at(input, config.synth.sample_rate)?;
    let pacing = if realtime { Pacing::RealTime } else { Pacing::Lossless };
    let mut source = ReplaySource::new(&wave, config.live.block_size, pacing);
    let capture = pipeline.capture_loop()?;

    let stdout = std::io::stdout();
    let summary = capture.run(&mut source, &StopHandle::new(), |event| match event {
        LiveEvent::Symbol(symbol) => {
            let mut out = stdout.lock();
            let _ = write!(out, "{}", symbol.symbol);
            let _ = out.flush();
        }
        LiveEvent::Overrun { dropped_blocks } => {
            log::warn!("Dropped {} blocks", dropped_blocks);
        }
    })?;
    println!();
    println!(
        "Final decoded text (live): {} [{:?}, {} blocks, {} overruns]",
        summary.text(),
        summary.exit,
        summary.blocks,
        summary.overruns
    );
    Ok(())
}
