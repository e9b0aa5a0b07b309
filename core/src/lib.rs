//! Extended-DTMF text modem with polyphase time compression
//!
//! Text is rendered as dual-tone bursts from a 7×5 frequency matrix, squeezed
//! in time by an integer factor with a polyphase FIR resampler, stretched back
//! and decoded with windowed FFT peak detection, from files or a live stream.

pub mod error;
pub mod symbols;
pub mod waveform;
pub mod synth;
pub mod resample;
pub mod decoder;
pub mod live;
pub mod pipeline;

pub use decoder::{DecodeResult, DecoderConfig, DetectedSymbol, SpectralDecoder};
pub use error::{Result, ToneWarpError};
pub use live::{
    BlockSink, CaptureLoop, CaptureSource, LiveConfig, LiveDecoder, LiveEvent, LiveSummary, LoopExit,
    OverrunPolicy, Pacing, ReplaySource, StopHandle,
};
pub use pipeline::{Pipeline, PipelineConfig, SpeedReport, DEFAULT_COMPRESSION};
pub use resample::{PolyphaseResampler, ResampleFactor, ResamplerConfig};
pub use symbols::{FrequencyPair, SymbolTable};
pub use synth::{SynthConfig, ToneSynthesizer, DEFAULT_SAMPLE_RATE};
pub use waveform::{RestoreHint, Waveform};
