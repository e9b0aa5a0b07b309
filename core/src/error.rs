use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToneWarpError {
    #[error("Unsupported symbol {0:?}")]
    UnsupportedSymbol(char),

    #[error("Invalid resample factor {up}/{down}")]
    InvalidFactor { up: u32, down: u32 },

    #[error("No symbol matches tone pair ({low:.1} Hz, {high:.1} Hz)")]
    NoMatch { low: f32, high: f32 },

    #[error("Capture queue overrun (capacity {capacity} blocks)")]
    CaptureOverrun { capacity: usize },

    #[error("Capture already stopped")]
    CaptureStopped,

    #[error("Capture source error: {0}")]
    Capture(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT error: {0}")]
    FftError(String),
}

pub type Result<T> = std::result::Result<T, ToneWarpError>;
