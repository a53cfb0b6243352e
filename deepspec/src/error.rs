//! Error types for deepspec organized by processing stage.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio loading stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Rasterization stage error
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Image decoding stage error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration errors, raised before any worker is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Window length must be positive
    #[error("invalid window length: {0}s (must be positive)")]
    InvalidWindow(f64),

    /// Hop length must be positive
    #[error("invalid hop length: {0}s (must be positive)")]
    InvalidHop(f64),

    /// Start/end crop is negative or inverted
    #[error("invalid crop: start {start}s, end {end:?}s")]
    InvalidCrop { start: f64, end: Option<f64> },

    /// Unknown transform mode identifier
    #[error("unknown transform mode: {0:?} (expected spectrogram, mel or chroma)")]
    UnknownMode(String),

    /// Unknown colormap identifier
    #[error("unknown colormap: {0:?}")]
    UnknownColormap(String),

    /// Unknown frequency-axis scale identifier
    #[error("unknown frequency scale: {0:?} (expected linear or log)")]
    UnknownScale(String),

    /// FFT frame size must be positive
    #[error("invalid fft size: {0}")]
    InvalidFftSize(usize),

    /// Mel band count must be positive
    #[error("invalid mel band count: {0}")]
    InvalidMelBands(usize),

    /// Frequency ceiling must be positive
    #[error("invalid frequency ceiling: {0}Hz")]
    InvalidYlim(f64),

    /// Output resolution must be positive
    #[error("invalid output resolution: {0}px")]
    InvalidSize(u32),

    /// Worker count must be positive
    #[error("invalid worker count: {0}")]
    InvalidWorkers(usize),

    /// Input file does not live under the input root
    #[error("{file:?} is not inside input root {root:?}")]
    OutsideInputRoot { file: PathBuf, root: PathBuf },
}

/// Audio loading and chunk persistence errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Channel count validation failed
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),

    /// Sample rate validation failed
    #[error("invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Rasterization and encoding errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Matrix has no rows or no columns
    #[error("cannot render empty matrix of shape {rows}x{cols}")]
    EmptyMatrix { rows: usize, cols: usize },

    /// PNG encoding failed
    #[error(transparent)]
    Encoding(#[from] png::EncodingError),

    /// ndarray-stats min/max error (NaN in the matrix)
    #[error(transparent)]
    MinMax(#[from] MinMaxError),

    /// Writing the image to disk failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Image decoding errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Bytes are not a PNG stream
    #[error(transparent)]
    Png(#[from] png::DecodingError),

    /// Image is valid but not 8-bit RGBA
    #[error("unexpected image format: {color:?} at {depth:?}")]
    UnexpectedFormat {
        color: png::ColorType,
        depth: png::BitDepth,
    },

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result type alias for deepspec operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}

// png::EncodingError → RenderError → Error
impl From<png::EncodingError> for Error {
    fn from(e: png::EncodingError) -> Self {
        Error::Render(RenderError::Encoding(e))
    }
}

// MinMaxError → RenderError → Error
impl From<MinMaxError> for Error {
    fn from(e: MinMaxError) -> Self {
        Error::Render(RenderError::MinMax(e))
    }
}

// png::DecodingError → DecodeError → Error
impl From<png::DecodingError> for Error {
    fn from(e: png::DecodingError) -> Self {
        Error::Decode(DecodeError::Png(e))
    }
}

// ShapeError → DecodeError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Decode(DecodeError::Shape(e))
    }
}
