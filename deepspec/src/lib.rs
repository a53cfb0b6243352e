//! deepspec: parallel spectrogram image generation from audio collections.
//!
//! Each input file runs through the same stages, chunk by chunk:
//!
//! - [`audio`]: read a WAV file as mono samples, trim and crop it
//! - [`chunk`]: split the waveform into fixed, possibly overlapping windows
//! - [`transform`]: compute a spectrogram, mel spectrogram or chromagram
//! - [`render`]: rasterize the matrix into a square PNG and decode it back
//!
//! [`pool::PlotStream`] fans files out over a worker pool and yields one
//! [`types::FileResult`] per file, in input order.
//!
//! # Quick Start
//!
//! ```no_run
//! use deepspec::chunk::ChunkConfig;
//! use deepspec::pipeline::PlotConfig;
//! use deepspec::pool::PlotStream;
//!
//! let mut config = PlotConfig::default();
//! config.chunk = ChunkConfig::new(Some(1.0), Some(0.5));
//!
//! let files = vec!["data/birds/owl.wav".into()];
//! for result in PlotStream::new(files, "data", config)? {
//!     println!("{}: {} images", result.path().display(), result.len());
//! }
//! # Ok::<(), deepspec::error::Error>(())
//! ```

pub mod audio;
pub mod chunk;
pub mod colormap;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod pool;
pub mod render;
pub mod traits;
pub mod transform;
pub mod types;
