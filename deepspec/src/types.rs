//! Core types for deepspec

use ndarray::{Array2, Array3, Array4, ArrayView3, Axis};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Mono audio samples with their native sample rate.
#[derive(Clone, Debug)]
pub struct Waveform {
    /// Samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Half-open sample range of one chunk, tagged with its time offset.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkWindow {
    /// Sample indices `[start, end)` within the waveform
    pub range: Range<usize>,
    /// Displayed time offset in seconds (crop start included)
    pub start_time: f64,
    /// Chunk position, `None` in whole-file mode
    pub index: Option<usize>,
}

/// Time-frequency magnitudes indexed by `(frequency_bin, time_frame)`.
pub type SpectralMatrix = Array2<f32>;

/// Decoded raster `(height, width, channel)` with alpha stripped.
pub type DecodedImage = Array3<u8>;

/// Decoded images of one input file, in chunk order.
///
/// An empty result marks a file whose pipeline failed.
#[derive(Clone, Debug)]
pub struct FileResult {
    /// Input file this result belongs to
    pub path: PathBuf,
    /// One image per chunk
    pub images: Vec<DecodedImage>,
}

impl FileResult {
    pub fn new(path: impl Into<PathBuf>, images: Vec<DecodedImage>) -> Self {
        Self {
            path: path.into(),
            images,
        }
    }

    /// Result for a file that produced no images.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Vec::new())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ArrayView3<'_, u8>> {
        self.images.iter().map(|image| image.view())
    }

    /// Stack all images into `(images, height, width, channel)`.
    ///
    /// Returns `None` for an empty result.
    pub fn to_array(&self) -> Option<Array4<u8>> {
        let views: Vec<_> = self.iter().collect();
        ndarray::stack(Axis(0), &views).ok()
    }
}
