//! Per-file spectrogram pipeline.
//!
//! One call runs every stage for one input file, chunk by chunk:
//! read → chunk → transform → render → decode.

use crate::audio::read_waveform;
use crate::chunk::{ChunkConfig, chunk_audio};
use crate::error::{ConfigError, Result};
use crate::pool::PoolConfig;
use crate::render::{RenderConfig, decode_png};
use crate::transform::TransformConfig;
use crate::types::{DecodedImage, FileResult};
use std::path::{Path, PathBuf};

/// Complete configuration for turning audio files into images.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlotConfig {
    pub chunk: ChunkConfig,
    pub transform: TransformConfig,
    pub render: RenderConfig,
    pub pool: PoolConfig,
    /// Root for rendered images, mirroring the input tree
    pub spectrogram_dir: Option<PathBuf>,
    /// Root for chunk audio, mirroring the input tree
    pub wav_dir: Option<PathBuf>,
}

impl PlotConfig {
    /// Check every stage's configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.chunk.validate()?;
        self.transform.validate()?;
        self.render.validate()?;
        self.pool.validate()?;
        Ok(())
    }
}

/// Directory of `file` relative to `input_root`.
pub fn relative_dir(file: &Path, input_root: &Path) -> std::result::Result<PathBuf, ConfigError> {
    let parent = file.parent().unwrap_or(Path::new(""));

    parent
        .strip_prefix(input_root)
        .map(Path::to_path_buf)
        .map_err(|_| ConfigError::OutsideInputRoot {
            file: file.to_path_buf(),
            root: input_root.to_path_buf(),
        })
}

/// Create `root/relative` if `root` is set. Concurrent creation is fine.
fn mirror_dir(root: Option<&Path>, relative: &Path) -> Result<Option<PathBuf>> {
    let Some(root) = root else {
        return Ok(None);
    };

    let dir = root.join(relative);
    std::fs::create_dir_all(&dir)?;
    Ok(Some(dir))
}

/// Encoded image of one chunk, or the error that kept it from rendering.
struct RenderedChunk {
    offset: f64,
    bytes: Result<Vec<u8>>,
}

/// Decode rendered chunks in order.
///
/// A chunk that failed to render is skipped. A read, write or decode error
/// fails the whole file.
fn decode_chunks(
    file: &Path,
    chunks: impl Iterator<Item = Result<RenderedChunk>>,
) -> Result<Vec<DecodedImage>> {
    let mut images = Vec::new();

    for chunk in chunks {
        let RenderedChunk { offset, bytes } = chunk?;

        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(
                    file = %file.display(),
                    offset,
                    %error,
                    "skipping chunk that failed to render"
                );
                continue;
            }
        };

        images.push(decode_png(&bytes)?);
    }

    Ok(images)
}

/// Run the full pipeline for one file and return its images in chunk order.
///
/// Chunks whose rendering fails are skipped. Read, write and decode failures
/// abort the file.
pub fn plot_file(file: &Path, input_root: &Path, config: &PlotConfig) -> Result<Vec<DecodedImage>> {
    let relative = relative_dir(file, input_root)?;
    let spectrogram_dir = mirror_dir(config.spectrogram_dir.as_deref(), &relative)?;
    let wav_dir = mirror_dir(config.wav_dir.as_deref(), &relative)?;

    let waveform = read_waveform(file, config.chunk.start, config.chunk.end)?;
    let nfft = config.transform.nfft_for(waveform.sample_rate);
    let plan = config.transform.plan(waveform.sample_rate, nfft);
    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    tracing::debug!(
        file = %file.display(),
        samples = waveform.len(),
        sample_rate = waveform.sample_rate,
        nfft,
        "loaded audio"
    );

    let chunks = chunk_audio(&waveform, &config.chunk, &stem, wav_dir.as_deref());
    let rendered = chunks.map(|item| -> Result<RenderedChunk> {
        let (window, samples) = item?;

        tracing::debug!(offset = window.start_time, samples = samples.len(), "plotting chunk");

        let matrix = plan.apply(samples);
        let image_path = spectrogram_dir
            .as_ref()
            .map(|dir| dir.join(window.file_name(&stem, "png")));

        Ok(RenderedChunk {
            offset: window.start_time,
            bytes: config
                .render
                .render(&matrix, waveform.sample_rate, image_path.as_deref()),
        })
    });

    decode_chunks(file, rendered)
}

/// Run [`plot_file`], degrading any failure to an empty result.
pub fn process_file(file: &Path, input_root: &Path, config: &PlotConfig) -> FileResult {
    match plot_file(file, input_root, config) {
        Ok(images) => {
            tracing::info!(file = %file.display(), images = images.len(), "plotted file");
            FileResult::new(file, images)
        }
        Err(error) => {
            tracing::warn!(file = %file.display(), %error, "no images for file");
            FileResult::empty(file)
        }
    }
}
