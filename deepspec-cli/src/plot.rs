//! Plot command - render every input file and report what was produced.

use crate::config::Config;
use deepspec::chunk::ChunkConfig;
use deepspec::pool::{PlotStream, PoolConfig};
use deepspec::render::RenderConfig;
use deepspec::transform::TransformConfig;
use deepspec::types::FileResult;
use eyre::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for a plot run.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// WAV file or directory searched recursively for WAV files
    pub path: PathBuf,

    /// Directory for rendered images (mirrors the input tree)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for chunk audio (mirrors the input tree)
    #[arg(long)]
    pub wav_dir: Option<PathBuf>,

    /// Write a JSON summary of the run to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,

    #[command(flatten)]
    pub chunk_config: ChunkConfig,

    #[command(flatten)]
    pub transform_config: TransformConfig,

    #[command(flatten)]
    pub render_config: RenderConfig,

    #[command(flatten)]
    pub pool_config: PoolConfig,
}

/// Per-file entry of the JSON summary.
#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub images: usize,
    /// `[height, width, channel]` of each image, absent when none were produced
    pub shape: Option<[usize; 3]>,
}

impl From<&FileResult> for FileSummary {
    fn from(result: &FileResult) -> Self {
        Self {
            path: result.path().to_path_buf(),
            images: result.len(),
            shape: result.images.first().map(|image| {
                let (height, width, channel) = image.dim();
                [height, width, channel]
            }),
        }
    }
}

/// JSON summary of a plot run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub files: usize,
    pub files_with_images: usize,
    pub images: usize,
    pub entries: Vec<FileSummary>,
}

impl RunSummary {
    fn new(entries: Vec<FileSummary>) -> Self {
        Self {
            files: entries.len(),
            files_with_images: entries.iter().filter(|e| e.images > 0).count(),
            images: entries.iter().map(|e| e.images).sum(),
            entries,
        }
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        input = ?config.input_root.display(),
        files = config.files.len(),
        mode = %config.plot.transform.mode,
        "plotting audio files"
    );

    let s = Instant::now();

    let stream = PlotStream::new(config.files, config.input_root, config.plot)
        .wrap_err("failed to start plot pool")?;

    let entries: Vec<FileSummary> = stream
        .map(|result| {
            tracing::debug!(file = ?result.path().display(), images = result.len(), "received file");
            FileSummary::from(&result)
        })
        .collect();

    let summary = RunSummary::new(entries);

    tracing::info!(
        duration = %format!("{:.2}s", s.elapsed().as_secs_f32()),
        files = summary.files,
        files_with_images = summary.files_with_images,
        images = summary.images,
        "plotting completed"
    );

    for entry in summary.entries.iter().filter(|e| e.images == 0) {
        tracing::warn!(file = ?entry.path.display(), "no images produced");
    }

    if let Some(path) = &config.summary {
        tracing::info!(path = ?path.display(), "write summary");

        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write summary: {:?}", path.display()))?;
    }

    Ok(())
}
