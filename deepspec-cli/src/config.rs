//! Configuration types for resolved CLI arguments.
//!
//! Args structs (for CLI parsing) live in plot.rs; this module resolves
//! them into a validated plot configuration and the list of input files.

use crate::plot::Args;
use deepspec::pipeline::PlotConfig;
use eyre::{Context, Result, ensure};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Resolved configuration for a plot run.
#[derive(Debug)]
pub struct Config {
    /// WAV files in processing order
    pub files: Vec<PathBuf>,
    /// Root the output trees mirror
    pub input_root: PathBuf,
    pub plot: PlotConfig,
    pub summary: Option<PathBuf>,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let (files, input_root) = discover_inputs(&args.path)?;

        let plot = PlotConfig {
            chunk: args.chunk_config,
            transform: args.transform_config,
            render: args.render_config,
            pool: args.pool_config,
            spectrogram_dir: args.output,
            wav_dir: args.wav_dir,
        };
        plot.validate().wrap_err("invalid configuration")?;

        Ok(Self {
            files,
            input_root,
            plot,
            summary: args.summary,
        })
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

/// Collect WAV files under `path`, sorted, together with their input root.
///
/// A directory is walked recursively and is its own root. A single file's
/// root is its parent directory.
pub fn discover_inputs(path: &Path) -> Result<(Vec<PathBuf>, PathBuf)> {
    ensure!(path.exists(), "input not found: {:?}", path.display());

    if path.is_file() {
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok((vec![path.to_path_buf()], root));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.wrap_err_with(|| format!("failed to walk {:?}", path.display()))?;
        if entry.file_type().is_file() && is_wav(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    tracing::debug!(root = %path.display(), files = files.len(), "discovered inputs");

    Ok((files, path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn walks_directory_for_sorted_wavs() {
        let dir = TempDir::new().unwrap();
        for name in ["b/z.wav", "a.WAV", "b/a.wav", "notes.txt", "c/d/e.wav"] {
            touch(&dir.path().join(name));
        }

        let (files, root) = discover_inputs(dir.path()).unwrap();

        let relative: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            ["a.WAV", "b/a.wav", "b/z.wav", "c/d/e.wav"].map(PathBuf::from)
        );
        assert_eq!(root, dir.path());
    }

    #[test]
    fn single_file_uses_parent_as_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.wav");
        touch(&file);

        let (files, root) = discover_inputs(&file).unwrap();

        assert_eq!(files, vec![file]);
        assert_eq!(root, dir.path());
    }

    #[test]
    fn rejects_missing_input() {
        let dir = TempDir::new().unwrap();

        assert!(discover_inputs(&dir.path().join("nope")).is_err());
    }
}
