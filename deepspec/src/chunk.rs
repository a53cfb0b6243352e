//! Sliding-window chunking of waveforms.

use crate::audio::write_wav;
use crate::error::{ConfigError, Result};
use crate::types::{ChunkWindow, Waveform};
use std::path::{Path, PathBuf};

/// Configuration for audio cropping and chunking.
///
/// Leaving both `window` and `hop` unset processes every file as a single
/// chunk. Setting only one of them uses it for both.
#[derive(clap::Args, Clone, Copy, Debug, Default, PartialEq)]
pub struct ChunkConfig {
    /// Chunk length in seconds
    #[arg(short = 't', long)]
    pub window: Option<f64>,

    /// Step between chunk starts in seconds
    #[arg(short = 's', long)]
    pub hop: Option<f64>,

    /// Crop audio from this time in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Crop audio up to this time in seconds
    #[arg(long)]
    pub end: Option<f64>,
}

impl ChunkConfig {
    /// Create a chunking configuration without cropping.
    pub fn new(window: Option<f64>, hop: Option<f64>) -> Self {
        Self {
            window,
            hop,
            ..Default::default()
        }
    }

    /// Whole-file mode: neither window nor hop is set.
    pub fn is_whole_file(&self) -> bool {
        self.window.is_none() && self.hop.is_none()
    }

    /// Resolved `(window, hop)` in seconds, `None` in whole-file mode.
    pub fn window_hop(&self) -> Option<(f64, f64)> {
        match (self.window, self.hop) {
            (None, None) => None,
            (Some(window), None) => Some((window, window)),
            (None, Some(hop)) => Some((hop, hop)),
            (Some(window), Some(hop)) => Some((window, hop)),
        }
    }

    /// Check window, hop and crop bounds.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some((window, hop)) = self.window_hop() {
            if !(window.is_finite() && window > 0.0) {
                return Err(ConfigError::InvalidWindow(window));
            }
            if !(hop.is_finite() && hop > 0.0) {
                return Err(ConfigError::InvalidHop(hop));
            }
        }

        let inverted = self.end.is_some_and(|end| !(end > self.start));
        if !(self.start.is_finite() && self.start >= 0.0) || inverted {
            return Err(ConfigError::InvalidCrop {
                start: self.start,
                end: self.end,
            });
        }

        Ok(())
    }

    /// Create an iterator over chunk windows for a waveform of `len` samples.
    pub fn iter_windows(&self, len: usize, sample_rate: u32) -> ChunkWindowIter {
        let (window_size, step_size, count) = match self.window_hop() {
            None => (len, len, 1),
            Some((window, hop)) => {
                let window_size = ((window * sample_rate as f64) as usize).max(1);
                let step_size = ((hop * sample_rate as f64) as usize).max(1);
                // Truncating count: the final chunk may run short of a full window.
                let count = (len / step_size).max(1);
                (window_size, step_size, count)
            }
        };

        ChunkWindowIter {
            len,
            window_size,
            step_size,
            count,
            index: 0,
            offset: self.start,
            hop: self.window_hop().map(|(_, hop)| hop),
        }
    }

    /// Number of chunks a waveform of `len` samples produces.
    pub fn chunk_count(&self, len: usize, sample_rate: u32) -> usize {
        self.iter_windows(len, sample_rate).len()
    }
}

/// Iterator over chunk windows in increasing time order.
#[derive(Clone, Debug)]
pub struct ChunkWindowIter {
    len: usize,
    window_size: usize,
    step_size: usize,
    count: usize,
    index: usize,
    offset: f64,
    hop: Option<f64>,
}

impl Iterator for ChunkWindowIter {
    type Item = ChunkWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }

        let n = self.index;
        self.index += 1;

        let Some(hop) = self.hop else {
            return Some(ChunkWindow {
                range: 0..self.len,
                start_time: self.offset,
                index: None,
            });
        };

        let start = (n * self.step_size).min(self.len);
        let end = (start + self.window_size).min(self.len);

        Some(ChunkWindow {
            range: start..end,
            start_time: self.offset + n as f64 * hop,
            index: Some(n),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkWindowIter {}

impl ChunkWindow {
    /// Output file name for this chunk: `<stem>_<offset>.<ext>`, or
    /// `<stem>.<ext>` in whole-file mode.
    pub fn file_name(&self, stem: &str, extension: &str) -> String {
        match self.index {
            Some(_) => format!("{stem}_{}.{extension}", format_offset(self.start_time)),
            None => format!("{stem}.{extension}"),
        }
    }
}

/// Format a time offset with four decimals, trailing zeros trimmed.
///
/// `0.5 → "0.5"`, `1.0 → "1"`, `0.125 → "0.125"`.
pub fn format_offset(secs: f64) -> String {
    let formatted = format!("{secs:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Iterator over audio chunks with their windows.
///
/// When `wav_dir` is set, each chunk is written to
/// `<wav_dir>/<stem>_<offset>.wav` before it is yielded. Whole-file mode
/// never writes chunk audio.
pub fn chunk_audio<'a>(
    waveform: &'a Waveform,
    config: &'a ChunkConfig,
    stem: &'a str,
    wav_dir: Option<&'a Path>,
) -> impl Iterator<Item = Result<(ChunkWindow, &'a [f32])>> + 'a {
    let chunked = !config.is_whole_file();

    config
        .iter_windows(waveform.len(), waveform.sample_rate)
        .map(move |window| {
            let chunk = &waveform.samples[window.range.clone()];

            if chunked && let Some(dir) = wav_dir {
                let path: PathBuf = dir.join(window.file_name(stem, "wav"));
                tracing::debug!(path = %path.display(), "write chunk audio");
                write_wav(&path, chunk, waveform.sample_rate)?;
            }

            Ok((window, chunk))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_RATE: u32 = 16000;

    fn make_audio(duration_sec: f64) -> Waveform {
        let len = (duration_sec * SAMPLE_RATE as f64) as usize;
        Waveform::new(vec![0.1; len], SAMPLE_RATE)
    }

    #[test]
    fn whole_file_returns_single_chunk() {
        let audio = make_audio(30.0);
        let config = ChunkConfig::new(None, None);

        let windows: Vec<_> = config.iter_windows(audio.len(), SAMPLE_RATE).collect();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].range, 0..audio.len());
        assert_eq!(windows[0].index, None);
    }

    #[test]
    fn whole_file_ignores_length() {
        let config = ChunkConfig::new(None, None);

        for len in [0, 1, 7, 16000, 1_000_000] {
            assert_eq!(config.chunk_count(len, SAMPLE_RATE), 1);
        }
    }

    #[test]
    fn overlapping_chunks_follow_truncating_count() {
        let audio = make_audio(2.5);
        let config = ChunkConfig::new(Some(1.0), Some(0.5));

        let windows: Vec<_> = config.iter_windows(audio.len(), SAMPLE_RATE).collect();
        let offsets: Vec<f64> = windows.iter().map(|w| w.start_time).collect();

        // floor(40000 / 8000) = 5
        assert_eq!(offsets, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(windows[0].range, 0..16000);
        assert_eq!(windows[3].range, 24000..40000);
        // last chunk is half a window
        assert_eq!(windows[4].range, 32000..40000);
    }

    #[test]
    fn count_matches_formula_and_stays_in_bounds() {
        for (window, hop) in [(1.0, 0.5), (0.3, 0.7), (0.25, 0.25), (2.0, 0.1)] {
            let config = ChunkConfig::new(Some(window), Some(hop));
            let hop_samples = (hop * SAMPLE_RATE as f64) as usize;

            for len in [1, 100, 4000, 16001, 47999, 160000] {
                let windows: Vec<_> = config.iter_windows(len, SAMPLE_RATE).collect();

                assert_eq!(windows.len(), (len / hop_samples).max(1));
                assert!(windows.iter().all(|w| w.range.end <= len));
                assert!(windows.iter().all(|w| w.range.end > w.range.start));
            }
        }
    }

    #[test]
    fn sub_sample_window_keeps_one_sample() {
        let config = ChunkConfig::new(Some(1e-5), Some(0.5));
        assert!(config.validate().is_ok());

        let windows: Vec<_> = config.iter_windows(SAMPLE_RATE as usize, SAMPLE_RATE).collect();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].range, 0..1);
        assert_eq!(windows[1].range, 8000..8001);
        assert!(windows.iter().all(|w| w.range.end > w.range.start));
    }

    #[test]
    fn start_times_are_arithmetic() {
        let mut config = ChunkConfig::new(Some(0.4), Some(0.3));
        config.start = 2.0;

        let windows: Vec<_> = config.iter_windows(SAMPLE_RATE as usize * 3, SAMPLE_RATE).collect();

        for (n, pair) in windows.windows(2).enumerate() {
            assert!(pair[1].start_time > pair[0].start_time);
            assert!((pair[1].start_time - pair[0].start_time - 0.3).abs() < 1e-9);
            assert!((pair[0].start_time - (2.0 + n as f64 * 0.3)).abs() < 1e-9);
        }
    }

    #[test]
    fn short_audio_yields_one_short_chunk() {
        let config = ChunkConfig::new(Some(1.0), Some(0.5));

        let windows: Vec<_> = config.iter_windows(100, SAMPLE_RATE).collect();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].range, 0..100);
    }

    #[test]
    fn single_value_fills_both() {
        assert_eq!(
            ChunkConfig::new(Some(2.0), None).window_hop(),
            Some((2.0, 2.0))
        );
        assert_eq!(
            ChunkConfig::new(None, Some(0.5)).window_hop(),
            Some((0.5, 0.5))
        );
    }

    #[test]
    fn rejects_non_positive_window_and_hop() {
        assert!(matches!(
            ChunkConfig::new(Some(0.0), Some(1.0)).validate(),
            Err(ConfigError::InvalidWindow(_))
        ));
        assert!(matches!(
            ChunkConfig::new(Some(1.0), Some(-0.5)).validate(),
            Err(ConfigError::InvalidHop(_))
        ));
        assert!(ChunkConfig::new(None, None).validate().is_ok());
    }

    #[test]
    fn rejects_inverted_crop() {
        let config = ChunkConfig {
            start: 2.0,
            end: Some(1.0),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCrop { .. })
        ));
    }

    #[test]
    fn formats_offsets() {
        assert_eq!(format_offset(0.0), "0");
        assert_eq!(format_offset(0.5), "0.5");
        assert_eq!(format_offset(1.0), "1");
        assert_eq!(format_offset(10.0), "10");
        assert_eq!(format_offset(0.125), "0.125");
        assert_eq!(format_offset(1.23456), "1.2346");
    }

    #[test]
    fn names_chunk_files() {
        let config = ChunkConfig::new(Some(1.0), Some(0.5));
        let names: Vec<_> = config
            .iter_windows(SAMPLE_RATE as usize * 2, SAMPLE_RATE)
            .map(|w| w.file_name("bird", "png"))
            .collect();

        assert_eq!(names, ["bird_0.png", "bird_0.5.png", "bird_1.png", "bird_1.5.png"]);

        let whole = ChunkConfig::default().iter_windows(10, SAMPLE_RATE).next().unwrap();
        assert_eq!(whole.file_name("bird", "png"), "bird.png");
    }

    #[test]
    fn writes_chunk_audio_before_yielding() {
        let dir = TempDir::new().unwrap();
        let audio = make_audio(1.0);
        let config = ChunkConfig::new(Some(0.5), Some(0.5));

        for item in chunk_audio(&audio, &config, "clip", Some(dir.path())) {
            let (window, chunk) = item.unwrap();
            let path = dir.path().join(window.file_name("clip", "wav"));

            assert!(path.exists());
            let reader = hound::WavReader::open(&path).unwrap();
            assert_eq!(reader.len() as usize, chunk.len());
        }

        assert!(dir.path().join("clip_0.wav").exists());
        assert!(dir.path().join("clip_0.5.wav").exists());
    }

    #[test]
    fn whole_file_mode_writes_no_audio() {
        let dir = TempDir::new().unwrap();
        let audio = make_audio(0.5);
        let config = ChunkConfig::default();

        let chunks: Vec<_> = chunk_audio(&audio, &config, "clip", Some(dir.path()))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
