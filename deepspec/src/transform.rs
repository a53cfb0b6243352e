//! Spectral transforms: linear spectrogram, mel spectrogram and chromagram.

use crate::error::ConfigError;
use crate::filters::{Stft, chroma_filterbank, mel_filterbank};
use crate::types::SpectralMatrix;
use ndarray::{Array2, Axis, Zip, s};
use std::fmt;
use std::str::FromStr;

/// Default number of mel bands
const DEFAULT_MEL_BANDS: usize = 64;

/// Savitzky-Golay window used for derivatives
const DELTA_WIDTH: usize = 9;

/// Magnitude floor for amplitude-to-dB conversion
const AMPLITUDE_AMIN: f32 = 1e-5;

/// Power floor for power-to-dB conversion
const POWER_AMIN: f32 = 1e-10;

/// Transform mode identifiers.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransformMode {
    /// Short-time Fourier magnitude
    #[default]
    Spectrogram,
    /// Mel-filterbank energy
    Mel,
    /// Pitch-class energy
    Chroma,
}

impl TransformMode {
    pub const ALL: [Self; 3] = [Self::Spectrogram, Self::Mel, Self::Chroma];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spectrogram => "spectrogram",
            Self::Mel => "mel",
            Self::Chroma => "chroma",
        }
    }
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

/// Configuration for the spectral transform stage.
#[derive(clap::Args, Clone, Copy, Debug, PartialEq)]
pub struct TransformConfig {
    /// Type of plot to generate
    #[arg(short, long, value_enum, default_value_t = TransformMode::Spectrogram)]
    pub mode: TransformMode,

    /// FFT frame size (default: next power of two of 25ms)
    #[arg(long)]
    pub nfft: Option<usize>,

    /// Number of mel bands for mel mode
    #[arg(long, default_value_t = DEFAULT_MEL_BANDS)]
    pub mel_bands: usize,

    /// Derivative order applied before scaling
    #[arg(long)]
    pub delta: Option<usize>,

    /// Frequency ceiling in Hz
    #[arg(long)]
    pub ylim: Option<f64>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            mode: TransformMode::default(),
            nfft: None,
            mel_bands: DEFAULT_MEL_BANDS,
            delta: None,
            ylim: None,
        }
    }
}

impl TransformConfig {
    /// Create a configuration for `mode` with default parameters.
    pub fn new(mode: TransformMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(nfft) = self.nfft
            && nfft == 0
        {
            return Err(ConfigError::InvalidFftSize(nfft));
        }
        if self.mel_bands == 0 {
            return Err(ConfigError::InvalidMelBands(self.mel_bands));
        }
        if let Some(ylim) = self.ylim
            && !(ylim.is_finite() && ylim > 0.0)
        {
            return Err(ConfigError::InvalidYlim(ylim));
        }
        Ok(())
    }

    /// FFT frame size for audio at `sample_rate`.
    pub fn nfft_for(&self, sample_rate: u32) -> usize {
        self.nfft.unwrap_or_else(|| default_nfft(sample_rate))
    }

    /// Prepare the FFT plan and filterbank for audio at `sample_rate`.
    ///
    /// Both depend only on the sample rate and frame size, so one plan
    /// serves every chunk of a file.
    pub fn plan(&self, sample_rate: u32, nfft: usize) -> TransformPlan {
        TransformPlan {
            transform: SpectralTransform::new(self.mode, self.mel_bands, sample_rate, nfft),
            stft: Stft::new(nfft, nfft / 2),
            sample_rate,
            delta: self.delta.filter(|&order| order > 0),
            ylim: self.ylim,
        }
    }

    /// Run the configured transform on one chunk with a single-use plan.
    pub fn apply(&self, samples: &[f32], sample_rate: u32, nfft: usize) -> SpectralMatrix {
        self.plan(sample_rate, nfft).apply(samples)
    }
}

/// One spectral transform per mode, with its filterbank.
#[derive(Clone, Debug, PartialEq)]
pub enum SpectralTransform {
    Spectrogram,
    Mel { filterbank: Array2<f32> },
    Chroma { filterbank: Array2<f32> },
}

impl SpectralTransform {
    pub fn new(mode: TransformMode, mel_bands: usize, sample_rate: u32, nfft: usize) -> Self {
        match mode {
            TransformMode::Spectrogram => Self::Spectrogram,
            TransformMode::Mel => Self::Mel {
                filterbank: mel_filterbank(nfft, mel_bands, sample_rate),
            },
            TransformMode::Chroma => Self::Chroma {
                filterbank: chroma_filterbank(nfft, sample_rate),
            },
        }
    }

    pub fn mode(&self) -> TransformMode {
        match self {
            Self::Spectrogram => TransformMode::Spectrogram,
            Self::Mel { .. } => TransformMode::Mel,
            Self::Chroma { .. } => TransformMode::Chroma,
        }
    }

    /// Raw magnitudes (spectrogram), energies (mel) or normalized pitch-class
    /// energy (chroma), followed by the derivative of order `delta`.
    ///
    /// The spectrogram derivative is taken on the complex spectrum and its
    /// magnitude returned. Mel and chroma derivatives are taken on their
    /// energies.
    pub fn compute(&self, stft: &Stft, samples: &[f32], delta_order: Option<usize>) -> SpectralMatrix {
        match self {
            Self::Spectrogram => match delta_order {
                Some(order) => {
                    let spectrum = stft.complex(samples, false);
                    let re = delta(&spectrum.mapv(|z| z.re), order);
                    let im = delta(&spectrum.mapv(|z| z.im), order);
                    Zip::from(&re).and(&im).map_collect(|&re, &im| re.hypot(im))
                }
                None => stft.magnitude(samples, false),
            },
            Self::Mel { filterbank } => {
                let power = stft.magnitude(samples, true).mapv(|x| x * x);
                let mel = filterbank.dot(&power);
                match delta_order {
                    Some(order) => delta(&mel, order),
                    None => mel,
                }
            }
            Self::Chroma { filterbank } => {
                let power = stft.magnitude(samples, true).mapv(|x| x * x);
                let mut chroma = filterbank.dot(&power);
                for mut frame in chroma.axis_iter_mut(Axis(1)) {
                    let peak = frame.iter().fold(0.0_f32, |acc, &x| acc.max(x.abs()));
                    if peak > f32::MIN_POSITIVE {
                        frame.mapv_inplace(|x| x / peak);
                    }
                }
                match delta_order {
                    Some(order) => delta(&chroma, order),
                    None => chroma,
                }
            }
        }
    }

    /// Convert to decibels relative to the matrix peak, no lower clamp.
    ///
    /// Chromagrams are already peak-normalized and pass through unchanged.
    pub fn scale(&self, matrix: SpectralMatrix) -> SpectralMatrix {
        match self {
            Self::Spectrogram => amplitude_to_db(matrix),
            Self::Mel { .. } => power_to_db(matrix),
            Self::Chroma { .. } => matrix,
        }
    }
}

/// Transform state for one sample rate and frame size.
#[derive(Clone)]
pub struct TransformPlan {
    transform: SpectralTransform,
    stft: Stft,
    sample_rate: u32,
    delta: Option<usize>,
    ylim: Option<f64>,
}

impl TransformPlan {
    pub fn nfft(&self) -> usize {
        self.stft.n_fft()
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    /// Transform, derivative, scaling and frequency crop for one chunk.
    pub fn apply(&self, samples: &[f32]) -> SpectralMatrix {
        let matrix = self.transform.compute(&self.stft, samples, self.delta);
        let matrix = self.transform.scale(matrix);

        match self.ylim {
            Some(ylim) => crop_frequency(matrix, ylim, self.sample_rate, self.nfft()),
            None => matrix,
        }
    }
}

/// Next power of two of 25ms worth of samples.
pub fn default_nfft(sample_rate: u32) -> usize {
    ((sample_rate as f64 * 0.025) as usize)
        .max(1)
        .next_power_of_two()
}

fn peak(matrix: &Array2<f32>) -> f32 {
    matrix.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

/// `20·log10(|S|)` relative to the peak magnitude.
pub fn amplitude_to_db(matrix: SpectralMatrix) -> SpectralMatrix {
    let magnitude = matrix.mapv(f32::abs);
    let reference = 20.0 * peak(&magnitude).max(AMPLITUDE_AMIN).log10();
    magnitude.mapv(|x| 20.0 * x.max(AMPLITUDE_AMIN).log10() - reference)
}

/// `10·log10(S)` relative to the peak power.
pub fn power_to_db(matrix: SpectralMatrix) -> SpectralMatrix {
    let reference = 10.0 * peak(&matrix).max(POWER_AMIN).log10();
    matrix.mapv(|x| 10.0 * x.max(POWER_AMIN).log10() - reference)
}

/// Keep the rows below `ylim` on the FFT bin axis of `nfft`.
///
/// The kept count is the proportional share `2·ylim/sr` of the
/// `nfft / 2 + 1` FFT bins, capped at the matrix height, so mel and chroma
/// matrices with fewer rows than bins are cut only below that share. A
/// ceiling at or above Nyquist leaves the matrix unchanged.
pub fn crop_frequency(matrix: SpectralMatrix, ylim: f64, sample_rate: u32, nfft: usize) -> SpectralMatrix {
    let relative = (2.0 * ylim / sample_rate as f64).min(1.0);
    let rows = matrix.nrows();
    let bins = nfft / 2 + 1;
    let keep = ((relative * bins as f64) as usize).clamp(rows.min(1), rows);

    if keep == rows {
        return matrix;
    }
    matrix.slice(s![..keep, ..]).to_owned()
}

/// Savitzky-Golay derivative of `order` along the time axis.
///
/// Uses a window of 9 frames (or the largest odd width the frame count
/// allows) and polynomial order equal to the derivative order. Edge frames
/// take the value of the nearest full window. Matrices too short for any
/// fit return zeros.
pub fn delta(matrix: &Array2<f32>, order: usize) -> Array2<f32> {
    let frames = matrix.ncols();
    let width = DELTA_WIDTH.min(if frames % 2 == 1 { frames } else { frames.saturating_sub(1) });
    if width < 3 || width <= order {
        return Array2::zeros(matrix.raw_dim());
    }

    let half = width / 2;
    let coeffs = savgol_coeffs(width, order, order);
    let mut result = Array2::<f32>::zeros(matrix.raw_dim());

    for (row_in, mut row_out) in matrix.rows().into_iter().zip(result.rows_mut()) {
        for t in 0..frames {
            let center = t.clamp(half, frames - 1 - half);
            row_out[t] = coeffs
                .iter()
                .enumerate()
                .map(|(i, &c)| c * row_in[center + i - half] as f64)
                .sum::<f64>() as f32;
        }
    }

    result
}

/// Savitzky-Golay weights estimating the `deriv`-th derivative at the window center.
fn savgol_coeffs(window_length: usize, polyorder: usize, deriv: usize) -> Vec<f64> {
    let half = window_length as f64 / 2.0 - 0.5;
    let m = polyorder + 1;

    // Vandermonde rows x^j, x centered on the window
    let vandermonde: Vec<Vec<f64>> = (0..window_length)
        .map(|i| {
            let x = i as f64 - half;
            (0..m).map(|j| x.powi(j as i32)).collect()
        })
        .collect();

    // (A^T A) z = deriv! e_deriv
    let mut augmented = vec![vec![0.0; m + 1]; m];
    for i in 0..m {
        for j in 0..m {
            augmented[i][j] = vandermonde.iter().map(|row| row[i] * row[j]).sum();
        }
    }
    augmented[deriv][m] = (1..=deriv).map(|x| x as f64).product();

    let z = solve_augmented(augmented);

    vandermonde
        .iter()
        .map(|row| row.iter().zip(&z).map(|(a, b)| a * b).sum())
        .collect()
}

/// Gauss-Jordan elimination with partial pivoting on an `m x (m+1)` system.
fn solve_augmented(mut augmented: Vec<Vec<f64>>) -> Vec<f64> {
    let m = augmented.len();

    for i in 0..m {
        let pivot_row = (i..m)
            .max_by(|&a, &b| augmented[a][i].abs().total_cmp(&augmented[b][i].abs()))
            .unwrap_or(i);
        augmented.swap(i, pivot_row);

        let pivot = augmented[i][i];
        if pivot.abs() < 1e-30 {
            continue;
        }

        for value in augmented[i].iter_mut() {
            *value /= pivot;
        }

        for k in 0..m {
            if k == i {
                continue;
            }
            let factor = augmented[k][i];
            for j in 0..=m {
                augmented[k][j] -= factor * augmented[i][j];
            }
        }
    }

    augmented.into_iter().map(|row| row[m]).collect()
}
