//! STFT and filterbank primitives.

use ndarray::{Array2, Axis};
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::f32::consts::PI;
use std::sync::Arc;

/// Number of pitch classes in a chromagram.
pub const N_CHROMA: usize = 12;

/// Create a periodic Hann window.
pub fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Reflect an out-of-range index back into `0..len` without repeating the edge sample.
fn reflect_index(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = index.rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Short-time Fourier transform with a planned FFT and Hann window.
///
/// Built once per frame size and reused across chunks.
#[derive(Clone)]
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();

        Self {
            n_fft,
            hop_length: hop_length.max(1),
            window: hann_window(n_fft),
            fft: planner.plan_fft_forward(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Complex spectrum `(n_fft / 2 + 1, frames)`.
    ///
    /// With `center`, the signal is reflect-padded by `n_fft / 2` on both sides
    /// so frame `t` is centered on sample `t * hop_length`. Signals shorter than
    /// one frame are zero-padded to exactly one frame.
    pub fn complex(&self, audio: &[f32], center: bool) -> Array2<Complex<f32>> {
        let n_fft = self.n_fft;
        let pad = if center && !audio.is_empty() { n_fft / 2 } else { 0 };
        let padded_len = audio.len() + 2 * pad;

        let sample = |i: usize| -> f32 {
            let j = i as isize - pad as isize;
            if j >= 0 && (j as usize) < audio.len() {
                audio[j as usize]
            } else if pad > 0 {
                audio[reflect_index(j, audio.len())]
            } else {
                0.0
            }
        };

        let num_frames = if padded_len > n_fft {
            (padded_len - n_fft) / self.hop_length + 1
        } else {
            1
        };
        let freq_bins = n_fft / 2 + 1;
        let mut spectrum = Array2::<Complex<f32>>::zeros((freq_bins, num_frames));
        let mut frame: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_length;

            for (i, value) in frame.iter_mut().enumerate() {
                let x = if start + i < padded_len {
                    sample(start + i)
                } else {
                    0.0
                };
                *value = Complex::new(x * self.window[i], 0.0);
            }

            self.fft.process(&mut frame);

            for k in 0..freq_bins {
                spectrum[[k, frame_idx]] = frame[k];
            }
        }

        spectrum
    }

    /// Magnitude spectrogram `(n_fft / 2 + 1, frames)`.
    pub fn magnitude(&self, audio: &[f32], center: bool) -> Array2<f32> {
        self.complex(audio, center).mapv(|z| z.norm())
    }
}

/// Convert frequency in Hz to the Slaney mel scale.
pub fn hz_to_mel(freq: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4_f32.ln() / 27.0;

    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / logstep
    } else {
        freq / F_SP
    }
}

/// Convert Slaney mel scale to frequency in Hz.
pub fn mel_to_hz(mel: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4_f32.ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Create an area-normalized mel filterbank `(n_mels, n_fft / 2 + 1)` over `[0, sr / 2]`.
pub fn mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: u32) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate as f32 / n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];
        let enorm = 2.0 / (right - left);

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);

            filterbank[[mel_idx, freq_idx]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    filterbank
}

/// Create a chroma filterbank `(12, n_fft / 2 + 1)` mapping FFT bins to pitch classes.
///
/// Rows start at C. Each bin spreads a Gaussian over neighbouring pitch
/// classes, columns are L2-normalized and weighted by a Gaussian over octaves
/// centered on octave 5 with width 2. Tuning is fixed at A440.
pub fn chroma_filterbank(n_fft: usize, sample_rate: u32) -> Array2<f32> {
    const CENTER_OCTAVE: f64 = 5.0;
    const OCTAVE_WIDTH: f64 = 2.0;
    let n_chroma = N_CHROMA as f64;

    // octaves relative to A0 (27.5Hz), in pitch-class units
    let mut frqbins = Vec::with_capacity(n_fft.max(1));
    frqbins.push(0.0);
    for k in 1..n_fft {
        let freq = k as f64 * sample_rate as f64 / n_fft as f64;
        frqbins.push(n_chroma * (freq / (440.0 / 16.0)).log2());
    }
    if frqbins.len() > 1 {
        frqbins[0] = frqbins[1] - 1.5 * n_chroma;
    }

    let widths: Vec<f64> = (0..frqbins.len())
        .map(|i| match frqbins.get(i + 1) {
            Some(next) => (next - frqbins[i]).max(1.0),
            None => 1.0,
        })
        .collect();

    let half = (n_chroma / 2.0).round();
    let mut weights = Array2::<f64>::from_shape_fn((N_CHROMA, frqbins.len()), |(c, i)| {
        let d = (frqbins[i] - c as f64 + half + 10.0 * n_chroma).rem_euclid(n_chroma) - half;
        (-0.5 * (2.0 * d / widths[i]).powi(2)).exp()
    });

    for (i, mut column) in weights.axis_iter_mut(Axis(1)).enumerate() {
        let norm = column.iter().map(|w| w * w).sum::<f64>().sqrt();
        let octave = (-0.5 * ((frqbins[i] / n_chroma - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();
        let scale = if norm > f64::MIN_POSITIVE { octave / norm } else { octave };
        column.mapv_inplace(|w| w * scale);
    }

    // rows above are indexed from A; rotate so row 0 is C
    let freq_bins = n_fft / 2 + 1;
    Array2::from_shape_fn((N_CHROMA, freq_bins), |(c, k)| {
        weights
            .get([(c + 3) % N_CHROMA, k])
            .copied()
            .unwrap_or(0.0) as f32
    })
}
