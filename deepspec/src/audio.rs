//! Audio loading and persistence utilities.

use crate::error::{AudioError, Result};
use crate::types::Waveform;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Load interleaved samples from a WAV file, scaled to `[-1, 1]`.
///
/// Returns audio samples and WAV specification.
///
/// # Errors
///
/// Returns error if file cannot be read or has unsupported format.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<_>>()?
        }
    };

    Ok((samples, spec))
}

/// Average interleaved frames of `channels` samples into one mono sample each.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Strip exact-zero runs from both ends.
pub fn trim_zeros(samples: &[f32]) -> &[f32] {
    let Some(first) = samples.iter().position(|&s| s != 0.0) else {
        return &[];
    };
    // a non-zero sample exists, so rposition always finds one
    let last = samples.iter().rposition(|&s| s != 0.0).unwrap_or(first);

    &samples[first..=last]
}

/// Slice `[start, end)` seconds out of `samples`, clamped to the buffer.
///
/// `end = None` keeps everything from `start` onward.
pub fn crop(samples: &[f32], sample_rate: u32, start: f64, end: Option<f64>) -> &[f32] {
    let len = samples.len();
    let to_index = |secs: f64| ((secs * sample_rate as f64) as usize).min(len);

    let start = to_index(start);
    let end = end.map_or(len, to_index);

    if start >= end {
        return &[];
    }

    &samples[start..end]
}

/// Read a WAV file as a mono, zero-trimmed, cropped waveform.
///
/// Channels are averaged, exact-zero runs are trimmed from both ends, then
/// the `[start, end)` crop in seconds is applied at the native sample rate.
///
/// # Errors
///
/// Returns error if:
/// - File cannot be read or decoded
/// - Channel count or sample rate is zero
pub fn read_waveform(path: impl AsRef<Path>, start: f64, end: Option<f64>) -> Result<Waveform> {
    let (audio, spec) = load_audio(path)?;

    if spec.channels == 0 {
        return Err(AudioError::InvalidChannels(spec.channels).into());
    }

    if spec.sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(spec.sample_rate).into());
    }

    let mono = downmix(&audio, spec.channels);
    let trimmed = trim_zeros(&mono);
    let cropped = crop(trimmed, spec.sample_rate, start, end);

    Ok(Waveform::new(cropped.to_vec(), spec.sample_rate))
}

/// Write mono samples as a 16-bit PCM WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    Ok(())
}
