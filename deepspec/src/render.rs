//! Raster rendering of spectral matrices and PNG encode/decode.

use crate::colormap::Colormap;
use crate::error::{ConfigError, DecodeError, RenderError, Result};
use crate::types::{DecodedImage, SpectralMatrix};
use ndarray::{Array3, s};
use ndarray_stats::QuantileExt;
use png::{BitDepth, ColorType, Decoder, Encoder};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

/// Default raster edge length in pixels
const DEFAULT_SIZE: u32 = 227;

/// Linear region of the symmetric-log frequency axis in Hz
const LOG_LINTHRESH: f32 = 1000.0;

/// Frequency-axis scales.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrequencyScale {
    #[default]
    Linear,
    Log,
}

impl FrequencyScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for FrequencyScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyScale {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "log" => Ok(Self::Log),
            _ => Err(ConfigError::UnknownScale(s.to_string())),
        }
    }
}

/// Configuration for the raster stage.
#[derive(clap::Args, Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// Colormap for the rendered spectrum
    #[arg(long, value_enum, default_value_t = Colormap::Viridis)]
    pub cmap: Colormap,

    /// Frequency-axis scale
    #[arg(long, value_enum, default_value_t = FrequencyScale::Linear)]
    pub scale: FrequencyScale,

    /// Width and height of the square output image in pixels
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    pub size: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cmap: Colormap::default(),
            scale: FrequencyScale::default(),
            size: DEFAULT_SIZE,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::InvalidSize(self.size));
        }
        Ok(())
    }

    /// Render `matrix` to PNG bytes, writing them to `output` first if given.
    pub fn render(
        &self,
        matrix: &SpectralMatrix,
        sample_rate: u32,
        output: Option<&Path>,
    ) -> Result<Vec<u8>> {
        let pixels = rasterize(matrix, sample_rate, self)?;
        let bytes = encode_png(&pixels, self.size)?;

        if let Some(path) = output {
            tracing::debug!(path = %path.display(), "write spectrogram image");
            std::fs::write(path, &bytes).map_err(RenderError::Io)?;
        }

        Ok(bytes)
    }
}

/// Map a frequency to symmetric-log axis units (base 2).
fn symlog(freq: f32) -> f32 {
    // linscale 1 over a base-2 decade
    const LINSCALE_ADJ: f32 = 2.0;
    if freq <= LOG_LINTHRESH {
        freq * LINSCALE_ADJ
    } else {
        LOG_LINTHRESH * (LINSCALE_ADJ + (freq / LOG_LINTHRESH).log2())
    }
}

fn symlog_inverse(value: f32) -> f32 {
    const LINSCALE_ADJ: f32 = 2.0;
    if value <= LOG_LINTHRESH * LINSCALE_ADJ {
        value / LINSCALE_ADJ
    } else {
        LOG_LINTHRESH * (value / LOG_LINTHRESH - LINSCALE_ADJ).exp2()
    }
}

/// Matrix row shown at image row `y` (0 = top, highest frequency).
fn row_for_pixel(y: u32, size: u32, rows: usize, scale: FrequencyScale, nyquist: f32) -> usize {
    let height = 1.0 - (y as f32 + 0.5) / size as f32;

    let row = match scale {
        FrequencyScale::Linear => (height * rows as f32) as usize,
        FrequencyScale::Log if rows > 1 => {
            // rows are spread evenly over [0, nyquist]
            let step = nyquist / (rows - 1) as f32;
            let freq = symlog_inverse(height * symlog(nyquist));
            (freq / step + 0.5) as usize
        }
        FrequencyScale::Log => 0,
    };

    row.min(rows - 1)
}

/// Render a matrix into `size x size` RGBA pixels covering the whole canvas.
///
/// Values are normalized to the matrix min/max and colored with the
/// configured colormap. Low frequencies sit at the bottom.
pub fn rasterize(matrix: &SpectralMatrix, sample_rate: u32, config: &RenderConfig) -> Result<Vec<u8>> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Err(RenderError::EmptyMatrix { rows, cols }.into());
    }

    let min = *matrix.min()?;
    let max = *matrix.max()?;
    let range = max - min;

    let size = config.size;
    let nyquist = sample_rate as f32 / 2.0;

    let row_lookup: Vec<usize> = (0..size)
        .map(|y| row_for_pixel(y, size, rows, config.scale, nyquist))
        .collect();
    let col_lookup: Vec<usize> = (0..size)
        .map(|x| (((x as f32 + 0.5) / size as f32 * cols as f32) as usize).min(cols - 1))
        .collect();

    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for &row in &row_lookup {
        for &col in &col_lookup {
            let value = matrix[[row, col]];
            let normalized = if range > 0.0 { (value - min) / range } else { 0.0 };
            let [r, g, b] = config.cmap.rgb(normalized);
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }

    Ok(pixels)
}

/// Encode square RGBA pixels as PNG.
pub fn encode_png(pixels: &[u8], size: u32) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut encoder = Encoder::new(&mut buf, size, size);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels)?;
        writer.finish()?;
    }
    Ok(buf)
}

/// Decode 8-bit RGBA PNG bytes to `(height, width, 3)`, dropping alpha.
///
/// # Errors
///
/// Returns [`DecodeError`] when the bytes are not a PNG or not 8-bit RGBA.
pub fn decode_png(bytes: &[u8]) -> Result<DecodedImage> {
    let decoder = Decoder::new(Cursor::new(bytes));
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;

    if info.color_type != ColorType::Rgba || info.bit_depth != BitDepth::Eight {
        return Err(DecodeError::UnexpectedFormat {
            color: info.color_type,
            depth: info.bit_depth,
        }
        .into());
    }

    buf.truncate(info.buffer_size());
    let rgba = Array3::from_shape_vec((info.height as usize, info.width as usize, 4), buf)?;

    Ok(rgba.slice(s![.., .., ..3]).to_owned())
}
