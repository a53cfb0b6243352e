//! Colormap lookup for rasterized spectra.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Named colormaps, sampled at nine evenly spaced anchors.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Colormap {
    #[default]
    Viridis,
    Magma,
    Inferno,
    Plasma,
    Gray,
}

const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

const MAGMA: [[u8; 3]; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

const INFERNO: [[u8; 3]; 9] = [
    [0, 0, 4],
    [31, 12, 72],
    [85, 15, 109],
    [136, 34, 106],
    [186, 54, 85],
    [227, 89, 51],
    [249, 140, 10],
    [249, 201, 50],
    [252, 255, 164],
];

const PLASMA: [[u8; 3]; 9] = [
    [13, 8, 135],
    [76, 2, 161],
    [126, 3, 168],
    [169, 35, 149],
    [204, 71, 120],
    [229, 107, 93],
    [248, 148, 65],
    [253, 195, 40],
    [240, 249, 33],
];

const GRAY: [[u8; 3]; 2] = [[0, 0, 0], [255, 255, 255]];

impl Colormap {
    pub const ALL: [Self; 5] = [
        Self::Viridis,
        Self::Magma,
        Self::Inferno,
        Self::Plasma,
        Self::Gray,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viridis => "viridis",
            Self::Magma => "magma",
            Self::Inferno => "inferno",
            Self::Plasma => "plasma",
            Self::Gray => "gray",
        }
    }

    fn anchors(&self) -> &'static [[u8; 3]] {
        match self {
            Self::Viridis => &VIRIDIS,
            Self::Magma => &MAGMA,
            Self::Inferno => &INFERNO,
            Self::Plasma => &PLASMA,
            Self::Gray => &GRAY,
        }
    }

    /// Map `value` in `[0, 1]` to RGB by linear interpolation between anchors.
    ///
    /// Out-of-range and NaN values clamp to the ends of the map.
    pub fn rgb(&self, value: f32) -> [u8; 3] {
        let anchors = self.anchors();
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };

        let position = value * (anchors.len() - 1) as f32;
        let lower = (position.floor() as usize).min(anchors.len() - 2);
        let t = position - lower as f32;

        let (a, b) = (anchors[lower], anchors[lower + 1]);
        std::array::from_fn(|i| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8)
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colormap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        let name = if name == "grey" { "gray" } else { name.as_str() };

        Self::ALL
            .into_iter()
            .find(|map| map.as_str() == name)
            .ok_or_else(|| ConfigError::UnknownColormap(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_anchors() {
        assert_eq!(Colormap::Viridis.rgb(0.0), [68, 1, 84]);
        assert_eq!(Colormap::Viridis.rgb(1.0), [253, 231, 37]);
        assert_eq!(Colormap::Gray.rgb(0.0), [0, 0, 0]);
        assert_eq!(Colormap::Gray.rgb(1.0), [255, 255, 255]);
    }

    #[test]
    fn interpolates_between_anchors() {
        assert_eq!(Colormap::Gray.rgb(0.5), [128, 128, 128]);
        assert_eq!(Colormap::Viridis.rgb(0.5), [33, 144, 141]);
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(Colormap::Magma.rgb(-3.0), Colormap::Magma.rgb(0.0));
        assert_eq!(Colormap::Magma.rgb(7.0), Colormap::Magma.rgb(1.0));
        assert_eq!(Colormap::Magma.rgb(f32::NAN), Colormap::Magma.rgb(0.0));
    }

    #[test]
    fn parses_names() {
        assert_eq!("viridis".parse::<Colormap>().unwrap(), Colormap::Viridis);
        assert_eq!("Grey".parse::<Colormap>().unwrap(), Colormap::Gray);
        assert!(matches!(
            "jet".parse::<Colormap>(),
            Err(ConfigError::UnknownColormap(_))
        ));
    }
}
