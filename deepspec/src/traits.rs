//! Seam for downstream consumers of decoded images.

use crate::error::Result;
use crate::types::FileResult;
use ndarray::{Array1, ArrayView3};

/// Turns one decoded `(height, width, 3)` image into a feature vector.
///
/// Implemented by whatever sits behind the pipeline (a CNN embedder, a
/// histogram, ...). Takes `&mut self` so stateful backends fit.
pub trait FeatureExtractor {
    fn extract(&mut self, image: ArrayView3<'_, u8>) -> Result<Array1<f32>>;

    /// Extract features for every image of one file, in chunk order.
    ///
    /// Images that fail extraction are logged and left out.
    fn extract_file(&mut self, result: &FileResult) -> Vec<Array1<f32>> {
        result
            .iter()
            .enumerate()
            .filter_map(|(chunk, image)| match self.extract(image) {
                Ok(features) => Some(features),
                Err(error) => {
                    tracing::warn!(
                        file = %result.path().display(),
                        chunk,
                        %error,
                        "feature extraction failed"
                    );
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, RenderError};
    use ndarray::{Array3, Axis};

    /// Mean intensity per channel; rejects images wider than `max_width`.
    struct ChannelMeans {
        max_width: usize,
        calls: usize,
    }

    impl FeatureExtractor for ChannelMeans {
        fn extract(&mut self, image: ArrayView3<'_, u8>) -> Result<Array1<f32>> {
            self.calls += 1;
            let (rows, cols, _) = image.dim();
            if cols > self.max_width {
                return Err(Error::Render(RenderError::EmptyMatrix { rows, cols }));
            }

            let sums = image.mapv(f32::from).sum_axis(Axis(0)).sum_axis(Axis(0));
            Ok(sums / (rows * cols) as f32)
        }
    }

    #[test]
    fn extracts_in_chunk_order() {
        let result = FileResult::new(
            "a.wav",
            vec![Array3::from_elem((2, 2, 3), 10), Array3::from_elem((2, 2, 3), 20)],
        );
        let mut extractor = ChannelMeans {
            max_width: 8,
            calls: 0,
        };

        let features = extractor.extract_file(&result);

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].to_vec(), vec![10.0; 3]);
        assert_eq!(features[1].to_vec(), vec![20.0; 3]);
    }

    #[test]
    fn skips_failed_images() {
        let result = FileResult::new(
            "b.wav",
            vec![
                Array3::from_elem((2, 16, 3), 1),
                Array3::from_elem((2, 2, 3), 4),
            ],
        );
        let mut extractor = ChannelMeans {
            max_width: 8,
            calls: 0,
        };

        let features = extractor.extract_file(&result);

        assert_eq!(extractor.calls, 2);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].to_vec(), vec![4.0; 3]);
    }

    #[test]
    fn empty_result_yields_no_features() {
        let mut extractor = ChannelMeans {
            max_width: 8,
            calls: 0,
        };

        assert!(extractor.extract_file(&FileResult::empty("c.wav")).is_empty());
        assert_eq!(extractor.calls, 0);
    }
}
