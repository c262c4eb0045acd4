use std::time::Duration;

use crate::errors::{ForensicsError, Result};
use crate::traits::{ClassificationModel, SegmentationModel};
use ndarray::prelude::*;

/// Test classifier returning fixed logits for any input.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    pub logits: Vec<f32>,
    pub image_size: u32,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockClassifier {
    pub fn new(logits: Vec<f32>) -> Self {
        Self {
            logits,
            image_size: 256,
            failure: None,
            delay: None,
        }
    }

    /// Equal logits for all four classes.
    pub fn uniform() -> Self {
        Self::new(vec![0.0; 4])
    }

    /// Every call fails with an inference error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::uniform()
        }
    }

    /// Blocks the calling thread for `delay` before answering with uniform logits.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::uniform()
        }
    }
}

impl ClassificationModel for MockClassifier {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array2<f32>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = &self.failure {
            return Err(ForensicsError::inference("mock classifier", message.clone()));
        }
        let batch = tensor.shape()[0];
        let row = Array1::from(self.logits.clone());
        let mut logits = Array2::<f32>::zeros((batch, self.logits.len()));
        for mut out in logits.rows_mut() {
            out.assign(&row);
        }
        Ok(logits)
    }

    fn image_size(&self) -> u32 {
        self.image_size
    }
}

#[derive(Debug, Clone, Copy)]
enum MaskPattern {
    Constant(f32),
    /// Positive logits on the left half, negative on the right.
    Split,
}

/// Test segmenter producing a deterministic logit mask at the input resolution.
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    pub image_size: u32,
    pattern: MaskPattern,
    failure: Option<String>,
}

impl MockSegmenter {
    pub const fn constant(logit: f32) -> Self {
        Self {
            image_size: 256,
            pattern: MaskPattern::Constant(logit),
            failure: None,
        }
    }

    pub const fn split() -> Self {
        Self {
            image_size: 256,
            pattern: MaskPattern::Split,
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::constant(0.0)
        }
    }
}

impl SegmentationModel for MockSegmenter {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        if let Some(message) = &self.failure {
            return Err(ForensicsError::inference("mock segmenter", message.clone()));
        }
        let shape = tensor.shape();
        let (batch, height, width) = (shape[0], shape[2], shape[3]);
        let mask = match self.pattern {
            MaskPattern::Constant(logit) => Array4::from_elem((batch, 1, height, width), logit),
            MaskPattern::Split => Array4::from_shape_fn((batch, 1, height, width), |(_, _, _, x)| {
                if x < width / 2 {
                    4.0
                } else {
                    -4.0
                }
            }),
        };
        Ok(mask)
    }

    fn image_size(&self) -> u32 {
        self.image_size
    }
}

/// Factory for tests: equal-probability classifier and left/right split segmenter.
pub fn create_mock_models() -> (MockClassifier, MockSegmenter) {
    (MockClassifier::uniform(), MockSegmenter::split())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_classifier_repeats_logits_per_batch_item() -> Result<()> {
        let mock = MockClassifier::new(vec![1.0, 2.0, 3.0, 4.0]);
        let logits = mock.predict(Array4::<f32>::zeros((2, 3, 8, 8)).view())?;
        assert_eq!(logits.shape(), &[2, 4]);
        assert_eq!(logits.row(1).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn mock_segmenter_matches_input_resolution() -> Result<()> {
        let (_, mock) = create_mock_models();
        let mask = mock.predict(Array4::<f32>::zeros((1, 3, 32, 24)).view())?;
        assert_eq!(mask.shape(), &[1, 1, 32, 24]);
        assert_eq!(mask[[0, 0, 0, 0]], 4.0);
        assert_eq!(mask[[0, 0, 0, 23]], -4.0);
        Ok(())
    }
}
