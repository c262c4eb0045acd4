use crate::errors::Result;
use ndarray::prelude::*;

/// Manipulation-type classifier.
///
/// Implementations receive a normalized `[1, 3, S, S]` tensor and return raw
/// logits of shape `[1, classes]`. Soft-max is applied by the predictor.
pub trait ClassificationModel: Send + Sync {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array2<f32>>;

    /// Square input resolution the model was exported for.
    fn image_size(&self) -> u32;
}

/// Pixel-level manipulation segmenter.
///
/// Returns raw logits of shape `[1, 1, H, W]`; the predictor applies the sigmoid.
pub trait SegmentationModel: Send + Sync {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;

    fn image_size(&self) -> u32;
}
