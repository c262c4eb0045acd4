use std::sync::Arc;
use std::time::Instant;

use crate::{
    encoder::{
        encode_classification, encode_segmentation, AnalysisResponse, ClassificationResponse,
        SegmentationResponse,
    },
    errors::Result,
    normalizer::{ImageInput, Normalizer},
    predictor::Predictor,
};

/// Normalizer → Predictor → Encoder, run synchronously once per request.
///
/// Calls are CPU-bound; async callers should run them on a blocking thread.
pub struct ForensicsPipeline {
    predictor: Arc<Predictor>,
    normalizer: Normalizer,
}

impl ForensicsPipeline {
    pub fn new(predictor: Arc<Predictor>, normalizer: Normalizer) -> Self {
        Self {
            predictor,
            normalizer,
        }
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn classify(&self, input: &ImageInput) -> Result<ClassificationResponse> {
        let start = Instant::now();
        let (image, tensor) = self.normalizer.prepare(input)?;
        let result = self.predictor.classify(tensor.view())?;

        tracing::debug!(
            "Classified {}x{} image as {} ({:.3}) in {:?}",
            image.width(),
            image.height(),
            result.class.label(),
            result.confidence(),
            start.elapsed()
        );
        Ok(encode_classification(&result))
    }

    pub fn segment(&self, input: &ImageInput) -> Result<SegmentationResponse> {
        let start = Instant::now();
        let (image, tensor) = self.normalizer.prepare(input)?;
        let mask = self.predictor.segment(tensor.view())?;
        let response = encode_segmentation(&mask, image.dimensions())?;

        tracing::debug!(
            "Segmented {}x{} image (mean confidence {:.3}) in {:?}",
            image.width(),
            image.height(),
            response.confidence,
            start.elapsed()
        );
        Ok(response)
    }

    /// Classification and segmentation over one shared normalized tensor.
    pub fn analyze(&self, input: &ImageInput) -> Result<AnalysisResponse> {
        let start = Instant::now();
        let (image, tensor) = self.normalizer.prepare(input)?;
        let classification = self.predictor.classify(tensor.view())?;
        let mask = self.predictor.segment(tensor.view())?;

        let response = AnalysisResponse {
            classification: encode_classification(&classification),
            segmentation: encode_segmentation(&mask, image.dimensions())?,
        };

        tracing::debug!(
            "Analyzed {}x{} image: {} ({:.3}), mask confidence {:.3} in {:?}",
            image.width(),
            image.height(),
            response.classification.class,
            response.classification.confidence,
            response.segmentation.confidence,
            start.elapsed()
        );
        Ok(response)
    }
}
