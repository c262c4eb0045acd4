//! Conversion of raw predictions into JSON-ready responses.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    errors::{ForensicsError, Result},
    predictor::{ClassificationResult, ManipulationClass, SegmentationResult, NUM_CLASSES},
};

/// Probability above which a mask pixel counts as manipulated.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Per-class probabilities, serialized as `{label: probability}` in class order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probabilities(pub [f32; NUM_CLASSES]);

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUM_CLASSES))?;
        for (class, probability) in ManipulationClass::ALL.iter().zip(self.0.iter()) {
            map.serialize_entry(class.label(), probability)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ClassificationResponse {
    pub class: &'static str,
    pub class_id: usize,
    pub confidence: f32,
    pub probabilities: Probabilities,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SegmentationResponse {
    /// Base64-encoded grayscale PNG at the original image size.
    pub mask: String,
    pub confidence: f32,
    /// `[width, height]`
    pub size: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AnalysisResponse {
    pub classification: ClassificationResponse,
    pub segmentation: SegmentationResponse,
}

pub fn encode_classification(result: &ClassificationResult) -> ClassificationResponse {
    ClassificationResponse {
        class: result.class.label(),
        class_id: result.class_index(),
        confidence: result.confidence(),
        probabilities: Probabilities(result.probabilities),
    }
}

/// Thresholds the mask, scales it back to `original_size` (bilinear) and
/// returns it as base64 PNG.
pub fn encode_mask(mask: &SegmentationResult, original_size: (u32, u32)) -> Result<String> {
    let (width, height) = original_size;
    if width == 0 || height == 0 {
        return Err(ForensicsError::Encode {
            operation: "mask resize".to_string(),
            source: format!("invalid target size {}x{}", width, height).into(),
        });
    }

    let binary = mask.threshold(MASK_THRESHOLD);
    let resized = imageops::resize(&binary, width, height, FilterType::Triangle);

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(resized)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ForensicsError::Encode {
            operation: "PNG encoding".to_string(),
            source: Box::new(e),
        })?;

    Ok(STANDARD.encode(buffer.into_inner()))
}

pub fn mean_confidence(mask: &SegmentationResult) -> f32 {
    mask.mean_confidence()
}

pub fn encode_segmentation(
    mask: &SegmentationResult,
    original_size: (u32, u32),
) -> Result<SegmentationResponse> {
    Ok(SegmentationResponse {
        mask: encode_mask(mask, original_size)?,
        confidence: mean_confidence(mask),
        size: [original_size.0, original_size.1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use ndarray::Array2;

    fn decode_png(encoded: &str) -> DynamicImage {
        let bytes = STANDARD.decode(encoded).unwrap();
        image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap()
    }

    fn half_mask(size: usize) -> SegmentationResult {
        SegmentationResult {
            probabilities: Array2::from_shape_fn((size, size), |(_, x)| {
                if x < size / 2 {
                    0.9
                } else {
                    0.1
                }
            }),
        }
    }

    #[test]
    fn classification_uses_labels_and_native_floats() {
        let result = ClassificationResult {
            class: ManipulationClass::Inpainting,
            probabilities: [0.1, 0.2, 0.6, 0.1],
        };
        let response = encode_classification(&result);

        assert_eq!(response.class, "Inpainting");
        assert_eq!(response.class_id, 2);
        assert_eq!(response.confidence, 0.6);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["class"], "Inpainting");
        assert_eq!(json["class_id"], 2);
        let probabilities = json["probabilities"].as_object().unwrap();
        assert_eq!(probabilities.len(), 4);
        assert!(probabilities["Copy-Move"].is_f64());
        assert!(probabilities.contains_key("Face Manipulation"));
    }

    #[test]
    fn probabilities_serialize_in_class_order() {
        let json = serde_json::to_string(&Probabilities([0.25; 4])).unwrap();
        assert_eq!(
            json,
            r#"{"Splicing":0.25,"Copy-Move":0.25,"Inpainting":0.25,"Face Manipulation":0.25}"#
        );
    }

    #[test]
    fn mask_round_trip_matches_original_size() {
        let mask = half_mask(64);
        for size in [(64, 64), (300, 200), (17, 451)] {
            let decoded = decode_png(&encode_mask(&mask, size).unwrap());
            assert_eq!(decoded.dimensions(), size);
            assert_eq!(decoded.color(), image::ColorType::L8);
        }
    }

    #[test]
    fn mask_at_native_size_is_binary() {
        let mask = half_mask(32);
        let decoded = decode_png(&encode_mask(&mask, (32, 32)).unwrap()).to_luma8();

        assert!(decoded.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(decoded.get_pixel(0, 0).0[0], 255);
        assert_eq!(decoded.get_pixel(31, 31).0[0], 0);
    }

    #[test]
    fn threshold_is_strictly_greater_than_half() {
        let mask = SegmentationResult {
            probabilities: Array2::from_elem((4, 4), MASK_THRESHOLD),
        };
        let decoded = decode_png(&encode_mask(&mask, (4, 4)).unwrap()).to_luma8();
        assert!(decoded.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn segmentation_reports_pre_threshold_mean() {
        let mask = half_mask(10);
        let response = encode_segmentation(&mask, (20, 10)).unwrap();

        assert!((response.confidence - 0.5).abs() < 1e-5);
        assert!((mean_confidence(&mask) - 0.5).abs() < 1e-5);
        assert_eq!(response.size, [20, 10]);
    }

    #[test]
    fn zero_target_size_is_an_encode_error() {
        let err = encode_mask(&half_mask(4), (0, 10)).unwrap_err();
        assert!(matches!(err, ForensicsError::Encode { .. }));
    }
}
