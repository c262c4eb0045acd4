pub mod config;
pub mod encoder;
pub mod errors;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod predictor;
pub mod traits;
pub mod web;

pub mod mocks;

pub use config::Config;
pub use encoder::{encode_classification, encode_mask, mean_confidence};
pub use errors::{ForensicsError, Result};
pub use model::{Device, OnnxClassifier, OnnxSegmenter};
pub use normalizer::{normalize, Image, ImageInput, Normalizer};
pub use pipeline::ForensicsPipeline;
pub use predictor::{ClassificationResult, ManipulationClass, Predictor, SegmentationResult};
pub use traits::*;
