use std::sync::Arc;

use image::{GrayImage, Luma};
use ndarray::prelude::*;
use parking_lot::RwLock;

use crate::{
    errors::{ForensicsError, Result},
    model::Device,
    traits::{ClassificationModel, SegmentationModel},
};

/// The four manipulation categories, in the classifier's output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManipulationClass {
    Splicing,
    CopyMove,
    Inpainting,
    FaceManipulation,
}

impl ManipulationClass {
    pub const ALL: [Self; 4] = [
        Self::Splicing,
        Self::CopyMove,
        Self::Inpainting,
        Self::FaceManipulation,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Splicing => "Splicing",
            Self::CopyMove => "Copy-Move",
            Self::Inpainting => "Inpainting",
            Self::FaceManipulation => "Face Manipulation",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

pub const NUM_CLASSES: usize = ManipulationClass::ALL.len();

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub class: ManipulationClass,
    /// Soft-max output indexed by [`ManipulationClass::index`].
    pub probabilities: [f32; NUM_CLASSES],
}

impl ClassificationResult {
    pub fn class_index(&self) -> usize {
        self.class.index()
    }

    pub fn confidence(&self) -> f32 {
        self.probabilities[self.class.index()]
    }
}

/// Per-pixel manipulation probabilities in `[0, 1]`, `(height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResult {
    pub probabilities: Array2<f32>,
}

impl SegmentationResult {
    /// `(width, height)` of the mask.
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width) = self.probabilities.dim();
        (width as u32, height as u32)
    }

    /// Binary mask: 255 where the probability is strictly above `threshold`, 0 elsewhere.
    pub fn threshold(&self, threshold: f32) -> GrayImage {
        let (width, height) = self.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            if self.probabilities[[y as usize, x as usize]] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Spatial mean of the pre-threshold probabilities.
    pub fn mean_confidence(&self) -> f32 {
        self.probabilities.mean().unwrap_or(0.0)
    }
}

#[derive(Clone)]
struct LoadedModels {
    classifier: Arc<dyn ClassificationModel>,
    segmenter: Arc<dyn SegmentationModel>,
}

enum ModelState {
    Unloaded,
    Loaded(LoadedModels),
}

/// Owns the two models for the lifetime of the process.
///
/// Starts `Unloaded`; [`Predictor::install`] moves it to `Loaded` exactly once.
/// Inference only takes the read lock long enough to clone the model handles.
pub struct Predictor {
    device: Device,
    state: RwLock<ModelState>,
}

impl Predictor {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            state: RwLock::new(ModelState::Unloaded),
        }
    }

    pub fn with_models(
        device: Device,
        classifier: Arc<dyn ClassificationModel>,
        segmenter: Arc<dyn SegmentationModel>,
    ) -> Self {
        Self {
            device,
            state: RwLock::new(ModelState::Loaded(LoadedModels {
                classifier,
                segmenter,
            })),
        }
    }

    pub fn install(
        &self,
        classifier: Arc<dyn ClassificationModel>,
        segmenter: Arc<dyn SegmentationModel>,
    ) -> Result<()> {
        let mut state = self.state.write();
        if let ModelState::Loaded(_) = *state {
            return Err(ForensicsError::Configuration {
                message: "models are already loaded".to_string(),
            });
        }
        *state = ModelState::Loaded(LoadedModels {
            classifier,
            segmenter,
        });
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.read(), ModelState::Loaded(_))
    }

    pub const fn device(&self) -> Device {
        self.device
    }

    fn models(&self) -> Result<LoadedModels> {
        match &*self.state.read() {
            ModelState::Loaded(models) => Ok(models.clone()),
            ModelState::Unloaded => Err(ForensicsError::ModelNotLoaded),
        }
    }

    pub fn classify(&self, tensor: ArrayView4<f32>) -> Result<ClassificationResult> {
        let models = self.models()?;
        let logits = models.classifier.predict(tensor)?;

        if logits.shape() != [1, NUM_CLASSES] {
            return Err(ForensicsError::inference(
                "classification",
                format!(
                    "expected logits of shape [1, {}], got {:?}",
                    NUM_CLASSES,
                    logits.shape()
                ),
            ));
        }
        let logits = logits.row(0);
        ensure_finite(logits.iter(), "classification")?;

        let probabilities = softmax(logits);
        let best = argmax(probabilities.view());
        let class = ManipulationClass::from_index(best).ok_or_else(|| {
            ForensicsError::inference("classification", format!("class index {} out of range", best))
        })?;

        let mut output = [0.0; NUM_CLASSES];
        for (slot, p) in output.iter_mut().zip(probabilities.iter()) {
            *slot = *p;
        }

        Ok(ClassificationResult {
            class,
            probabilities: output,
        })
    }

    pub fn segment(&self, tensor: ArrayView4<f32>) -> Result<SegmentationResult> {
        let models = self.models()?;
        let logits = models.segmenter.predict(tensor)?;

        let shape = logits.shape();
        if shape[0] != 1 || shape[1] != 1 || shape[2] == 0 || shape[3] == 0 {
            return Err(ForensicsError::inference(
                "segmentation",
                format!("expected a mask of shape [1, 1, H, W], got {:?}", shape),
            ));
        }
        ensure_finite(logits.iter(), "segmentation")?;

        let probabilities = logits.slice(s![0, 0, .., ..]).mapv(sigmoid);
        Ok(SegmentationResult { probabilities })
    }
}

/// Numerically stable soft-max.
pub fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Index of the first maximum.
fn argmax(values: ArrayView1<f32>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value {
                (i, v)
            } else {
                (best, best_value)
            }
        })
        .0
}

fn ensure_finite<'a>(mut values: impl Iterator<Item = &'a f32>, operation: &str) -> Result<()> {
    if values.all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ForensicsError::inference(
            operation,
            "model produced non-finite logits",
        ))
    }
}
