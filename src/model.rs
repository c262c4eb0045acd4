use std::{fmt, path::Path};

use ndarray::prelude::*;
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;

use crate::{
    config::{Config, DeviceKind},
    errors::{ForensicsError, Result},
    traits::{ClassificationModel, SegmentationModel},
};

/// Compute device, decided once at start-up and shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(i32),
}

impl Device {
    pub fn select(kind: DeviceKind, device_id: i32) -> Self {
        match kind {
            DeviceKind::Cpu => Self::Cpu,
            DeviceKind::Cuda => Self::Cuda(device_id),
            DeviceKind::Auto => {
                let available = CUDAExecutionProvider::default()
                    .is_available()
                    .unwrap_or(false);
                if available {
                    Self::Cuda(device_id)
                } else {
                    Self::Cpu
                }
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub device: Device,
    pub intra_threads: Option<usize>,
    /// Used when the model's input shape is dynamic.
    pub fallback_image_size: u32,
}

impl SessionOptions {
    pub fn from_config(config: &Config, device: Device) -> Self {
        Self {
            device,
            intra_threads: config.intra_threads,
            fallback_image_size: config.image_size,
        }
    }
}

/// A single ONNX Runtime session taking one `[1, 3, S, S]` image tensor.
pub struct OnnxModel {
    pub image_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxModel {
    pub fn load(model_path: &Path, options: &SessionOptions) -> Result<Self> {
        if !model_path.exists() {
            return Err(ForensicsError::Configuration {
                message: format!("model file not found: {}", model_path.display()),
            });
        }

        tracing::info!(
            "Loading model from {} on {}",
            model_path.display(),
            options.device
        );

        let mut builder = Session::builder()
            .map_err(|e| ForensicsError::model("session builder initialization", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ForensicsError::model("optimization level setup", e))?;

        if let Some(threads) = options.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| ForensicsError::model("intra-op thread setup", e))?;
        }

        if let Device::Cuda(device_id) = options.device {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()
                    .error_on_failure()])
                .map_err(|e| ForensicsError::model("CUDA execution provider setup", e))?;
        }

        let mut session = builder.commit_from_file(model_path).map_err(|e| {
            ForensicsError::model(format!("model file load: {}", model_path.display()), e)
        })?;

        let input = session.inputs.first().ok_or_else(|| {
            ForensicsError::model("model input discovery", "model has no inputs")
        })?;
        let input_name = input.name.clone();
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&dim| dim > 0)
            .map_or(options.fallback_image_size, |dim| dim as u32);

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| {
                ForensicsError::model("model output discovery", "model has no outputs")
            })?;

        tracing::debug!(
            "Model io: input '{}' ({}x{}), output '{}'",
            input_name,
            image_size,
            image_size,
            output_name
        );

        // warm-up
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| ForensicsError::model("warm-up tensor creation", e))?])
            .map_err(|e| ForensicsError::model("warm-up inference", e))?;

        Ok(Self {
            image_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned())
    }
}

/// ResNet50 classifier exported with a `[1, 4]` logit head.
pub struct OnnxClassifier {
    model: OnnxModel,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, options: &SessionOptions) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load(model_path, options)?,
        })
    }
}

impl ClassificationModel for OnnxClassifier {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array2<f32>> {
        let logits = self.model.predict(tensor)?;
        let shape = logits.shape().to_vec();
        logits.into_dimensionality::<Ix2>().map_err(|_| {
            ForensicsError::inference(
                "classifier output",
                format!("expected a 2-D logit tensor, got shape {:?}", shape),
            )
        })
    }

    fn image_size(&self) -> u32 {
        self.model.image_size
    }
}

/// DeepLabV3+ segmenter exported with a single-channel `[1, 1, H, W]` head.
pub struct OnnxSegmenter {
    model: OnnxModel,
}

impl OnnxSegmenter {
    pub fn load(model_path: &Path, options: &SessionOptions) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load(model_path, options)?,
        })
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let logits = self.model.predict(tensor)?;
        let shape = logits.shape().to_vec();
        logits.into_dimensionality::<Ix4>().map_err(|_| {
            ForensicsError::inference(
                "segmenter output",
                format!("expected a 4-D mask tensor, got shape {:?}", shape),
            )
        })
    }

    fn image_size(&self) -> u32 {
        self.model.image_size
    }
}

/// Loads both networks. Any failure here is fatal to the process.
pub fn load_models(config: &Config, device: Device) -> Result<(OnnxClassifier, OnnxSegmenter)> {
    let options = SessionOptions::from_config(config, device);

    tracing::info!("Loading ResNet50 classification model...");
    let classifier = OnnxClassifier::load(&config.classifier_model, &options)?;
    tracing::info!("Classification model loaded");

    tracing::info!("Loading DeepLabV3+ segmentation model...");
    let segmenter = OnnxSegmenter::load(&config.segmenter_model, &options)?;
    tracing::info!("Segmentation model loaded");

    if classifier.image_size() != config.image_size || segmenter.image_size() != config.image_size
    {
        return Err(ForensicsError::Configuration {
            message: format!(
                "models expect {}x{} (classifier) and {}x{} (segmenter) inputs, but --image-size is {}",
                classifier.image_size(),
                classifier.image_size(),
                segmenter.image_size(),
                segmenter.image_size(),
                config.image_size
            ),
        });
    }

    Ok((classifier, segmenter))
}
