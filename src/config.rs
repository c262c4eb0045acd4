use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::normalizer::{DEFAULT_MAX_INPUT_BYTES, DEFAULT_TARGET_SIZE};

/// Largest square input accepted for `--image-size`.
const MAX_IMAGE_SIZE: u32 = 4096;

/// Requested compute device. `Auto` picks CUDA when the provider is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKind {
    Auto,
    Cpu,
    Cuda,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// ONNX export of the ResNet50 manipulation classifier
    #[arg(long, env = "CLASSIFIER_MODEL_PATH", default_value = "models/classifier.onnx")]
    pub classifier_model: PathBuf,

    /// ONNX export of the DeepLabV3+ manipulation segmenter
    #[arg(long, env = "SEGMENTER_MODEL_PATH", default_value = "models/segmenter.onnx")]
    pub segmenter_model: PathBuf,

    /// Square resolution images are resized to before inference
    #[arg(long, env = "IMAGE_SIZE", default_value_t = DEFAULT_TARGET_SIZE, value_parser = check_image_size)]
    pub image_size: u32,

    #[arg(long, env = "DEVICE", value_enum, default_value_t = DeviceKind::Auto)]
    pub device: DeviceKind,

    #[arg(short, long, env = "DEVICE_ID", default_value_t = 0)]
    pub device_id: i32,

    /// ONNX Runtime intra-op threads (runtime default when unset)
    #[arg(long, env = "INTRA_THREADS")]
    pub intra_threads: Option<usize>,

    /// Maximum decoded image size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_INPUT_BYTES)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Load both models, run the warm-up pass, print a summary and exit
    #[arg(long)]
    pub check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            classifier_model: PathBuf::from("models/classifier.onnx"),
            segmenter_model: PathBuf::from("models/segmenter.onnx"),
            image_size: DEFAULT_TARGET_SIZE,
            device: DeviceKind::Auto,
            device_id: 0,
            intra_threads: None,
            max_upload_bytes: DEFAULT_MAX_INPUT_BYTES,
            request_timeout_secs: 60,
            log_level: "info".to_string(),
            check: false,
        }
    }
}

impl Config {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Request body limit: base64 inflates payloads by 4/3, plus room for
    /// multipart framing and JSON wrapping.
    pub const fn body_limit(&self) -> usize {
        self.max_upload_bytes / 3 * 4 + 64 * 1024
    }
}

fn check_image_size(s: &str) -> Result<u32, String> {
    let size: u32 = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid image size", s))?;
    if size == 0 || size > MAX_IMAGE_SIZE {
        return Err(format!(
            "image size must be between 1 and {}, got {}",
            MAX_IMAGE_SIZE, size
        ));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_command_line_defaults() {
        let parsed = Config::try_parse_from(["imdl-rs"]).unwrap();
        let default = Config::default();

        assert_eq!(parsed.bind, default.bind);
        assert_eq!(parsed.image_size, 256);
        assert_eq!(parsed.device, DeviceKind::Auto);
        assert_eq!(parsed.max_upload_bytes, default.max_upload_bytes);
        assert_eq!(parsed.request_timeout(), Duration::from_secs(60));
        assert!(!parsed.check);
    }

    #[test]
    fn parses_explicit_arguments() {
        let config = Config::try_parse_from([
            "imdl-rs",
            "--bind",
            "127.0.0.1:8080",
            "--classifier-model",
            "/models/cls.onnx",
            "--segmenter-model",
            "/models/seg.onnx",
            "--device",
            "cpu",
            "--image-size",
            "512",
            "--check",
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.classifier_model, PathBuf::from("/models/cls.onnx"));
        assert_eq!(config.segmenter_model, PathBuf::from("/models/seg.onnx"));
        assert_eq!(config.device, DeviceKind::Cpu);
        assert_eq!(config.image_size, 512);
        assert!(config.check);
    }

    #[test]
    fn rejects_out_of_range_image_size() {
        assert!(check_image_size("0").is_err());
        assert!(check_image_size("5000").is_err());
        assert!(check_image_size("abc").is_err());
        assert_eq!(check_image_size("224"), Ok(224));
    }

    #[test]
    fn body_limit_leaves_room_for_base64() {
        let config = Config {
            max_upload_bytes: 3 * 1024,
            ..Config::default()
        };
        assert!(config.body_limit() >= 4 * 1024);
    }
}
