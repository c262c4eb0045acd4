//! Decoding and normalization of inbound images.
//!
//! Every request enters the core as an [`ImageInput`], is decoded into a
//! canonical RGB [`Image`], and is turned into a `[1, 3, S, S]` tensor
//! normalized with ImageNet statistics.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{ForensicsError, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub const DEFAULT_TARGET_SIZE: u32 = 256;
pub const DEFAULT_MAX_INPUT_BYTES: usize = 50 * 1024 * 1024;

/// Image payload as it arrives at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Raw encoded file bytes (multipart upload).
    Bytes(Vec<u8>),
    /// Base64 text, optionally prefixed with a `data:<mime>;base64,` header.
    Base64(String),
}

/// Decoded RGB pixel grid.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: RgbImage,
}

impl Image {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `(width, height)` of the image as decoded.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }
}

impl From<DynamicImage> for Image {
    fn from(image: DynamicImage) -> Self {
        Self::from_rgb(image.to_rgb8())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    target_size: u32,
    max_input_bytes: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SIZE, DEFAULT_MAX_INPUT_BYTES)
    }
}

impl Normalizer {
    pub const fn new(target_size: u32, max_input_bytes: usize) -> Self {
        Self {
            target_size,
            max_input_bytes,
        }
    }

    pub const fn target_size(&self) -> u32 {
        self.target_size
    }

    pub fn decode(&self, input: &ImageInput) -> Result<Image> {
        match input {
            ImageInput::Bytes(bytes) => self.decode_bytes(bytes),
            ImageInput::Base64(text) => self.decode_base64(text),
        }
    }

    pub fn decode_base64(&self, text: &str) -> Result<Image> {
        // line-wrapped payloads (MIME, `base64` CLI) carry newlines
        let payload: Vec<u8> = strip_data_url(text.trim())
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if payload.is_empty() {
            return Err(ForensicsError::decode("base64 payload is empty"));
        }
        let bytes = STANDARD.decode(&payload)?;
        self.decode_bytes(&bytes)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Image> {
        if bytes.is_empty() {
            return Err(ForensicsError::decode("image data is empty"));
        }
        if bytes.len() > self.max_input_bytes {
            return Err(ForensicsError::decode(format!(
                "image data is too large: {} bytes (max: {} bytes)",
                bytes.len(),
                self.max_input_bytes
            )));
        }

        let image = image::load_from_memory(bytes)?;
        Ok(Image::from(image))
    }

    /// Forced square resize (aspect ratio is not kept), then per-channel
    /// `(pixel / 255 - mean) / std`.
    pub fn normalize(&self, image: &Image) -> Array4<f32> {
        let size = self.target_size;
        let resized = imageops::resize(image.as_rgb(), size, size, FilterType::Lanczos3);

        let mut tensor = resized.as_ndarray3().mapv(|v| f32::from(v) / 255.0);
        for (channel, mut plane) in tensor.outer_iter_mut().enumerate() {
            let (mean, std) = (IMAGENET_MEAN[channel], IMAGENET_STD[channel]);
            plane.mapv_inplace(|v| (v - mean) / std);
        }

        tensor.insert_axis(Axis(0))
    }

    /// Decodes and normalizes in one step, keeping the decoded image so callers
    /// can recover the original dimensions.
    pub fn prepare(&self, input: &ImageInput) -> Result<(Image, Array4<f32>)> {
        let image = self.decode(input)?;
        let tensor = self.normalize(&image);
        Ok((image, tensor))
    }
}

/// Decodes `input` and returns its normalized `[1, 3, target_size, target_size]` tensor.
pub fn normalize(input: &ImageInput, target_size: u32) -> Result<Array4<f32>> {
    let normalizer = Normalizer::new(target_size, DEFAULT_MAX_INPUT_BYTES);
    let image = normalizer.decode(input)?;
    Ok(normalizer.normalize(&image))
}

fn strip_data_url(text: &str) -> &str {
    match text.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn tensor_shape_is_fixed_regardless_of_input_size() {
        for (w, h) in [(100, 100), (640, 480), (31, 977), (1, 1)] {
            let bytes = png_bytes(DynamicImage::new_rgb8(w, h));
            let tensor = normalize(&ImageInput::Bytes(bytes), 256).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 256, 256], "input {}x{}", w, h);
        }
    }

    #[test]
    fn black_pixels_map_to_negative_mean_over_std() {
        let image = Image::from_rgb(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let tensor = Normalizer::new(8, DEFAULT_MAX_INPUT_BYTES).normalize(&image);

        for c in 0..3 {
            let expected = -IMAGENET_MEAN[c] / IMAGENET_STD[c];
            for v in tensor.slice(s![0, c, .., ..]).iter() {
                assert!((v - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn channels_stay_in_rgb_order() {
        let image = Image::from_rgb(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));
        let tensor = Normalizer::new(4, DEFAULT_MAX_INPUT_BYTES).normalize(&image);

        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = -IMAGENET_MEAN[1] / IMAGENET_STD[1];
        assert!((tensor[[0, 0, 2, 2]] - red).abs() < 1e-4);
        assert!((tensor[[0, 1, 2, 2]] - green).abs() < 1e-4);
    }

    #[test]
    fn alpha_and_grayscale_inputs_become_rgb() {
        let normalizer = Normalizer::default();

        let rgba = png_bytes(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            5,
            7,
            Rgba([10, 20, 30, 0]),
        )));
        let image = normalizer.decode_bytes(&rgba).unwrap();
        assert_eq!(image.dimensions(), (5, 7));
        assert_eq!(image.as_rgb().get_pixel(0, 0), &Rgb([10, 20, 30]));

        let gray = png_bytes(DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(
            3,
            3,
            LumaA([128, 255]),
        )));
        let image = normalizer.decode_bytes(&gray).unwrap();
        assert_eq!(image.as_rgb().get_pixel(1, 1), &Rgb([128, 128, 128]));
    }

    #[test]
    fn base64_with_and_without_data_url_prefix() {
        let encoded = STANDARD.encode(png_bytes(DynamicImage::new_rgb8(12, 9)));
        let normalizer = Normalizer::default();

        let plain = normalizer.decode_base64(&encoded).unwrap();
        let prefixed = normalizer
            .decode_base64(&format!("data:image/png;base64,{}", encoded))
            .unwrap();

        assert_eq!(plain.dimensions(), (12, 9));
        assert_eq!(prefixed.dimensions(), (12, 9));
    }

    #[test]
    fn line_wrapped_base64_is_accepted() {
        let encoded = STANDARD.encode(png_bytes(DynamicImage::new_rgb8(40, 30)));
        assert!(encoded.len() > 76);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");

        let normalizer = Normalizer::default();
        let image = normalizer.decode_base64(&wrapped).unwrap();
        assert_eq!(image.dimensions(), (40, 30));

        let prefixed = format!("data:image/png;base64,\n{}\n", wrapped.replace("\r\n", "\n "));
        let image = normalizer.decode_base64(&prefixed).unwrap();
        assert_eq!(image.dimensions(), (40, 30));
    }

    #[test]
    fn malformed_bytes_are_decode_errors() {
        let err = normalize(&ImageInput::Bytes(b"\x00\x01garbage".to_vec()), 256).unwrap_err();
        assert!(matches!(err, ForensicsError::Decode { .. }));
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        let err = normalize(&ImageInput::Base64("%%%not-base64%%%".into()), 256).unwrap_err();
        assert!(matches!(err, ForensicsError::Decode { .. }));

        let valid_base64_not_image = STANDARD.encode(b"hello world");
        let err = normalize(&ImageInput::Base64(valid_base64_not_image), 256).unwrap_err();
        assert!(matches!(err, ForensicsError::Decode { .. }));
    }

    #[test]
    fn empty_and_oversized_payloads_are_rejected() {
        let normalizer = Normalizer::new(256, 16);

        assert!(matches!(
            normalizer.decode(&ImageInput::Bytes(Vec::new())),
            Err(ForensicsError::Decode { .. })
        ));
        assert!(matches!(
            normalizer.decode(&ImageInput::Base64("   ".into())),
            Err(ForensicsError::Decode { .. })
        ));
        assert!(matches!(
            normalizer.decode(&ImageInput::Bytes(vec![0u8; 17])),
            Err(ForensicsError::Decode { .. })
        ));
    }
}
