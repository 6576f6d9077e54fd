//! Heatmap compositing
//!
//! Colorizes a saliency heatmap with a jet color ramp, blends it over the
//! resized original image and encodes the result as JPEG (+ base64).

use std::io::Cursor;

use base64::Engine;
use image::{
    codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ExtendedColorType, ImageEncoder,
    Rgb, RgbImage,
};

use crate::inference::gradcam::Heatmap;
use crate::utils::error::{AgroDetectError, Result};

/// Weight of the original image in the blend
pub const ORIGINAL_WEIGHT: f32 = 0.6;
/// Weight of the colorized heatmap in the blend
pub const HEATMAP_WEIGHT: f32 = 0.4;
/// JPEG quality of the encoded overlay
pub const JPEG_QUALITY: u8 = 95;

/// Encoded overlay image
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub jpeg: Vec<u8>,
    pub base64: String,
}

/// Jet color ramp: 0 = dark blue, then cyan, green, yellow, 255 = dark red
pub fn jet(value: u8) -> Rgb<u8> {
    let x = value as f32 / 255.0;
    let channel = |center: f32| {
        let v = (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Scale a [0, 1] heatmap value to 8 bits (truncating)
fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// Apply the jet ramp to every heatmap cell
pub fn colorize(heatmap: &Heatmap) -> RgbImage {
    RgbImage::from_fn(heatmap.width as u32, heatmap.height as u32, |x, y| {
        jet(to_u8(heatmap.get(x as usize, y as usize)))
    })
}

/// Per-channel `round(a * wa + b * wb)`, saturated to u8
pub fn blend(original: &RgbImage, overlay: &RgbImage, original_weight: f32, overlay_weight: f32) -> RgbImage {
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let a = original.get_pixel(x, y);
        let b = overlay.get_pixel(x, y);
        Rgb(std::array::from_fn(|c| {
            (a[c] as f32 * original_weight + b[c] as f32 * overlay_weight)
                .round()
                .clamp(0.0, 255.0) as u8
        }))
    })
}

/// Encode an RGB raster as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| AgroDetectError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Blend `heatmap` over `image` (resized to the heatmap size) and encode it
pub fn compose_overlay(heatmap: &Heatmap, image: &DynamicImage) -> Result<Overlay> {
    let original = image
        .resize_exact(heatmap.width as u32, heatmap.height as u32, FilterType::Triangle)
        .to_rgb8();
    let blended = blend(&original, &colorize(heatmap), ORIGINAL_WEIGHT, HEATMAP_WEIGHT);

    let jpeg = encode_jpeg(&blended, JPEG_QUALITY)?;
    let base64 = base64::engine::general_purpose::STANDARD.encode(&jpeg);

    Ok(Overlay { jpeg, base64 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_heatmap(size: usize) -> Heatmap {
        let values = (0..size * size)
            .map(|i| (i % size) as f32 / (size - 1) as f32)
            .collect();
        Heatmap {
            width: size,
            height: size,
            values,
        }
    }

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet(0), Rgb([0, 0, 128]));
        assert_eq!(jet(255), Rgb([128, 0, 0]));

        // Middle of the ramp is green-dominant
        let mid = jet(128);
        assert!(mid[1] > mid[0] && mid[1] > mid[2]);
    }

    #[test]
    fn test_jet_goes_blue_to_red() {
        let low = jet(30);
        let high = jet(225);
        assert!(low[2] > low[0]);
        assert!(high[0] > high[2]);
    }

    #[test]
    fn test_to_u8_truncates() {
        assert_eq!(to_u8(1.0), 255);
        assert_eq!(to_u8(0.999), 254);
        assert_eq!(to_u8(0.0), 0);
    }

    #[test]
    fn test_blend_weights() {
        let a = RgbImage::from_pixel(2, 2, Rgb([100, 200, 0]));
        let b = RgbImage::from_pixel(2, 2, Rgb([0, 100, 255]));
        let out = blend(&a, &b, ORIGINAL_WEIGHT, HEATMAP_WEIGHT);
        assert_eq!(*out.get_pixel(1, 1), Rgb([60, 160, 102]));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let heatmap = ramp_heatmap(64);
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(90, 70, |x, y| {
            Rgb([(x * 2) as u8, (y * 3) as u8, 40])
        }));

        let first = compose_overlay(&heatmap, &image).unwrap();
        let second = compose_overlay(&heatmap, &image).unwrap();
        assert_eq!(first, second);

        let decoded = image::load_from_memory(&first.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));

        let round_trip = base64::engine::general_purpose::STANDARD
            .decode(&first.base64)
            .unwrap();
        assert_eq!(round_trip, first.jpeg);
    }
}
