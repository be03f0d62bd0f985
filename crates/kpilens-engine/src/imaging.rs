use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use sha2::{Digest, Sha256};

const JPEG_QUALITY: u8 = 90;
const JPEG_MAX_DIMENSION: u32 = u16::MAX as u32;

/// Portable form of a dashboard image: RGB JPEG bytes as base64, plus a short
/// content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortableImage {
    pub base64: String,
    pub fingerprint: String,
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to open image {}", path.display()))
}

/// Normalizes to RGB and re-encodes as JPEG.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 || width > JPEG_MAX_DIMENSION || height > JPEG_MAX_DIMENSION {
        bail!("image dimensions {width}x{height} cannot be encoded as JPEG");
    }
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .context("JPEG encoding failed")?;
    Ok(bytes)
}

pub fn encode_portable(image: &DynamicImage) -> Result<PortableImage> {
    let bytes = encode_jpeg(image)?;
    Ok(PortableImage {
        fingerprint: fingerprint(&bytes),
        base64: BASE64.encode(&bytes),
    })
}

pub fn decode_portable(encoded: &str) -> Result<DynamicImage> {
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .context("portable image base64 decode failed")?;
    image::load_from_memory(&bytes).context("portable image decode failed")
}

fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..6])
}
