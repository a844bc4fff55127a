use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageDecoder, ImageReader, Luma};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to read image: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
    #[error("Preprocessing task failed: {0}")]
    Task(String),
}

/// Turns an uploaded photo into bytes the recognition engine reads well.
pub trait ImagePreprocessor: Send + Sync + 'static {
    fn prepare(&self, data: &[u8]) -> Result<Vec<u8>, PreprocessError>;
}

/// Orientation fix → bounded downsize → grayscale → contrast stretch → PNG.
#[derive(Debug, Clone)]
pub struct StandardPreprocessor {
    pub max_width: u32,
}

impl Default for StandardPreprocessor {
    fn default() -> Self {
        Self { max_width: 1600 }
    }
}

impl StandardPreprocessor {
    pub fn new(max_width: u32) -> Self {
        Self { max_width: max_width.max(1) }
    }
}

impl ImagePreprocessor for StandardPreprocessor {
    fn prepare(&self, data: &[u8]) -> Result<Vec<u8>, PreprocessError> {
        let img = decode_upright(data)?;
        encode_as_png(normalize(img, self.max_width))
    }
}

/// Decode JPEG / PNG / WEBP / … and apply the embedded EXIF orientation.
fn decode_upright(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Downsize, grayscale, contrast stretch.
fn normalize(img: DynamicImage, max_width: u32) -> DynamicImage {
    // Phone photos are far larger than the engine needs; never upscale.
    let img = if img.width() > max_width {
        img.resize(max_width, u32::MAX, FilterType::Lanczos3)
    } else {
        img
    };

    let gray: GrayImage = img.to_luma8();

    // Compute min and max pixel values for contrast stretching.
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px <= min_px {
        // Uniform (or empty) image — nothing to stretch.
        return DynamicImage::ImageLuma8(gray);
    }

    let range = (max_px - min_px) as u32;
    let stretched: GrayImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        Luma([((p - min_px) as u32 * 255 / range) as u8])
    });

    DynamicImage::ImageLuma8(stretched)
}

fn encode_as_png(img: DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}
