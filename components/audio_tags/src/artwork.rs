use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use thiserror::Error;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork is empty")]
    Empty,

    #[error("could not decode artwork: {0}")]
    Decode(#[source] image::ImageError),

    #[error("could not encode artwork: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode artwork, shrink it to fit within `max_dimension` on both axes
/// (keeping the aspect ratio) and re-encode it as JPEG.
pub fn prepare_artwork(bytes: &[u8], max_dimension: u32) -> Result<Vec<u8>, ArtworkError> {
    if bytes.is_empty() {
        return Err(ArtworkError::Empty);
    }

    let image = image::load_from_memory(bytes).map_err(ArtworkError::Decode)?;
    let (width, height) = image.dimensions();

    let image = if width > max_dimension || height > max_dimension {
        tracing::debug!(width, height, max_dimension, "resizing artwork");
        image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ArtworkError::Encode)?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255])));
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn test_large_artwork_is_bounded() {
        let prepared = prepare_artwork(&png(1600, 800), 800).unwrap();
        let decoded = image::load_from_memory(&prepared).unwrap();

        assert_eq!(decoded.dimensions(), (800, 400));
    }

    #[test]
    fn test_small_artwork_keeps_size() {
        let prepared = prepare_artwork(&png(300, 300), 800).unwrap();
        let decoded = image::load_from_memory(&prepared).unwrap();

        assert_eq!(decoded.dimensions(), (300, 300));
        assert_eq!(image::guess_format(&prepared).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_corrupt_artwork_is_reported() {
        assert_matches!(prepare_artwork(b"not an image", 800), Err(ArtworkError::Decode(_)));
        assert_matches!(prepare_artwork(&[], 800), Err(ArtworkError::Empty));
    }
}
