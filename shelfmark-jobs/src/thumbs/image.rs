//! JPEG thumbnail resizing.

use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;
use shelfmark_job_queue::JobError;

/// Resize to `target_width` (never upscaling) preserving aspect ratio and
/// encode as JPEG. Undecodable input is a validation error: retrying a job
/// cannot make the bytes decodable.
pub fn to_jpeg_thumbnail(image_bytes: &[u8], target_width: u32) -> Result<Vec<u8>, JobError> {
    let src = image::load_from_memory(image_bytes)
        .map_err(|e| JobError::Validation(format!("unsupported image format: {e}")))?;

    let width = src.width();
    let height = src.height();
    if width == 0 || height == 0 {
        return Err(JobError::Validation("invalid image dimensions".into()));
    }

    let out_w = target_width.min(width);
    let out_h = ((height as u64 * out_w as u64 + width as u64 / 2) / width as u64).max(1) as u32;

    let resized = src.resize_exact(out_w, out_h, FilterType::Lanczos3);
    let rgb = image::DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| JobError::Other(format!("jpeg encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .expect("encode");
        buf.into_inner()
    }

    #[test]
    fn resizes_preserving_aspect() {
        let jpeg = to_jpeg_thumbnail(&png_bytes(800, 600), 360).expect("thumbnail");
        let decoded = image::load_from_memory(&jpeg).expect("decode");
        assert_eq!(decoded.width(), 360);
        assert_eq!(decoded.height(), 270);
    }

    #[test]
    fn never_upscales() {
        let jpeg = to_jpeg_thumbnail(&png_bytes(200, 100), 360).expect("thumbnail");
        let decoded = image::load_from_memory(&jpeg).expect("decode");
        assert_eq!(decoded.width(), 200);
        assert_eq!(decoded.height(), 100);
    }

    #[test]
    fn garbage_bytes_are_a_validation_error() {
        let err = to_jpeg_thumbnail(b"definitely not an image", 360).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, JobError::Validation(_)));
    }
}
