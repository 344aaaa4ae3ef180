//! Cover-crop image derivation.
//!
//! The centered region of the source with the target's aspect ratio is cut
//! out, trimming evenly from both sides of the long axis, and scaled to the
//! exact target size. The source
//! format is sniffed from the file contents; the output format follows the
//! destination extension, falling back to JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{Cursor, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("invalid target size {0}x{1}")]
    InvalidTarget(u32, u32),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("source image has zero size")]
    EmptySource,

    #[error("failed to encode derivative: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to write derivative: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Produces fixed-size derivatives at a fixed encoder quality.
#[derive(Debug, Clone)]
pub struct ImageDeriver {
    quality: u8,
}

impl ImageDeriver {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Read `src`, cover-crop it to `target_w x target_h`, and write `dst`.
    ///
    /// `dst` is only created once the encoded bytes are complete; on any
    /// error nothing is left at `dst`.
    pub fn derive(
        &self,
        src: &Path,
        dst: &Path,
        target_w: u32,
        target_h: u32,
    ) -> Result<(), DeriveError> {
        if target_w == 0 || target_h == 0 {
            return Err(DeriveError::InvalidTarget(target_w, target_h));
        }

        let source = decode(src)?;
        if source.width() == 0 || source.height() == 0 {
            return Err(DeriveError::EmptySource);
        }

        let cropped = cover_crop(&source, target_w, target_h);
        let bytes = self.encode(&cropped, output_format(dst))?;
        write_atomic(dst, &bytes)?;
        Ok(())
    }

    fn encode(&self, img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, DeriveError> {
        let mut buf = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
                DynamicImage::ImageRgb8(img.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(DeriveError::Encode)?;
            }
            other => {
                DynamicImage::ImageRgba8(img.to_rgba8())
                    .write_to(&mut Cursor::new(&mut buf), other)
                    .map_err(DeriveError::Encode)?;
            }
        }
        Ok(buf)
    }
}

fn decode(src: &Path) -> Result<DynamicImage, DeriveError> {
    let mut reader = ImageReader::open(src)?.with_guessed_format()?;
    if reader.format().is_none() {
        // Unrecognized signature: JPEG is the most likely culprit.
        reader.set_format(ImageFormat::Jpeg);
    }
    reader.decode().map_err(DeriveError::Decode)
}

/// Crop the centered region with the target's aspect ratio, then scale it
/// to exactly `target_w x target_h`.
///
/// Cropping happens in source space, so no intermediate image is ever larger
/// than the source or the target.
pub fn cover_crop(img: &DynamicImage, target_w: u32, target_h: u32) -> DynamicImage {
    let (x, y, w, h) = source_crop(img.width(), img.height(), target_w, target_h);
    img.crop_imm(x, y, w, h)
        .resize_exact(target_w, target_h, FilterType::Lanczos3)
}

/// The `(x, y, width, height)` source rectangle to keep.
///
/// A source proportionally wider than the target keeps its full height and
/// loses columns evenly from both sides; anything else keeps its full width
/// and loses rows. The rectangle is never empty and never leaves the source.
pub fn source_crop(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32, u32, u32) {
    let (sw, sh) = (src_w as u64, src_h as u64);
    let (tw, th) = (target_w.max(1) as u64, target_h.max(1) as u64);

    if sw * th > tw * sh {
        let w = ((sh * tw + th / 2) / th).clamp(1, sw.max(1));
        let w = u32::try_from(w).unwrap_or(src_w);
        (src_w.saturating_sub(w) / 2, 0, w, src_h)
    } else {
        let h = ((sw * th + tw / 2) / tw).clamp(1, sh.max(1));
        let h = u32::try_from(h).unwrap_or(src_h);
        (0, src_h.saturating_sub(h) / 2, src_w, h)
    }
}

fn output_format(dst: &Path) -> ImageFormat {
    match ImageFormat::from_path(dst) {
        Ok(f @ (ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP)) => f,
        _ => ImageFormat::Jpeg,
    }
}

fn write_atomic(dst: &Path, bytes: &[u8]) -> Result<(), DeriveError> {
    let dir = dst
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)))
    }

    #[test]
    fn test_source_crop_wide_source() {
        assert_eq!(source_crop(1000, 500, 870, 491), (57, 0, 886, 500));
    }

    #[test]
    fn test_source_crop_tall_source() {
        assert_eq!(source_crop(500, 1000, 870, 491), (0, 359, 500, 282));
    }

    #[test]
    fn test_source_crop_same_ratio_keeps_everything() {
        assert_eq!(source_crop(1740, 982, 870, 491), (0, 0, 1740, 982));
    }

    #[test]
    fn test_source_crop_degenerate_strips() {
        assert_eq!(source_crop(1, 4000, 870, 491), (0, 1999, 1, 1));
        assert_eq!(source_crop(4000, 1, 870, 491), (1999, 0, 2, 1));
    }

    #[test]
    fn test_source_crop_stays_inside_source() {
        let targets = [(870, 491), (100, 100), (300, 50), (1, 1)];
        for &(tw, th) in &targets {
            for sw in [1u32, 3, 17, 640, 1000, 4000] {
                for sh in [1u32, 5, 23, 480, 500, 3000] {
                    let (x, y, w, h) = source_crop(sw, sh, tw, th);
                    assert!(w >= 1 && h >= 1, "{}x{} -> empty crop", sw, sh);
                    assert!(x + w <= sw && y + h <= sh, "{}x{} -> crop leaves source", sw, sh);
                    assert!(w == sw || h == sh, "{}x{} -> crop trims both axes", sw, sh);
                }
            }
        }
    }

    #[test]
    fn test_derive_thin_source_stays_small() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("strip.png");
        let dst = tmp.path().join("out.jpg");
        solid(1, 4000, [20, 200, 20]).save(&src).unwrap();

        ImageDeriver::new(85).derive(&src, &dst, 870, 491).unwrap();
        assert_eq!(image::image_dimensions(&dst).unwrap(), (870, 491));
    }

    #[test]
    fn test_derive_produces_exact_size_without_padding() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.png");
        let dst = tmp.path().join("out.jpg");
        solid(1000, 500, [200, 30, 30]).save(&src).unwrap();

        ImageDeriver::new(85).derive(&src, &dst, 870, 491).unwrap();

        let out = image::open(&dst).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (870, 491));
        for (x, y) in [(0, 0), (869, 0), (0, 490), (869, 490), (435, 245)] {
            let Rgb([r, g, b]) = *out.get_pixel(x, y);
            assert!(r > 150 && g < 80 && b < 80, "pixel ({}, {}) looks padded", x, y);
        }
    }

    #[test]
    fn test_detects_format_from_content_not_extension() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("actually-png.jpg");
        let dst = tmp.path().join("out.png");
        let mut bytes = Vec::new();
        solid(64, 64, [0, 0, 255])
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        std::fs::write(&src, bytes).unwrap();

        ImageDeriver::new(85).derive(&src, &dst, 32, 16).unwrap();
        assert_eq!(image::image_dimensions(&dst).unwrap(), (32, 16));
        assert_eq!(
            image::ImageReader::open(&dst)
                .unwrap()
                .with_guessed_format()
                .unwrap()
                .format(),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn test_unreadable_source_fails_cleanly() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("garbage.jpg");
        let dst = tmp.path().join("out.jpg");
        std::fs::write(&src, b"definitely not an image").unwrap();

        let err = ImageDeriver::new(85).derive(&src, &dst, 10, 10).unwrap_err();
        assert!(matches!(err, DeriveError::Decode(_)));
        assert!(!dst.exists());
    }

    #[test]
    fn test_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let err = ImageDeriver::new(85)
            .derive(&tmp.path().join("nope.png"), &tmp.path().join("out.jpg"), 10, 10)
            .unwrap_err();
        assert!(matches!(err, DeriveError::Io(_)));
    }

    #[test]
    fn test_zero_target_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = ImageDeriver::new(85)
            .derive(&tmp.path().join("a"), &tmp.path().join("b"), 0, 10)
            .unwrap_err();
        assert!(matches!(err, DeriveError::InvalidTarget(0, 10)));
    }
}
