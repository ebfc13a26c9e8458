// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JPEG re-encoding of acquired images

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::Result;

/// Map a 0.0 - 1.0 compression factor onto JPEG quality 1 - 100
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Decode `source` and write it as a new JPEG in `out_dir`.
///
/// No resizing happens here; only the compression factor changes.
pub fn compress_to_jpeg(source: &Path, quality: f32, out_dir: &Path) -> Result<PathBuf> {
    // Captures do not always carry an honest extension
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;

    std::fs::create_dir_all(out_dir)?;
    let target = out_dir.join(format!("plantify-{}.jpg", Uuid::new_v4()));

    let file = File::create(&target)?;
    let mut writer = BufWriter::new(file);

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality_percent(quality));
    rgb.write_with_encoder(encoder)?;
    writer.flush()?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::testing::write_png;
    use image::GenericImageView;

    #[test]
    fn test_quality_percent() {
        assert_eq!(quality_percent(0.7), 70);
        assert_eq!(quality_percent(1.0), 100);
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(3.0), 100);
    }

    #[test]
    fn test_compress_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("leaf.png");
        write_png(&source);

        let out = compress_to_jpeg(&source, 0.7, &dir.path().join("out")).unwrap();
        assert_eq!(out.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(image::ImageFormat::from_path(&out).unwrap(), image::ImageFormat::Jpeg);

        let decoded = image::open(&out).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
    }

    #[test]
    fn test_compress_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.png");
        std::fs::write(&source, b"not an image").unwrap();

        assert!(compress_to_jpeg(&source, 0.7, dir.path()).is_err());
    }
}
