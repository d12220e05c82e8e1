//! Durable copies of captured photos.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage};
use log::{debug, info};

use crate::{error::PersistError, photo::CapturedImage};

/// Source of capture timestamps, in milliseconds since the unix epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

pub fn file_name(timestamp_millis: i64) -> String {
    format!("image_{timestamp_millis}.jpg")
}

/// Writes JPEG files under one directory.
pub struct PhotoStore {
    directory: PathBuf,
    quality: u8,
}

impl PhotoStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            quality: 100,
        }
    }

    /// JPEG quality, clamped to 1..=100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Encode `image` and write it as `image_<epoch-millis>.jpg`, named after
    /// the moment it was captured.
    ///
    /// A file with the same timestamp is overwritten.
    pub fn persist(&self, image: &CapturedImage) -> Result<PathBuf, PersistError> {
        debug!("Directory: {}", self.directory.display());
        if !self.directory.exists() {
            info!("creating {}", self.directory.display());
            fs::create_dir_all(&self.directory).map_err(|source| PersistError::CreateDir {
                path: self.directory.clone(),
                source,
            })?;
        }

        let path = self.directory.join(file_name(image.captured_at_millis()));
        debug!("Image file: {}", path.display());

        let data = encode_jpeg(image, self.quality)?;
        write_file(&path, &data).map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;
        info!("saved {}x{} photo to {}", image.width(), image.height(), path.display());
        Ok(path)
    }
}

pub fn encode_jpeg(image: &CapturedImage, quality: u8) -> Result<Vec<u8>, PersistError> {
    let rgb = DynamicImage::ImageRgba8(image.pixels().clone()).to_rgb8();
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;
    Ok(data)
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(data)?;
    writer.flush()
}

/// Directory photos go to when nothing else is configured.
#[cfg(not(target_os = "android"))]
pub fn default_pictures_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| {
            log::error!("no pictures directory, falling back to the working directory");
            PathBuf::from(".")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{camera::Facing, photo::RawCapture};
    use image::{Rgba, RgbaImage};

    fn photo_at(width: u32, height: u32, captured_at_millis: i64) -> CapturedImage {
        let raw = RawCapture::new(RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255])), 0);
        CapturedImage::from_raw(raw, Facing::Back, captured_at_millis).unwrap()
    }

    fn photo(width: u32, height: u32) -> CapturedImage {
        photo_at(width, height, 1)
    }

    #[test]
    fn file_name_uses_epoch_millis() {
        assert_eq!(file_name(1_700_000_000_123), "image_1700000000123.jpg");
    }

    #[test]
    fn creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Pictures").join("Images");
        let store = PhotoStore::new(&dir);
        let path = store.persist(&photo_at(8, 8, 5)).unwrap();
        assert_eq!(path, dir.join("image_5.jpg"));
        assert!(path.is_file());
    }

    #[test]
    fn jpeg_decodes_to_same_dimensions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(tmp.path());
        let path = store.persist(&photo(24, 16)).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (24, 16));
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = PhotoStore::new(blocker.join("Images"));
        let err = store.persist(&photo(2, 2)).unwrap_err();
        assert!(matches!(err, PersistError::CreateDir { .. }));
    }

    #[test]
    fn file_is_named_after_capture_time() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(tmp.path());
        let image = photo_at(4, 4, 1_700_000_000_123);
        let path = store.persist(&image).unwrap();
        assert_eq!(path.file_name().unwrap(), file_name(image.captured_at_millis()).as_str());
    }

    #[test]
    fn quality_is_clamped() {
        let store = PhotoStore::new("unused").with_quality(0);
        assert_eq!(store.quality, 1);
    }
}
