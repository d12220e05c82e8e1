use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::camera::Facing;

/// Settings for the camera screen, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preview_width: u32,
    pub preview_height: u32,
    /// Camera selected when the screen opens.
    pub facing: Facing,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Base pictures directory; the platform default when unset.
    pub pictures_dir: Option<PathBuf>,
    /// Appended to the pictures directory.
    pub images_subdir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preview_width: 1280,
            preview_height: 720,
            facing: Facing::Back,
            jpeg_quality: 100,
            pictures_dir: None,
            images_subdir: "Images".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Missing or broken files fall back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|err| {
            warn!("{err:#}, using defaults");
            Self::default()
        })
    }

    /// `<config dir>/slint_photo_camera/config.json`
    #[cfg(not(target_os = "android"))]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("slint_photo_camera").join("config.json"))
    }

    /// Directory the photo store writes to.
    pub fn images_dir(&self, platform_pictures_dir: PathBuf) -> PathBuf {
        self.pictures_dir
            .clone()
            .unwrap_or(platform_pictures_dir)
            .join(&self.images_subdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "facing": "front", "jpeg_quality": 90 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.facing, Facing::Front);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.images_subdir, "Images");
        assert_eq!((config.preview_width, config.preview_height), (1280, 720));
    }

    #[test]
    fn broken_file_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(&path).is_err());
        assert_eq!(Config::load_or_default(&path), Config::default());
    }

    #[test]
    fn images_dir_prefers_override() {
        let mut config = Config::default();
        assert_eq!(
            config.images_dir(PathBuf::from("/sdcard/Pictures")),
            PathBuf::from("/sdcard/Pictures/Images")
        );
        config.pictures_dir = Some(PathBuf::from("/tmp/shots"));
        assert_eq!(
            config.images_dir(PathBuf::from("/sdcard/Pictures")),
            PathBuf::from("/tmp/shots/Images")
        );
    }
}
