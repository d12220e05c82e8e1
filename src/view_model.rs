use std::path::PathBuf;

use log::{error, info};

use crate::{
    error::CaptureError,
    gallery::Gallery,
    photo::CapturedImage,
    store::PhotoStore,
};

/// What happened to one capture callback.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Written to disk and added to the gallery.
    Saved { index: usize, path: PathBuf },
    /// Added to the gallery, but the file write failed.
    Unsaved { index: usize, error: anyhow::Error },
    /// The shutter failed; the gallery is unchanged.
    Failed(CaptureError),
}

impl CaptureOutcome {
    pub fn gallery_index(&self) -> Option<usize> {
        match self {
            CaptureOutcome::Saved { index, .. } | CaptureOutcome::Unsaved { index, .. } => {
                Some(*index)
            }
            CaptureOutcome::Failed(_) => None,
        }
    }
}

/// State behind the camera screen: where photos are written and what the
/// gallery panel shows.
pub struct CameraViewModel {
    store: PhotoStore,
    gallery: Gallery,
}

impl CameraViewModel {
    pub fn new(store: PhotoStore) -> Self {
        Self {
            store,
            gallery: Gallery::new(),
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn gallery_mut(&mut self) -> &mut Gallery {
        &mut self.gallery
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    /// Persist, then show. Errors are logged and never undo the gallery entry.
    pub fn on_capture_result(
        &mut self,
        result: Result<CapturedImage, CaptureError>,
    ) -> CaptureOutcome {
        let image = match result {
            Ok(image) => image,
            Err(err) => {
                error!("Couldn't take photo: {err}");
                return CaptureOutcome::Failed(err);
            }
        };

        let saved = self.store.persist(&image);
        let index = self.gallery.append(image);
        match saved {
            Ok(path) => {
                info!("photo #{index} saved to {}", path.display());
                CaptureOutcome::Saved { index, path }
            }
            Err(err) => {
                let error = anyhow::Error::from(err);
                error!("photo #{index} kept in memory only: {error:#}");
                CaptureOutcome::Unsaved { index, error }
            }
        }
    }
}
