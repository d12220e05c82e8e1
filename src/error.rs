use std::path::PathBuf;

use thiserror::Error;

use crate::camera::Facing;

/// Failure reported while triggering the shutter or decoding its output.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera permission has not been granted")]
    PermissionDenied,
    #[error("no {0} camera available")]
    NoDevice(Facing),
    #[error("camera preview is not running")]
    NotStarted,
    #[error("unsupported rotation: {0} degrees")]
    UnsupportedRotation(i32),
    #[error("invalid frame buffer: {0}")]
    InvalidBuffer(String),
    #[error("camera backend error: {0}")]
    Backend(String),
    #[error("capture result was dropped before delivery")]
    Disconnected,
}

/// Failure while writing a captured image to storage.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode jpeg")]
    Encode(#[from] image::ImageError),
    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_chain_includes_io_cause() {
        let err = anyhow::Error::from(PersistError::Write {
            path: PathBuf::from("/x/image_1.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });
        assert_eq!(format!("{err:#}"), "failed to write \"/x/image_1.jpg\": disk full");
        assert!(matches!(err.downcast_ref::<PersistError>(), Some(PersistError::Write { .. })));
    }
}
