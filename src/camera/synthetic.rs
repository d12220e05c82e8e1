//! In-process camera that hands out a fixed frame.
//!
//! Stands in for real hardware on platforms without a native backend and in
//! tests, where the frame content, the reported rotation and the permission
//! grant all need to be under control.

use std::sync::mpsc::Sender;

use anyhow::Result;
use image::{Rgba, RgbaImage};
use log::info;

use super::{CameraBackend, CaptureReply, Facing};
use crate::{
    error::CaptureError,
    photo::{RawCapture, Rotation},
};

pub struct SyntheticCamera {
    frame: RgbaImage,
    rotation_degrees: i32,
    permission_granted: bool,
    image_sender: Option<Sender<RgbaImage>>,
    previewing: Option<Facing>,
}

impl SyntheticCamera {
    pub fn new(frame: RgbaImage) -> Self {
        Self {
            frame,
            rotation_degrees: 0,
            permission_granted: true,
            image_sender: None,
            previewing: None,
        }
    }

    /// Four coloured quadrants: red, green / blue, white.
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let frame = RgbaImage::from_fn(width, height, |x, y| {
            match (x < width / 2, y < height / 2) {
                (true, true) => Rgba([255, 0, 0, 255]),
                (false, true) => Rgba([0, 255, 0, 255]),
                (true, false) => Rgba([0, 0, 255, 255]),
                (false, false) => Rgba([255, 255, 255, 255]),
            }
        });
        Self::new(frame)
    }

    /// Rotation reported alongside every captured frame.
    pub fn with_rotation(mut self, degrees: i32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_permission(mut self, granted: bool) -> Self {
        self.permission_granted = granted;
        self
    }

    pub fn with_preview(mut self, image_sender: Sender<RgbaImage>) -> Self {
        self.image_sender = Some(image_sender);
        self
    }

    pub fn previewing(&self) -> Option<Facing> {
        self.previewing
    }
}

impl CameraBackend for SyntheticCamera {
    fn start_preview(&mut self, facing: Facing, width: u32, height: u32) -> Result<()> {
        info!("synthetic preview {width}x{height} ({facing})");
        self.previewing = Some(facing);
        if let Some(sender) = &self.image_sender {
            let upright = Rotation::from_degrees(self.rotation_degrees)?.apply(self.frame.clone());
            let _ = sender.send(upright);
        }
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        self.previewing = None;
        Ok(())
    }

    fn capture(&mut self, _facing: Facing, reply: CaptureReply) {
        let raw = if self.permission_granted {
            Ok(RawCapture::new(self.frame.clone(), self.rotation_degrees))
        } else {
            Err(CaptureError::PermissionDenied)
        };
        // answer from another thread, the way a camera driver would
        std::thread::spawn(move || reply.deliver(raw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use std::sync::mpsc::channel;

    #[test]
    fn denied_permission_fails_capture() {
        let backend = SyntheticCamera::test_pattern(4, 4).with_permission(false);
        let mut camera = Camera::new(Box::new(backend), Facing::Back);
        let err = camera.take_photo().wait().unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));
    }

    #[test]
    fn preview_sends_upright_frame() {
        let (sender, receiver) = channel();
        let backend = SyntheticCamera::test_pattern(8, 4)
            .with_rotation(90)
            .with_preview(sender);
        let mut camera = Camera::new(Box::new(backend), Facing::Back);
        camera.start_preview(8, 4).unwrap();
        let frame = receiver.try_recv().unwrap();
        assert_eq!(frame.dimensions(), (4, 8));
        assert!(camera.is_previewing());
    }
}
