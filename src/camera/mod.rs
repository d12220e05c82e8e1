use std::{
    fmt,
    sync::mpsc::{sync_channel, Receiver, Sender, SyncSender, TryRecvError},
};

use anyhow::Result;
use image::RgbaImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::CaptureError,
    photo::{CapturedImage, RawCapture},
    store::{Clock, SystemClock},
};

#[cfg(target_os = "android")]
pub mod camera2;

#[cfg(target_os = "windows")]
mod pcam;

pub mod slot;
pub mod synthetic;

/// Which lens the controller captures from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    Back,
    Front,
}

impl Facing {
    pub fn toggle(self) -> Self {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Back => f.write_str("back"),
            Facing::Front => f.write_str("front"),
        }
    }
}

/// Clockwise rotation that turns a sensor frame upright, given how the sensor
/// is mounted and how far the display is turned from its natural orientation.
pub fn sensor_rotation(sensor_orientation: i32, display_rotation: i32, facing: Facing) -> i32 {
    match facing {
        Facing::Back => (sensor_orientation - display_rotation).rem_euclid(360),
        Facing::Front => (sensor_orientation + display_rotation).rem_euclid(360),
    }
}

/// Platform camera seam.
pub trait CameraBackend {
    fn start_preview(&mut self, facing: Facing, width: u32, height: u32) -> Result<()>;

    fn stop_preview(&mut self) -> Result<()>;

    /// Trigger the shutter once. The backend must eventually call
    /// [`CaptureReply::deliver`], from any thread.
    fn capture(&mut self, facing: Facing, reply: CaptureReply);
}

/// Single-use handle a backend answers a capture request with.
pub struct CaptureReply {
    sender: SyncSender<Result<CapturedImage, CaptureError>>,
    facing: Facing,
    clock: Box<dyn Clock + Send>,
}

impl CaptureReply {
    fn new(
        facing: Facing,
        clock: Box<dyn Clock + Send>,
    ) -> (Self, Receiver<Result<CapturedImage, CaptureError>>) {
        let (sender, receiver) = sync_channel(1);
        (
            Self {
                sender,
                facing,
                clock,
            },
            receiver,
        )
    }

    /// A reply and the handle its result arrives on.
    pub(crate) fn pair(facing: Facing, clock: Box<dyn Clock + Send>) -> (Self, PendingCapture) {
        let (reply, receiver) = Self::new(facing, clock);
        (
            reply,
            PendingCapture {
                receiver: Some(receiver),
            },
        )
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Rotate the raw frame upright and hand it to the waiting side.
    pub fn deliver(self, raw: Result<RawCapture, CaptureError>) {
        let result = raw.and_then(|raw| {
            CapturedImage::from_raw(raw, self.facing, self.clock.now_millis())
        });
        if let Err(err) = &result {
            debug!("capture failed: {err}");
        }
        if self.sender.send(result).is_err() {
            warn!("capture result dropped, nobody is waiting for it");
        }
    }
}

/// One-shot receiver for a capture in flight.
pub struct PendingCapture {
    receiver: Option<Receiver<Result<CapturedImage, CaptureError>>>,
}

impl PendingCapture {
    /// Non-blocking poll. Yields the result exactly once, then `None` forever.
    pub fn try_take(&mut self) -> Option<Result<CapturedImage, CaptureError>> {
        let receiver = self.receiver.as_ref()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(CaptureError::Disconnected),
        };
        self.receiver = None;
        Some(result)
    }

    /// Block until the backend answers.
    pub fn wait(mut self) -> Result<CapturedImage, CaptureError> {
        match self.receiver.take() {
            Some(receiver) => receiver.recv().unwrap_or(Err(CaptureError::Disconnected)),
            None => Err(CaptureError::Disconnected),
        }
    }

    pub fn is_done(&self) -> bool {
        self.receiver.is_none()
    }
}

/// Capture controller: owns the backend and the selected facing.
pub struct Camera {
    backend: Box<dyn CameraBackend>,
    facing: Facing,
    preview_size: Option<(u32, u32)>,
}

impl Camera {
    pub fn new(backend: Box<dyn CameraBackend>, facing: Facing) -> Self {
        Self {
            backend,
            facing,
            preview_size: None,
        }
    }

    /// Backend for the platform we are running on.
    pub fn platform(
        #[cfg(target_os = "android")] app: slint::android::AndroidApp,
        image_sender: Sender<RgbaImage>,
        facing: Facing,
    ) -> Result<Self> {
        #[cfg(target_os = "android")]
        let backend: Box<dyn CameraBackend> =
            Box::new(camera2::AndroidCamera::new(app, image_sender));
        #[cfg(target_os = "windows")]
        let backend: Box<dyn CameraBackend> = Box::new(pcam::Camera::new(image_sender));
        #[cfg(not(any(target_os = "android", target_os = "windows")))]
        let backend: Box<dyn CameraBackend> = {
            warn!("no native camera backend on this platform, using synthetic frames");
            Box::new(synthetic::SyntheticCamera::test_pattern(640, 480).with_preview(image_sender))
        };
        Ok(Self::new(backend, facing))
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Switch between front and back; a running preview follows the switch.
    ///
    /// The new facing sticks even when the restart fails. The preview is then
    /// reported as stopped so the caller can retry it.
    pub fn toggle_facing(&mut self) -> Result<Facing> {
        self.facing = self.facing.toggle();
        info!("camera facing: {}", self.facing);
        if let Some((width, height)) = self.preview_size {
            let restarted = self
                .backend
                .stop_preview()
                .and_then(|()| self.backend.start_preview(self.facing, width, height));
            if let Err(err) = restarted {
                self.preview_size = None;
                return Err(err);
            }
        }
        Ok(self.facing)
    }

    pub fn start_preview(&mut self, width: u32, height: u32) -> Result<()> {
        self.backend.start_preview(self.facing, width, height)?;
        self.preview_size = Some((width, height));
        Ok(())
    }

    pub fn stop_preview(&mut self) -> Result<()> {
        self.preview_size = None;
        self.backend.stop_preview()
    }

    pub fn is_previewing(&self) -> bool {
        self.preview_size.is_some()
    }

    /// Ask for one photo. Overlapping requests are not guarded against.
    pub fn take_photo(&mut self) -> PendingCapture {
        self.take_photo_with_clock(Box::new(SystemClock))
    }

    pub fn take_photo_with_clock(&mut self, clock: Box<dyn Clock + Send>) -> PendingCapture {
        let (reply, pending) = CaptureReply::pair(self.facing, clock);
        info!("take photo ({} camera)", self.facing);
        self.backend.capture(self.facing, reply);
        pending
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if self.preview_size.is_some() {
            let _ = self.backend.stop_preview();
        }
    }
}
