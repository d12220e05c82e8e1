use std::{
    sync::{mpsc::Sender, Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use image::RgbaImage;
use kamera::Camera as KCamera;
use log::{info, warn};

use super::{slot::ReplySlot, CameraBackend, CaptureReply, Facing};
use crate::{error::CaptureError, photo::RawCapture};

/// Desktop webcam through kamera. Index 0 is treated as the back camera,
/// index 1 as the front one.
pub struct Camera {
    camera_handle: Option<Arc<Mutex<bool>>>,
    camera_task: Option<std::thread::JoinHandle<Result<()>>>,
    image_sender: Sender<RgbaImage>,
    pending_capture: ReplySlot,
}

impl Camera {
    pub fn new(image_sender: Sender<RgbaImage>) -> Self {
        Self {
            camera_handle: None,
            camera_task: None,
            image_sender,
            pending_capture: ReplySlot::new(),
        }
    }

    fn device_index(facing: Facing) -> usize {
        match facing {
            Facing::Back => 0,
            Facing::Front => 1,
        }
    }
}

impl CameraBackend for Camera {
    fn start_preview(&mut self, facing: Facing, width: u32, height: u32) -> Result<()> {
        self.stop_preview()?;
        let index = Self::device_index(facing);
        info!("start preview: device {index} {width}x{height}");
        let camera_handle = Arc::new(Mutex::new(true));
        self.camera_handle = Some(camera_handle.clone());
        let image_sender_clone = self.image_sender.clone();
        let pending_capture = self.pending_capture.clone();
        pending_capture.open();
        self.camera_task = Some(std::thread::spawn(move || {
            let res = preview_loop(facing, &camera_handle, &image_sender_clone, &pending_capture);
            // answer a capture that arrived while the thread was winding down
            let reason = match &res {
                Ok(()) => CaptureError::Backend("preview stopped".to_string()),
                Err(err) => match err.downcast_ref::<CaptureError>() {
                    Some(CaptureError::NoDevice(facing)) => CaptureError::NoDevice(*facing),
                    _ => CaptureError::Backend(format!("{err:#}")),
                },
            };
            pending_capture.finish(reason);
            res
        }));
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        let mut need_close = false;
        if let Some(handle) = self.camera_handle.take() {
            if let Ok(mut handle) = handle.lock() {
                *handle = false;
                need_close = true;
            }
        }

        if need_close {
            info!("stop preview..");
            if let Some(handle) = self.camera_task.take() {
                let res = handle.join();
                info!("stop preview: {:?}", res);
            }
        }
        Ok(())
    }

    fn capture(&mut self, _facing: Facing, reply: CaptureReply) {
        // the preview thread answers with its next frame, or with an error
        // when it exits first
        self.pending_capture.park(reply);
    }
}

fn preview_loop(
    facing: Facing,
    camera_handle: &Mutex<bool>,
    image_sender: &Sender<RgbaImage>,
    pending_capture: &ReplySlot,
) -> Result<()> {
    let index = Camera::device_index(facing);
    let Some(camera) = KCamera::new_device(index) else {
        warn!("camera id {index} not exist");
        return Err(CaptureError::NoDevice(facing).into());
    };
    camera.start();
    loop {
        if let Ok(opened) = camera_handle.lock() {
            if !*opened {
                break;
            }
        }

        let frame = match camera.wait_for_frame() {
            Some(f) => f,
            None => {
                warn!("no frame from device {index}");
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let (width, height) = frame.size_u32();
        let frame_data = frame.data();
        let mut rgba_buffer = frame_data.data_u8().to_vec();
        for bgra in rgba_buffer.chunks_exact_mut(4) {
            bgra.swap(0, 2);
        }

        let Some(rgba) = RgbaImage::from_raw(width, height, rgba_buffer) else {
            warn!("short frame from device {index}");
            continue;
        };

        pending_capture.fulfil(|| RawCapture::new(rgba.clone(), 0));

        if let Err(err) = image_sender.send(rgba) {
            camera.stop();
            return Err(anyhow!("{:?}", err));
        }
    }
    camera.stop();
    Ok(())
}

impl Drop for Camera {
    fn drop(&mut self) {
        let _ = self.stop_preview();
    }
}
