use anyhow::{anyhow, Result};
use core::slice;
use image::RgbaImage;
use log::{error, info, warn};
use ndk_sys::{
    acamera_metadata_tag, camera_status_t, media_status_t, ACameraCaptureSession,
    ACameraCaptureSession_capture, ACameraCaptureSession_close,
    ACameraCaptureSession_setRepeatingRequest, ACameraCaptureSession_stateCallbacks, ACameraDevice,
    ACameraDevice_StateCallbacks, ACameraDevice_close, ACameraDevice_createCaptureRequest,
    ACameraDevice_createCaptureSession, ACameraDevice_getId, ACameraDevice_request_template,
    ACameraManager, ACameraManager_create, ACameraManager_delete,
    ACameraManager_deleteCameraIdList, ACameraManager_getCameraCharacteristics,
    ACameraManager_getCameraIdList, ACameraManager_openCamera, ACameraMetadata,
    ACameraMetadata_const_entry, ACameraMetadata_free, ACameraMetadata_getConstEntry,
    ACameraOutputTarget, ACameraOutputTarget_create, ACameraOutputTarget_free, ACaptureRequest,
    ACaptureRequest_addTarget, ACaptureRequest_free, ACaptureSessionOutput,
    ACaptureSessionOutputContainer, ACaptureSessionOutputContainer_add,
    ACaptureSessionOutputContainer_create, ACaptureSessionOutputContainer_free,
    ACaptureSessionOutput_create, ACaptureSessionOutput_free, AImage, AImageReader,
    AImageReader_ImageListener, AImageReader_acquireLatestImage, AImageReader_acquireNextImage,
    AImageReader_delete, AImageReader_getWindow, AImageReader_new, AImageReader_setImageListener,
    AImage_delete, AImage_getHeight, AImage_getPlaneData, AImage_getWidth, ANativeWindow,
    AIMAGE_FORMATS,
};
use std::{
    ffi::{c_int, c_void, CStr},
    mem::zeroed,
    ptr::null_mut,
    sync::{
        atomic::{AtomicI32, Ordering},
        mpsc::Sender,
        Mutex,
    },
    time::Instant,
};

use super::{sensor_rotation, CameraBackend, CaptureReply, Facing};
use crate::{
    android::{check_self_permission, display_rotation, CAMERA_PERMISSION},
    error::CaptureError,
    photo::{RawCapture, Rotation},
};

#[link(name = "camera2ndk")]
extern "C" {}

#[link(name = "mediandk")]
extern "C" {}

const LENS_FACING_FRONT: u8 = 0;
const LENS_FACING_BACK: u8 = 1;

/// Capture request waiting for its JPEG, with the rotation sampled when the
/// shutter was pressed.
struct PendingStill {
    reply: CaptureReply,
    rotation_degrees: i32,
}

/// Camera2 NDK backend: YUV reader for the preview, JPEG reader for stills.
pub struct AndroidCamera {
    app: slint::android::AndroidApp,
    camera_device: *mut ACameraDevice,
    capture_session: *mut ACameraCaptureSession,
    preview_request: *mut ACaptureRequest,
    still_request: *mut ACaptureRequest,
    preview_target: *mut ACameraOutputTarget,
    still_target: *mut ACameraOutputTarget,
    preview_output: *mut ACaptureSessionOutput,
    still_output: *mut ACaptureSessionOutput,
    output_container: *mut ACaptureSessionOutputContainer,
    preview_reader: *mut AImageReader,
    still_reader: *mut AImageReader,
    preview_listener: AImageReader_ImageListener,
    still_listener: AImageReader_ImageListener,
    capture_session_state_callbacks: ACameraCaptureSession_stateCallbacks,
    device_state_callbacks: ACameraDevice_StateCallbacks,
    camera_id: Option<String>,
    facing: Facing,
    sensor_orientation: i32,
    preview_rotation: AtomicI32,
    timer: Instant,
    frame_count: i32,
    image_sender: Sender<RgbaImage>,
    pending_still: Mutex<Option<PendingStill>>,
}

impl AndroidCamera {
    pub fn new(app: slint::android::AndroidApp, image_sender: Sender<RgbaImage>) -> Self {
        Self {
            app,
            camera_device: null_mut(),
            capture_session: null_mut(),
            preview_request: null_mut(),
            still_request: null_mut(),
            preview_target: null_mut(),
            still_target: null_mut(),
            preview_output: null_mut(),
            still_output: null_mut(),
            output_container: null_mut(),
            preview_reader: null_mut(),
            still_reader: null_mut(),
            preview_listener: AImageReader_ImageListener {
                context: null_mut(),
                onImageAvailable: None,
            },
            still_listener: AImageReader_ImageListener {
                context: null_mut(),
                onImageAvailable: None,
            },
            capture_session_state_callbacks: unsafe { zeroed() },
            device_state_callbacks: unsafe { zeroed() },
            camera_id: None,
            facing: Facing::Back,
            sensor_orientation: 0,
            preview_rotation: AtomicI32::new(0),
            timer: Instant::now(),
            frame_count: 0,
            image_sender,
            pending_still: Mutex::new(None),
        }
    }

    /// Open the first camera whose lens points the requested way.
    fn open(&mut self, facing: Facing) -> Result<()> {
        if !check_self_permission(&self.app, CAMERA_PERMISSION)? {
            return Err(CaptureError::PermissionDenied.into());
        }
        let wanted_lens = match facing {
            Facing::Back => LENS_FACING_BACK,
            Facing::Front => LENS_FACING_FRONT,
        };
        unsafe {
            let camera_manager = ACameraManager_create();
            let res = self.open_with_manager(camera_manager, wanted_lens, facing);
            ACameraManager_delete(camera_manager);
            res
        }
    }

    unsafe fn open_with_manager(
        &mut self,
        camera_manager: *mut ACameraManager,
        wanted_lens: u8,
        facing: Facing,
    ) -> Result<()> {
        let mut camera_id_list_raw = null_mut();
        let camera_status = ACameraManager_getCameraIdList(camera_manager, &mut camera_id_list_raw);
        if camera_status != camera_status_t::ACAMERA_OK {
            return Err(anyhow!(
                "Failed to get camera id list (reason: {:?})",
                camera_status
            ));
        }
        if camera_id_list_raw.is_null() {
            return Err(anyhow!(
                "Failed to get camera id list (reason: camera_id_list is null)"
            ));
        }

        let camera_id_list = &*camera_id_list_raw;
        let camera_ids = if camera_id_list.numCameras < 1 {
            &[][..]
        } else {
            slice::from_raw_parts(camera_id_list.cameraIds, camera_id_list.numCameras as usize)
        };

        let mut selected = None;
        for cid in camera_ids {
            let mut camera_metadata = null_mut();
            let camera_status =
                ACameraManager_getCameraCharacteristics(camera_manager, *cid, &mut camera_metadata);
            if camera_status != camera_status_t::ACAMERA_OK {
                warn!("Failed to get camera meta data of {:?}", get_cstr(*cid));
                continue;
            }
            let (lens_facing, sensor_orientation) =
                AndroidCamera::get_sensor_orientation(camera_metadata);
            ACameraMetadata_free(camera_metadata);
            info!(
                "camera {:?}: lens_facing={lens_facing} sensor_orientation={sensor_orientation}",
                get_cstr(*cid)
            );
            if lens_facing == wanted_lens {
                selected = Some((*cid, sensor_orientation));
                break;
            }
        }

        let Some((selected_camera_id, sensor_orientation)) = selected else {
            ACameraManager_deleteCameraIdList(camera_id_list_raw);
            return Err(CaptureError::NoDevice(facing).into());
        };

        unsafe extern "C" fn on_disconnected(_data: *mut c_void, device: *mut ACameraDevice) {
            info!("Camera(id: {:?}) is disconnected.", get_cstr(ACameraDevice_getId(device)));
        }

        unsafe extern "C" fn on_error(_data: *mut c_void, device: *mut ACameraDevice, error: c_int) {
            error!(
                "Error(code: {}) on Camera(id: {:?}).",
                error,
                get_cstr(ACameraDevice_getId(device))
            );
        }

        self.device_state_callbacks.onDisconnected = Some(on_disconnected);
        self.device_state_callbacks.onError = Some(on_error);

        let camera_status = ACameraManager_openCamera(
            camera_manager,
            selected_camera_id,
            &mut self.device_state_callbacks,
            &mut self.camera_device,
        );
        let camera_id = get_cstr(selected_camera_id).map(str::to_string);
        ACameraManager_deleteCameraIdList(camera_id_list_raw);

        if camera_status != camera_status_t::ACAMERA_OK {
            return Err(anyhow!("Failed to open camera device {:?}", camera_id));
        }

        self.camera_id = camera_id;
        self.facing = facing;
        self.sensor_orientation = sensor_orientation;
        Ok(())
    }

    fn get_sensor_orientation(camera_metadata: *mut ACameraMetadata) -> (u8, i32) {
        unsafe {
            let mut lens_facing: ACameraMetadata_const_entry = zeroed();
            let mut sensor_orientation: ACameraMetadata_const_entry = zeroed();

            ACameraMetadata_getConstEntry(
                camera_metadata,
                acamera_metadata_tag::ACAMERA_LENS_FACING.0,
                &mut lens_facing,
            );
            ACameraMetadata_getConstEntry(
                camera_metadata,
                acamera_metadata_tag::ACAMERA_SENSOR_ORIENTATION.0,
                &mut sensor_orientation,
            );

            let lens_facing = if lens_facing.count > 0 {
                *lens_facing.data.u8_
            } else {
                LENS_FACING_BACK
            };
            let sensor_orientation = if sensor_orientation.count > 0 {
                *sensor_orientation.data.i32_
            } else {
                0
            };
            (lens_facing, sensor_orientation)
        }
    }

    fn close(&mut self) {
        unsafe {
            if !self.capture_session.is_null() {
                ACameraCaptureSession_close(self.capture_session);
                self.capture_session = null_mut();
            }

            for request in [&mut self.preview_request, &mut self.still_request] {
                if !request.is_null() {
                    ACaptureRequest_free(*request);
                    *request = null_mut();
                }
            }

            for target in [&mut self.preview_target, &mut self.still_target] {
                if !target.is_null() {
                    ACameraOutputTarget_free(*target);
                    *target = null_mut();
                }
            }

            if !self.camera_device.is_null() {
                let camera_status = ACameraDevice_close(self.camera_device);
                if camera_status != camera_status_t::ACAMERA_OK {
                    error!("Failed to close CameraDevice.");
                }
                self.camera_device = null_mut();
            }

            for output in [&mut self.preview_output, &mut self.still_output] {
                if !output.is_null() {
                    ACaptureSessionOutput_free(*output);
                    *output = null_mut();
                }
            }

            if !self.output_container.is_null() {
                ACaptureSessionOutputContainer_free(self.output_container);
                self.output_container = null_mut();
            }

            for reader in [&mut self.preview_reader, &mut self.still_reader] {
                if !reader.is_null() {
                    AImageReader_delete(*reader);
                    *reader = null_mut();
                }
            }
        }
        if let Ok(mut pending) = self.pending_still.lock() {
            if let Some(pending) = pending.take() {
                pending
                    .reply
                    .deliver(Err(CaptureError::Backend("camera closed".to_string())));
            }
        }
        info!("Close Camera {:?}", self.camera_id.take());
    }

    fn start_session(&mut self, width: u32, height: u32) -> Result<()> {
        let self_ptr = self as *mut AndroidCamera as *mut c_void;
        self.preview_rotation.store(
            sensor_rotation(
                self.sensor_orientation,
                self.sample_display_rotation(),
                self.facing,
            ),
            Ordering::Relaxed,
        );

        unsafe extern "C" fn on_preview_available(context: *mut c_void, _reader: *mut AImageReader) {
            let camera = &mut *(context as *mut AndroidCamera);
            if let Err(err) = camera.on_preview_available() {
                warn!("preview frame: {err}");
            }
        }

        unsafe extern "C" fn on_still_available(context: *mut c_void, _reader: *mut AImageReader) {
            let camera = &mut *(context as *mut AndroidCamera);
            camera.on_still_available();
        }

        // stills are taken at the preview size
        self.preview_reader = create_image_reader(
            width,
            height,
            AIMAGE_FORMATS::AIMAGE_FORMAT_YUV_420_888,
            &mut self.preview_listener,
            self_ptr,
            on_preview_available,
        )?;
        self.still_reader = create_image_reader(
            width,
            height,
            AIMAGE_FORMATS::AIMAGE_FORMAT_JPEG,
            &mut self.still_listener,
            self_ptr,
            on_still_available,
        )?;

        unsafe {
            let camera_status = ACaptureSessionOutputContainer_create(&mut self.output_container);
            if camera_status != camera_status_t::ACAMERA_OK {
                return Err(anyhow!(
                    "Failed to create capture session output container (reason: {:?})",
                    camera_status
                ));
            }

            let preview_window = reader_window(self.preview_reader)?;
            let still_window = reader_window(self.still_reader)?;

            ACaptureSessionOutput_create(preview_window, &mut self.preview_output);
            ACaptureSessionOutput_create(still_window, &mut self.still_output);
            ACaptureSessionOutputContainer_add(self.output_container, self.preview_output);
            ACaptureSessionOutputContainer_add(self.output_container, self.still_output);

            ACameraOutputTarget_create(preview_window, &mut self.preview_target);
            ACameraOutputTarget_create(still_window, &mut self.still_target);

            let camera_status = ACameraDevice_createCaptureRequest(
                self.camera_device,
                ACameraDevice_request_template::TEMPLATE_PREVIEW,
                &mut self.preview_request,
            );
            if camera_status != camera_status_t::ACAMERA_OK {
                return Err(anyhow!(
                    "Failed to create preview capture request (id: {:?})",
                    self.camera_id
                ));
            }
            ACaptureRequest_addTarget(self.preview_request, self.preview_target);

            let camera_status = ACameraDevice_createCaptureRequest(
                self.camera_device,
                ACameraDevice_request_template::TEMPLATE_STILL_CAPTURE,
                &mut self.still_request,
            );
            if camera_status != camera_status_t::ACAMERA_OK {
                return Err(anyhow!(
                    "Failed to create still capture request (id: {:?})",
                    self.camera_id
                ));
            }
            ACaptureRequest_addTarget(self.still_request, self.still_target);

            unsafe extern "C" fn capture_session_on_ready(
                _context: *mut c_void,
                session: *mut ACameraCaptureSession,
            ) {
                info!("Session is ready. {:?}", session);
            }

            unsafe extern "C" fn capture_session_on_active(
                _context: *mut c_void,
                session: *mut ACameraCaptureSession,
            ) {
                info!("Session is activated. {:?}", session);
            }

            unsafe extern "C" fn capture_session_on_closed(
                _context: *mut c_void,
                session: *mut ACameraCaptureSession,
            ) {
                info!("Session is closed. {:?}", session);
            }

            self.capture_session_state_callbacks.onReady = Some(capture_session_on_ready);
            self.capture_session_state_callbacks.onActive = Some(capture_session_on_active);
            self.capture_session_state_callbacks.onClosed = Some(capture_session_on_closed);
            self.capture_session_state_callbacks.context = self_ptr;

            let camera_status = ACameraDevice_createCaptureSession(
                self.camera_device,
                self.output_container,
                &self.capture_session_state_callbacks,
                &mut self.capture_session,
            );
            if camera_status != camera_status_t::ACAMERA_OK {
                return Err(anyhow!(
                    "Failed to create capture session (reason: {:?})",
                    camera_status
                ));
            }

            let camera_status = ACameraCaptureSession_setRepeatingRequest(
                self.capture_session,
                null_mut(),
                1,
                &mut self.preview_request,
                null_mut(),
            );
            if camera_status != camera_status_t::ACAMERA_OK {
                return Err(anyhow!(
                    "Failed to set repeating request (reason: {:?})",
                    camera_status
                ));
            }
        }
        Ok(())
    }

    fn sample_display_rotation(&self) -> i32 {
        display_rotation(&self.app).unwrap_or_else(|err| {
            warn!("display rotation unavailable: {err}");
            0
        })
    }

    fn on_preview_available(&mut self) -> Result<()> {
        unsafe {
            let image = acquire(self.preview_reader, AImageReader_acquireLatestImage)?;
            let res = self.send_preview_frame(image);
            AImage_delete(image);
            res
        }
    }

    unsafe fn send_preview_frame(&mut self, image: *mut AImage) -> Result<()> {
        let (width, height) = image_size(image)?;

        // Y, V and U planes share one NV21 block starting at the Y plane
        let mut y_pixel = null_mut();
        let mut y_len = 0;
        AImage_getPlaneData(image, 0, &mut y_pixel, &mut y_len);
        let yuv_data =
            slice::from_raw_parts(y_pixel, ((width * height) + (width * height) / 2) as usize);

        let rgba = decode_yuv420sp(yuv_data, width, height);
        let frame = RgbaImage::from_raw(width as u32, height as u32, rgba)
            .ok_or_else(|| anyhow!("preview buffer size mismatch"))?;
        let rotation = self.preview_rotation.load(Ordering::Relaxed);
        let frame = Rotation::from_degrees(rotation)?.apply(frame);
        self.image_sender
            .send(frame)
            .map_err(|err| anyhow!("{:?}", err))?;

        self.frame_count += 1;
        if self.timer.elapsed().as_millis() > 1000 {
            info!("preview FPS:{}", self.frame_count);
            self.timer = Instant::now();
            self.frame_count = 0;
        }
        Ok(())
    }

    fn on_still_available(&mut self) {
        let pending = match self.pending_still.lock() {
            Ok(mut pending) => pending.take(),
            Err(_) => None,
        };
        let Some(pending) = pending else {
            warn!("still frame without a pending capture, dropping it");
            unsafe {
                if let Ok(image) = acquire(self.still_reader, AImageReader_acquireNextImage) {
                    AImage_delete(image);
                }
            }
            return;
        };

        let raw = unsafe { self.read_still(pending.rotation_degrees) };
        pending.reply.deliver(raw);
    }

    unsafe fn read_still(&mut self, rotation_degrees: i32) -> Result<RawCapture, CaptureError> {
        let image = acquire(self.still_reader, AImageReader_acquireNextImage)
            .map_err(|err| CaptureError::Backend(err.to_string()))?;
        let mut data = null_mut();
        let mut len = 0;
        let res = AImage_getPlaneData(image, 0, &mut data, &mut len);
        let raw = if res != media_status_t::AMEDIA_OK || data.is_null() {
            Err(CaptureError::Backend(format!("AImage_getPlaneData error res={:?}", res)))
        } else {
            RawCapture::from_jpeg(slice::from_raw_parts(data, len as usize), rotation_degrees)
        };
        AImage_delete(image);
        raw
    }
}

impl CameraBackend for AndroidCamera {
    fn start_preview(&mut self, facing: Facing, width: u32, height: u32) -> Result<()> {
        self.close();
        self.open(facing)?;
        if let Err(err) = self.start_session(width, height) {
            self.close();
            return Err(err);
        }
        info!("preview started {width}x{height} ({facing})");
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        self.close();
        Ok(())
    }

    fn capture(&mut self, facing: Facing, reply: CaptureReply) {
        match check_self_permission(&self.app, CAMERA_PERMISSION) {
            Ok(true) => {}
            Ok(false) => return reply.deliver(Err(CaptureError::PermissionDenied)),
            Err(err) => return reply.deliver(Err(CaptureError::Backend(err.to_string()))),
        }
        if self.capture_session.is_null() || self.still_request.is_null() {
            return reply.deliver(Err(CaptureError::NotStarted));
        }
        if facing != self.facing {
            return reply.deliver(Err(CaptureError::Backend(format!(
                "{} camera requested while {} camera is open",
                facing, self.facing
            ))));
        }

        let rotation_degrees =
            sensor_rotation(self.sensor_orientation, self.sample_display_rotation(), facing);
        // the preview follows the orientation seen at the last shutter press
        self.preview_rotation.store(rotation_degrees, Ordering::Relaxed);
        if let Ok(mut pending) = self.pending_still.lock() {
            *pending = Some(PendingStill {
                reply,
                rotation_degrees,
            });
        }

        let camera_status = unsafe {
            ACameraCaptureSession_capture(
                self.capture_session,
                null_mut(),
                1,
                &mut self.still_request,
                null_mut(),
            )
        };
        if camera_status != camera_status_t::ACAMERA_OK {
            let pending = self.pending_still.lock().ok().and_then(|mut p| p.take());
            if let Some(pending) = pending {
                pending.reply.deliver(Err(CaptureError::Backend(format!(
                    "Failed to capture still (reason: {:?})",
                    camera_status
                ))));
            }
        }
    }
}

impl Drop for AndroidCamera {
    fn drop(&mut self) {
        self.close();
    }
}

fn create_image_reader(
    width: u32,
    height: u32,
    image_format: AIMAGE_FORMATS,
    listener: &mut AImageReader_ImageListener,
    context: *mut c_void,
    on_image_available: unsafe extern "C" fn(*mut c_void, *mut AImageReader),
) -> Result<*mut AImageReader> {
    unsafe {
        let mut image_reader = null_mut();
        let res = AImageReader_new(
            width as i32,
            height as i32,
            image_format.0 as i32,
            2,
            &mut image_reader,
        );
        if res != media_status_t::AMEDIA_OK {
            return Err(anyhow!("create Image Reader error {:?}.", res));
        }

        listener.context = context;
        listener.onImageAvailable = Some(on_image_available);

        let res = AImageReader_setImageListener(image_reader, listener);
        if res != media_status_t::AMEDIA_OK {
            AImageReader_delete(image_reader);
            return Err(anyhow!("set Image Listener error."));
        }
        Ok(image_reader)
    }
}

unsafe fn reader_window(reader: *mut AImageReader) -> Result<*mut ANativeWindow> {
    let mut native_window: *mut ANativeWindow = null_mut();
    let res = AImageReader_getWindow(reader, &mut native_window);
    if res != media_status_t::AMEDIA_OK {
        return Err(anyhow!("AImageReader_getWindow error {:?}.", res));
    }
    Ok(native_window)
}

unsafe fn acquire(
    reader: *mut AImageReader,
    acquire_fn: unsafe extern "C" fn(*mut AImageReader, *mut *mut AImage) -> media_status_t,
) -> Result<*mut AImage> {
    let mut image = null_mut();
    let media_status = acquire_fn(reader, &mut image);
    if media_status != media_status_t::AMEDIA_OK {
        let msg = if media_status == media_status_t::AMEDIA_IMGREADER_NO_BUFFER_AVAILABLE {
            "An image reader frame was discarded".to_string()
        } else {
            format!("Failed to acquire image from image reader, error: {:?}.", media_status)
        };
        return Err(anyhow!("{msg}"));
    }
    Ok(image)
}

unsafe fn image_size(image: *mut AImage) -> Result<(i32, i32)> {
    let mut width = 0;
    let mut height = 0;
    let res = AImage_getWidth(image, &mut width);
    if res != media_status_t::AMEDIA_OK {
        return Err(anyhow!("AImage_getWidth error res={:?}.", res));
    }
    let res = AImage_getHeight(image, &mut height);
    if res != media_status_t::AMEDIA_OK {
        return Err(anyhow!("AImage_getHeight error res={:?}.", res));
    }
    Ok((width, height))
}

/// android: YUV420SP (NV21) to RGBA
pub fn decode_yuv420sp(data: &[u8], width: i32, height: i32) -> Vec<u8> {
    let frame_size = width * height;
    let mut yp = 0;
    let mut rgba_data = Vec::with_capacity(frame_size as usize * 4);
    for j in 0..height {
        let (mut uvp, mut u, mut v) = ((frame_size + (j >> 1) * width) as usize, 0, 0);
        for i in 0..width {
            let y = (data[yp] as i32 - 16).max(0);
            if i & 1 == 0 {
                v = data[uvp] as i32 - 128;
                uvp += 1;
                u = data[uvp] as i32 - 128;
                uvp += 1;
            }

            let y1192 = 1192 * y;
            let r = (y1192 + 1634 * v).clamp(0, 262143);
            let g = (y1192 - 833 * v - 400 * u).clamp(0, 262143);
            let b = (y1192 + 2066 * u).clamp(0, 262143);

            rgba_data.extend_from_slice(&[(r >> 10) as u8, (g >> 10) as u8, (b >> 10) as u8, 255]);
            yp += 1;
        }
    }

    rgba_data
}

pub unsafe fn get_cstr<'a>(s: *const ::std::os::raw::c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}
