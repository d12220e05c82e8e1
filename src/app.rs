use std::{
    cell::RefCell,
    rc::Rc,
    sync::mpsc::channel,
    time::{Duration, Instant},
};

use anyhow::Result;
use image::{imageops, RgbaImage};
use log::{error, info, warn};
use slint::{Image, Model, ModelRc, Rgba8Pixel, SharedPixelBuffer, Timer, TimerMode, VecModel};

use crate::{
    camera::{Camera, PendingCapture},
    config::Config,
    gallery::GalleryChange,
    photo::CapturedImage,
    store::PhotoStore,
    view_model::CameraViewModel,
};

const THUMBNAIL_HEIGHT: u32 = 160;
const PREVIEW_RETRY: Duration = Duration::from_secs(1);

pub fn run(
    #[cfg(target_os = "android")] android_app: slint::android::AndroidApp,
    config: Config,
) -> Result<()> {
    slint::slint! {
        import { Button, HorizontalBox, ScrollView } from "std-widgets.slint";
        export component MainWindow inherits Window {
            in-out property <image> camera-texture <=> camera-texture.source;
            in property <[image]> photos;
            in property <string> facing: "back";
            in-out property <bool> gallery-open: false;
            callback switch-camera();
            callback take-photo();
            callback go-back();

            Rectangle {
                width: 100%;
                height: 100%;
                background: black;

                HorizontalLayout {
                    padding: 0px;
                    alignment: center;
                    camera-texture := Image {
                        image-fit: contain;
                    }
                }

                Rectangle {
                    x: 8px;
                    y: 8px;
                    width: 80px;
                    height: 40px;
                    Button {
                        text: "Back";
                        clicked => { root.go-back(); }
                    }
                }

                Rectangle {
                    x: parent.width - self.width - 8px;
                    y: 8px;
                    width: 120px;
                    height: 40px;
                    Button {
                        text: "Switch (" + root.facing + ")";
                        clicked => { root.switch-camera(); }
                    }
                }

                Rectangle {
                    height: 48px;
                    width: 240px;
                    x: (parent.width / 2 - self.width / 2);
                    y: (parent.height - self.height - 16px);
                    HorizontalBox {
                        padding: 0px;
                        Button {
                            text: "Gallery";
                            clicked => { root.gallery-open = !root.gallery-open; }
                        }
                        Button {
                            text: "Take photo";
                            clicked => { root.take-photo(); }
                        }
                    }
                }

                Rectangle {
                    width: parent.width;
                    height: 200px;
                    x: 0px;
                    y: root.gallery-open ? parent.height - self.height : parent.height;
                    animate y { duration: 250ms; easing: ease-in-out; }
                    background: #202020;
                    border-radius: 12px;

                    TouchArea {
                        clicked => { root.gallery-open = false; }
                    }

                    ScrollView {
                        viewport-width: max(self.width, photo-row.preferred-width);
                        photo-row := HorizontalLayout {
                            padding: 16px;
                            spacing: 8px;
                            alignment: start;
                            for photo in root.photos : Image {
                                source: photo;
                                height: 160px;
                                image-fit: contain;
                            }
                        }
                    }
                }
            }
        }
    }

    let app = MainWindow::new()?;

    let (image_sender, image_receiver) = channel::<RgbaImage>();

    #[cfg(target_os = "android")]
    let pictures_dir = {
        if let Err(err) = crate::android::request_camera_permissions(&android_app) {
            error!("permission request failed: {err:#}");
        }
        crate::android::external_pictures_dir(&android_app)?
    };
    #[cfg(not(target_os = "android"))]
    let pictures_dir = crate::store::default_pictures_dir();

    let camera = Rc::new(RefCell::new(Camera::platform(
        #[cfg(target_os = "android")]
        android_app,
        image_sender,
        config.facing,
    )?));
    app.set_facing(camera.borrow().facing().to_string().into());

    let store = PhotoStore::new(config.images_dir(pictures_dir)).with_quality(config.jpeg_quality);
    info!("photos go to {}", store.directory().display());
    let view_model = Rc::new(RefCell::new(CameraViewModel::new(store)));

    let thumbnails = Rc::new(VecModel::<Image>::default());
    app.set_photos(ModelRc::from(thumbnails.clone()));
    {
        let thumbnails = thumbnails.clone();
        view_model
            .borrow_mut()
            .gallery_mut()
            .subscribe(move |change| match change {
                GalleryChange::Appended { image, .. } => thumbnails.push(thumbnail(image)),
                GalleryChange::Removed { index } => {
                    if *index < thumbnails.row_count() {
                        thumbnails.remove(*index);
                    }
                }
                GalleryChange::Cleared => thumbnails.set_vec(Vec::new()),
            });
    }

    let pending: Rc<RefCell<Option<PendingCapture>>> = Rc::new(RefCell::new(None));
    let (preview_width, preview_height) = (config.preview_width, config.preview_height);
    let mut last_preview_attempt: Option<Instant> = None;

    let app_clone = app.as_weak();
    let camera_clone = camera.clone();
    let pending_clone = pending.clone();
    let view_model_clone = view_model.clone();
    let timer = Timer::default();
    timer.start(TimerMode::Repeated, Duration::from_millis(10), move || {
        // permission may arrive after the first attempt
        if !camera_clone.borrow().is_previewing()
            && last_preview_attempt.map_or(true, |t| t.elapsed() > PREVIEW_RETRY)
        {
            last_preview_attempt = Some(Instant::now());
            if let Err(err) = camera_clone
                .borrow_mut()
                .start_preview(preview_width, preview_height)
            {
                warn!("preview not started: {err:#}");
            }
        }

        if let (Some(frame), Some(app)) = (image_receiver.try_iter().last(), app_clone.upgrade()) {
            app.set_camera_texture(to_slint_image(&frame));
        }

        let result = pending_clone.borrow_mut().as_mut().and_then(|p| p.try_take());
        if let Some(result) = result {
            pending_clone.borrow_mut().take();
            view_model_clone.borrow_mut().on_capture_result(result);
        }
    });

    let camera_clone = camera.clone();
    app.on_take_photo(move || {
        if pending.borrow().is_some() {
            warn!("capture already in flight, ignoring tap");
            return;
        }
        let capture = camera_clone.borrow_mut().take_photo();
        *pending.borrow_mut() = Some(capture);
    });

    let camera_clone = camera.clone();
    let app_clone = app.as_weak();
    app.on_switch_camera(move || {
        let mut camera = camera_clone.borrow_mut();
        if let Err(err) = camera.toggle_facing() {
            // the timer retries the preview on the new facing
            error!("switch camera failed: {err:#}");
        }
        if let Some(app) = app_clone.upgrade() {
            app.set_facing(camera.facing().to_string().into());
        }
    });

    let camera_clone = camera.clone();
    app.on_go_back(move || {
        if let Err(err) = camera_clone.borrow_mut().stop_preview() {
            error!("stop preview: {err:#}");
        }
        let _ = slint::quit_event_loop();
    });

    app.run()?;
    let _ = camera.borrow_mut().stop_preview();
    info!("{} photo(s) this session", view_model.borrow().gallery().len());
    Ok(())
}

fn to_slint_image(rgba: &RgbaImage) -> Image {
    let buffer =
        SharedPixelBuffer::<Rgba8Pixel>::clone_from_slice(rgba.as_raw(), rgba.width(), rgba.height());
    Image::from_rgba8(buffer)
}

fn thumbnail(image: &CapturedImage) -> Image {
    let height = THUMBNAIL_HEIGHT.min(image.height()).max(1);
    let width = (image.width() as u64 * height as u64 / image.height().max(1) as u64).max(1) as u32;
    to_slint_image(&imageops::thumbnail(image.pixels(), width, height))
}
