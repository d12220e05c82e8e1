pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod gallery;
pub mod photo;
pub mod store;
pub mod view_model;

#[cfg(target_os = "android")]
pub mod android;

pub use camera::{Camera, CameraBackend, Facing, PendingCapture};
pub use config::Config;
pub use error::{CaptureError, PersistError};
pub use gallery::{Gallery, GalleryChange};
pub use photo::{CapturedImage, RawCapture};
pub use store::PhotoStore;
pub use view_model::{CameraViewModel, CaptureOutcome};

#[cfg(target_os = "android")]
pub fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("slint_photo_camera"),
    );
}

/// `RUST_LOG` overrides the default `info` filter.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(target_os = "android")]
#[no_mangle]
fn android_main(app: slint::android::AndroidApp) {
    init_logging();
    if let Err(err) = slint::android::init(app.clone()) {
        log::error!("slint init failed: {err}");
        return;
    }
    if let Err(err) = app::run(app, Config::default()) {
        log::error!("camera screen exited with error: {err:#}");
    }
}
