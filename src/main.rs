use anyhow::Result;
use slint_photo_camera::{app, init_logging, Config};

fn main() -> Result<()> {
    init_logging();
    let config = Config::default_path()
        .map(|path| Config::load_or_default(&path))
        .unwrap_or_default();
    app::run(config)
}
