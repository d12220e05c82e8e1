//! Capture → rotate → persist → gallery, driven through the synthetic camera.

use image::{Rgb, Rgba, RgbaImage};
use slint_photo_camera::{
    camera::synthetic::SyntheticCamera,
    store::{file_name, FixedClock},
    Camera, CameraViewModel, CaptureError, CaptureOutcome, Facing, PhotoStore,
};

fn close_to(pixel: &Rgb<u8>, expected: [u8; 3]) -> bool {
    pixel
        .0
        .iter()
        .zip(expected)
        .all(|(got, want)| (*got as i32 - want as i32).abs() <= 40)
}

#[test]
fn rotated_capture_is_persisted_upright() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = SyntheticCamera::test_pattern(64, 32).with_rotation(90);
    let mut camera = Camera::new(Box::new(backend), Facing::Back);
    let mut model = CameraViewModel::new(PhotoStore::new(tmp.path()));

    let result = camera.take_photo_with_clock(Box::new(FixedClock(1234))).wait();
    let path = match model.on_capture_result(result) {
        CaptureOutcome::Saved { path, .. } => path,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(path, tmp.path().join("image_1234.jpg"));

    let decoded = image::open(&path).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (32, 64));
    // quadrants after a clockwise quarter turn: blue red / white green
    assert!(close_to(decoded.get_pixel(8, 16), [0, 0, 255]));
    assert!(close_to(decoded.get_pixel(24, 16), [255, 0, 0]));
    assert!(close_to(decoded.get_pixel(8, 48), [255, 255, 255]));
    assert!(close_to(decoded.get_pixel(24, 48), [0, 255, 0]));

    let shown = model.gallery().latest().unwrap();
    assert_eq!((shown.width(), shown.height()), (32, 64));
    assert_eq!(path.file_name().unwrap(), file_name(shown.captured_at_millis()).as_str());
}

#[test]
fn gallery_grows_by_one_per_capture_even_when_unsaved() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut camera = Camera::new(Box::new(SyntheticCamera::test_pattern(8, 8)), Facing::Back);
    let mut saving = CameraViewModel::new(PhotoStore::new(tmp.path().join("Images")));
    let mut failing = CameraViewModel::new(PhotoStore::new(blocker.join("Images")));

    for expected in 1..=3 {
        let at = FixedClock(expected as i64);
        saving.on_capture_result(camera.take_photo_with_clock(Box::new(at)).wait());
        assert_eq!(saving.gallery().len(), expected);

        let outcome = failing.on_capture_result(camera.take_photo().wait());
        assert!(matches!(outcome, CaptureOutcome::Unsaved { .. }));
        assert_eq!(failing.gallery().len(), expected);
    }

    let mut names: Vec<_> = std::fs::read_dir(tmp.path().join("Images"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec![file_name(1), file_name(2), file_name(3)]);
}

#[test]
fn colliding_timestamps_overwrite_the_earlier_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = CameraViewModel::new(PhotoStore::new(tmp.path()));

    let mut red = Camera::new(
        Box::new(SyntheticCamera::new(RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255])))),
        Facing::Back,
    );
    let mut blue = Camera::new(
        Box::new(SyntheticCamera::new(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 255])))),
        Facing::Back,
    );

    model.on_capture_result(red.take_photo_with_clock(Box::new(FixedClock(77))).wait());
    model.on_capture_result(blue.take_photo_with_clock(Box::new(FixedClock(77))).wait());

    assert_eq!(model.gallery().len(), 2);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    let decoded = image::open(tmp.path().join("image_77.jpg")).unwrap().to_rgb8();
    assert!(close_to(decoded.get_pixel(8, 8), [0, 0, 255]));
}

#[test]
fn capture_without_permission_leaves_gallery_intact() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = CameraViewModel::new(PhotoStore::new(tmp.path()));

    let mut granted = Camera::new(Box::new(SyntheticCamera::test_pattern(8, 8)), Facing::Back);
    model.on_capture_result(granted.take_photo().wait());
    assert_eq!(model.gallery().len(), 1);

    let backend = SyntheticCamera::test_pattern(8, 8).with_permission(false);
    let mut denied = Camera::new(Box::new(backend), Facing::Back);
    let outcome = model.on_capture_result(denied.take_photo().wait());

    assert!(matches!(outcome, CaptureOutcome::Failed(CaptureError::PermissionDenied)));
    assert_eq!(model.gallery().len(), 1);
    assert_eq!(model.gallery().latest().unwrap().width(), 8);
}

#[test]
fn switching_camera_twice_returns_to_original() {
    let mut camera = Camera::new(Box::new(SyntheticCamera::test_pattern(8, 8)), Facing::Front);
    camera.start_preview(8, 8).unwrap();
    camera.toggle_facing().unwrap();
    camera.toggle_facing().unwrap();
    assert_eq!(camera.facing(), Facing::Front);
    assert!(camera.is_previewing());
}
