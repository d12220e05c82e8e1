use std::sync::Arc;

use image::{
    imageops::{rotate180, rotate270, rotate90},
    RgbaImage,
};

use crate::{camera::Facing, error::CaptureError};

/// Frame as the sensor delivered it, before rotation correction.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub pixels: RgbaImage,
    /// Clockwise rotation that makes the frame upright.
    pub rotation_degrees: i32,
}

impl RawCapture {
    pub fn new(pixels: RgbaImage, rotation_degrees: i32) -> Self {
        Self {
            pixels,
            rotation_degrees,
        }
    }

    /// Build from a tightly packed RGBA buffer.
    pub fn from_rgba(
        width: u32,
        height: u32,
        rgba: Vec<u8>,
        rotation_degrees: i32,
    ) -> Result<Self, CaptureError> {
        let len = rgba.len();
        let pixels = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            CaptureError::InvalidBuffer(format!("{len} bytes for {width}x{height} rgba"))
        })?;
        Ok(Self::new(pixels, rotation_degrees))
    }

    /// Decode a JPEG still as delivered by the camera.
    pub fn from_jpeg(data: &[u8], rotation_degrees: i32) -> Result<Self, CaptureError> {
        let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map_err(|err| CaptureError::InvalidBuffer(err.to_string()))?;
        Ok(Self::new(decoded.to_rgba8(), rotation_degrees))
    }
}

/// Quarter-turn rotation applied to a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Result<Self, CaptureError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            _ => Err(CaptureError::UnsupportedRotation(degrees)),
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn apply(self, pixels: RgbaImage) -> RgbaImage {
        match self {
            Rotation::None => pixels,
            Rotation::Cw90 => rotate90(&pixels),
            Rotation::Cw180 => rotate180(&pixels),
            Rotation::Cw270 => rotate270(&pixels),
        }
    }
}

/// Upright photo held by the gallery. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pixels: Arc<RgbaImage>,
    facing: Facing,
    captured_at_millis: i64,
}

impl CapturedImage {
    /// Rotate a raw frame upright.
    pub fn from_raw(
        raw: RawCapture,
        facing: Facing,
        captured_at_millis: i64,
    ) -> Result<Self, CaptureError> {
        let rotation = Rotation::from_degrees(raw.rotation_degrees)?;
        Ok(Self {
            pixels: Arc::new(rotation.apply(raw.pixels)),
            facing,
            captured_at_millis,
        })
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn captured_at_millis(&self) -> i64 {
        self.captured_at_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// 3x2 upright image: red marker top-left, blue marker bottom-right.
    fn upright() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 0, RED);
        img.put_pixel(2, 1, BLUE);
        img
    }

    /// What a sensor mounted `degrees` clockwise off upright would hand us.
    fn sensor_frame(degrees: i32) -> RgbaImage {
        let upright = upright();
        match degrees {
            0 => upright,
            90 => rotate270(&upright),
            180 => rotate180(&upright),
            270 => rotate90(&upright),
            _ => unreachable!(),
        }
    }

    #[test]
    fn correction_restores_upright_for_every_quarter_turn() {
        for degrees in [0, 90, 180, 270] {
            let raw = RawCapture::new(sensor_frame(degrees), degrees);
            let image = CapturedImage::from_raw(raw, Facing::Back, 0).unwrap();
            assert_eq!(image.pixels(), &upright(), "rotation {degrees}");
        }
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let raw = RawCapture::new(upright(), 90);
        let image = CapturedImage::from_raw(raw, Facing::Front, 7).unwrap();
        assert_eq!((image.width(), image.height()), (2, 3));
        assert_eq!(image.facing(), Facing::Front);
        assert_eq!(image.captured_at_millis(), 7);
    }

    #[test]
    fn rotation_degrees_are_normalized() {
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Cw270);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Cw90);
        assert_eq!(Rotation::from_degrees(360).unwrap().degrees(), 0);
    }

    #[test]
    fn odd_angles_are_rejected() {
        let raw = RawCapture::new(upright(), 45);
        let err = CapturedImage::from_raw(raw, Facing::Back, 0).unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedRotation(45)));
    }

    #[test]
    fn short_rgba_buffer_is_rejected() {
        let err = RawCapture::from_rgba(4, 4, vec![0; 10], 0).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidBuffer(_)));
    }
}
