//! Generic `Camera` trait and the raw frame type shared by every driver.

use image::GrayImage;
use pseudogps_types::GpsError;

/// Pixel layout of a [`CameraFrame`]'s data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel, row-major.
    Gray8,
    /// Three bytes per pixel (R, G, B), row-major.
    Rgb8,
}

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout of `data`.
    pub format: PixelFormat,
    /// Raw pixel data.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Convert the frame to the greyscale buffer the detector consumes.
    ///
    /// RGB frames are reduced with the usual BT.601 luma weights.
    ///
    /// # Errors
    ///
    /// Returns [`GpsError::CameraFault`] when the data length does not match
    /// the declared dimensions.
    pub fn to_gray(&self) -> Result<GrayImage, GpsError> {
        let pixels = (self.width * self.height) as usize;
        let expected = match self.format {
            PixelFormat::Gray8 => pixels,
            PixelFormat::Rgb8 => pixels * 3,
        };
        if self.data.len() != expected {
            return Err(GpsError::CameraFault {
                component: "frame".to_string(),
                details: format!(
                    "buffer length {} does not match {}x{} {:?}",
                    self.data.len(),
                    self.width,
                    self.height,
                    self.format
                ),
            });
        }

        let gray = match self.format {
            PixelFormat::Gray8 => {
                GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .expect("length checked above")
            }
            PixelFormat::Rgb8 => GrayImage::from_fn(self.width, self.height, |x, y| {
                let i = ((y * self.width + x) * 3) as usize;
                let r = self.data[i] as u32;
                let g = self.data[i + 1] as u32;
                let b = self.data[i + 2] as u32;
                image::Luma([((299 * r + 587 * g + 114 * b) / 1000) as u8])
            }),
        };
        Ok(gray)
    }
}

/// A camera or image-capture device.
///
/// The overhead tracking loop only needs the next frame; drivers for real
/// hardware (e.g. a V4L2 device on the Raspberry Pi) and the simulated table
/// both implement this trait.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"overhead_cam"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`GpsError::CameraFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, GpsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_frame_converts_losslessly() {
        let frame = CameraFrame {
            width: 2,
            height: 2,
            format: PixelFormat::Gray8,
            data: vec![0, 64, 128, 255],
        };
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.get_pixel(1, 0).0[0], 64);
        assert_eq!(gray.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn rgb_frame_converts_with_luma_weights() {
        let frame = CameraFrame {
            width: 1,
            height: 1,
            format: PixelFormat::Rgb8,
            data: vec![255, 0, 0],
        };
        let gray = frame.to_gray().unwrap();
        // 0.299 * 255 ≈ 76
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn mismatched_buffer_is_a_camera_fault() {
        let frame = CameraFrame {
            width: 4,
            height: 4,
            format: PixelFormat::Gray8,
            data: vec![0u8; 3],
        };
        assert!(matches!(
            frame.to_gray(),
            Err(GpsError::CameraFault { .. })
        ));
    }
}
