//! wos-controller contains the basic device manipulating functions like
//! adb connecting, tap, swipe, text input, screencap, etc.

use std::{io::Cursor, time::Duration};

use image::{codecs::png::PngDecoder, DynamicImage};
use serde::{Deserialize, Serialize};

pub mod adb;
pub mod adb_controller;

pub use adb_controller::AdbController;

/// Hardware keys that can be sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Back,
    Esc,
    Home,
}

impl Key {
    /// The Android keycode for `input keyevent`
    pub fn keycode(&self) -> u32 {
        match self {
            Key::Home => 3,
            Key::Back => 4,
            Key::Esc => 111,
        }
    }
}

/// [`Controller`] does the device side of things, input and screencaps
///
/// Every call blocks until the device answers, there is no timeout on this
/// layer.
pub trait Controller {
    fn screen_size(&self) -> (u32, u32);

    fn click(&self, x: u32, y: u32) -> anyhow::Result<()>;

    fn swipe(&self, start: (u32, u32), end: (u32, u32), duration: Duration) -> anyhow::Result<()>;

    fn input_text(&self, text: &str) -> anyhow::Result<()>;

    fn press(&self, key: Key) -> anyhow::Result<()>;

    /// Get the raw screencap data in bytes (png encoded)
    fn raw_screencap(&self) -> anyhow::Result<Vec<u8>>;

    /// Get the decoded screencap image
    fn screencap(&self) -> anyhow::Result<DynamicImage> {
        let bytes = self.raw_screencap()?;
        decode_png(bytes)
    }

    /// Re-acquire the device after a failure. Controllers without a
    /// connection state can keep the default.
    fn reconnect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn decode_png(bytes: Vec<u8>) -> anyhow::Result<DynamicImage> {
    let decoder = PngDecoder::new(Cursor::new(bytes))
        .map_err(|err| anyhow::anyhow!("failed to decode screencap: {err}"))?;
    let image = DynamicImage::from_decoder(decoder)
        .map_err(|err| anyhow::anyhow!("failed to decode screencap: {err}"))?;
    Ok(image)
}

#[cfg(test)]
mod test {
    use image::{ImageBuffer, ImageFormat, Rgba};

    use super::*;

    #[test]
    fn test_keycode() {
        assert_eq!(Key::Home.keycode(), 3);
        assert_eq!(Key::Back.keycode(), 4);
        assert_eq!(Key::Esc.keycode(), 111);
    }

    #[test]
    fn test_decode_png() {
        let image = ImageBuffer::from_pixel(7, 5, Rgba([10u8, 20, 30, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let decoded = decode_png(bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 5));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_png(b"not a png".to_vec()).is_err());
    }
}
