use std::time::Duration;

use color_print::cprintln;

use crate::{
    adb::{self, escape_input_text},
    Controller, Key,
};

/// An implementation of [`crate::Controller`]
///
/// This uses pure adb (`shell input ...`) to do the touch events
pub struct AdbController {
    pub inner: adb::Device,
    width: u32,
    height: u32,
}

impl AdbController {
    /// Connect to `serial` (the serial in `adb devices`, or `host:port` of an
    /// emulator) using the adb executable at `adb`
    pub fn connect(adb: impl AsRef<str>, serial: impl AsRef<str>) -> anyhow::Result<Self> {
        let serial = serial.as_ref();

        cprintln!("<blue>[AdbController]</blue>: connecting to {serial}...");
        let device = adb::connect(adb, serial)?;
        cprintln!("<blue>[AdbController]</blue>: connected");

        let screen = crate::decode_png(device.raw_screencap()?)?;
        let (width, height) = (screen.width(), screen.height());
        cprintln!("<blue>[AdbController]</blue>: device screen: {width}x{height}");

        Ok(Self {
            inner: device,
            width,
            height,
        })
    }
}

impl Controller for AdbController {
    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn click(&self, x: u32, y: u32) -> anyhow::Result<()> {
        if x >= self.width || y >= self.height {
            anyhow::bail!(
                "coord out of screen (click at {x}, {y}; size is {}x{})",
                self.width,
                self.height
            );
        }
        cprintln!("<blue>[AdbController]</blue>: clicking ({x}, {y}) using adb");
        self.inner.execute_command_by_process(&[
            "shell",
            "input",
            "tap",
            &x.to_string(),
            &y.to_string(),
        ])?;
        Ok(())
    }

    fn swipe(&self, start: (u32, u32), end: (u32, u32), duration: Duration) -> anyhow::Result<()> {
        cprintln!(
            "<blue>[AdbController]</blue>: swiping from {:?} to {:?} for {:?} using adb",
            start,
            end,
            duration
        );
        self.inner.execute_command_by_process(&[
            "shell",
            "input",
            "swipe",
            &start.0.to_string(),
            &start.1.to_string(),
            &end.0.to_string(),
            &end.1.to_string(),
            &duration.as_millis().to_string(),
        ])?;
        Ok(())
    }

    fn input_text(&self, text: &str) -> anyhow::Result<()> {
        cprintln!("<blue>[AdbController]</blue>: typing {text:?} using adb");
        let escaped = escape_input_text(text);
        self.inner
            .execute_command_by_process(&["shell", "input", "text", &escaped])?;
        Ok(())
    }

    fn press(&self, key: Key) -> anyhow::Result<()> {
        self.inner.execute_command_by_process(&[
            "shell",
            "input",
            "keyevent",
            &key.keycode().to_string(),
        ])?;
        Ok(())
    }

    fn raw_screencap(&self) -> anyhow::Result<Vec<u8>> {
        self.inner.raw_screencap()
    }

    fn reconnect(&mut self) -> anyhow::Result<()> {
        cprintln!(
            "<yellow>[AdbController]</yellow>: reconnecting to {}...",
            self.inner.serial()
        );
        let reconnected = Self::connect(self.inner.adb().to_string(), self.inner.serial().to_string())?;
        *self = reconnected;
        Ok(())
    }
}
