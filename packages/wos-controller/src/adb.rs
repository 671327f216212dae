//! Talking to devices through the `adb` executable.

use std::{collections::BTreeMap, process::Command};

use anyhow::Context;
use log::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub info: BTreeMap<String, String>,
}

impl TryFrom<&str> for DeviceInfo {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Turn "serial\tdevice key1:value1 key2:value2 ..." into a `DeviceInfo`.
        let mut pairs = value.split_whitespace();
        let serial = pairs.next();
        let state = pairs.next();
        if let (Some(serial), Some("device")) = (serial, state) {
            let info: BTreeMap<String, String> = pairs
                .filter_map(|pair| {
                    let mut kv = pair.split(':');
                    if let (Some(k), Some(v), None) = (kv.next(), kv.next(), kv.next()) {
                        Some((k.to_owned(), v.to_owned()))
                    } else {
                        None
                    }
                })
                .collect();

            Ok(DeviceInfo {
                serial: serial.to_owned(),
                info,
            })
        } else {
            anyhow::bail!("failed to parse device info: {value:?}")
        }
    }
}

/// Parse the output of `adb devices -l`, skipping the header and any device
/// that is not in the `device` state (offline, unauthorized, ...)
pub fn parse_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| DeviceInfo::try_from(line).ok())
        .collect()
}

/// Escape a string for `adb shell input text`.
///
/// Spaces become `%s`, shell metacharacters are backslash escaped.
pub fn escape_input_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => escaped.push_str("%s"),
            '\\' | '\'' | '"' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '$' | '`' | '*'
            | '?' | '~' | '#' | '!' | '%' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

fn run_adb(adb: &str, args: &[&str]) -> anyhow::Result<Vec<u8>> {
    trace!("executing {adb} {}", args.join(" "));
    let output = Command::new(adb)
        .args(args)
        .output()
        .with_context(|| format!("failed to execute {adb}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "{adb} {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.stdout)
}

/// List the devices the adb server knows about
pub fn devices(adb: &str) -> anyhow::Result<Vec<DeviceInfo>> {
    let output = run_adb(adb, &["devices", "-l"])?;
    Ok(parse_devices(&String::from_utf8_lossy(&output)))
}

/// Connect to a device using serial.
///
/// Network serials (`host:port`) are `adb connect`ed first. The serial must
/// then show up in `adb devices`, or this fails.
pub fn connect(adb: impl AsRef<str>, serial: impl AsRef<str>) -> anyhow::Result<Device> {
    let adb = adb.as_ref();
    let serial = serial.as_ref();

    if serial.contains(':') {
        let output = run_adb(adb, &["connect", serial])?;
        let output = String::from_utf8_lossy(&output);
        debug!("adb connect {serial}: {}", output.trim());
        if output.contains("failed") || output.contains("cannot") {
            anyhow::bail!("failed to connect to {serial}: {}", output.trim());
        }
    }

    let serials = devices(adb)?
        .into_iter()
        .map(|device_info| device_info.serial)
        .collect::<Vec<String>>();

    if !serials.iter().any(|s| s == serial) {
        anyhow::bail!("device not found: {serial} (available: {serials:?})")
    }
    Ok(Device::new(adb, serial))
}

#[derive(Debug, Clone)]
pub struct Device {
    /// Path of the adb executable
    adb: String,

    /// Adb device serial number
    serial: String,
}

impl Device {
    pub fn new(adb: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            adb: adb.into(),
            serial: serial.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn adb(&self) -> &str {
        &self.adb
    }

    pub fn raw_screencap(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = self.execute_command_by_process(&["exec-out", "screencap", "-p"])?;
        if bytes.is_empty() {
            anyhow::bail!("empty screencap from {}", self.serial);
        }
        Ok(bytes)
    }

    pub fn execute_command_by_process(&self, command: &[&str]) -> anyhow::Result<Vec<u8>> {
        let mut args = vec!["-s", self.serial.as_str()];
        args.extend_from_slice(command);
        run_adb(&self.adb, &args)
    }
}
