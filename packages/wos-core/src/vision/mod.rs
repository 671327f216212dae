//! Signatures and matching against snapshots.
//!
//! - [`matcher`]: image signatures (template + threshold) against screenshots
//! - [`text`]: structural extraction rules against parsed pages

use std::{fmt::Display, str::FromStr};

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

pub mod matcher;
pub mod text;
pub mod utils;

pub use matcher::{MatchError, Matcher, SignatureSet};

/// A rectangle in snapshot (screen) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of an image
    pub fn of(image: &DynamicImage) -> Self {
        Self::new(0, 0, image.width(), image.height())
    }

    /// Whether the region lies completely inside a `width`x`height` image
    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Region {
    type Err = anyhow::Error;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|err| anyhow::anyhow!("invalid region {s:?}: {err}"))?;
        match parts.as_slice() {
            [x, y, width, height] => Ok(Self::new(*x, *y, *width, *height)),
            _ => anyhow::bail!("invalid region {s:?}: expected x,y,width,height"),
        }
    }
}

/// The outcome of a hit.
///
/// `location` is the center of the best matching area, in snapshot-global
/// coordinates; `area` is the whole matched rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub name: String,
    pub confidence: f32,
    pub location: (u32, u32),
    pub area: Region,
}

/// A named template with its threshold.
///
/// A snapshot matches when the best score is strictly greater than
/// `threshold`.
#[derive(Debug, Clone)]
pub struct ImageSignature {
    pub name: String,
    pub template: GrayImage,
    pub threshold: f32,
}

impl ImageSignature {
    pub fn new(
        name: impl Into<String>,
        template: &DynamicImage,
        threshold: f32,
    ) -> Result<Self, MatchError> {
        let name = name.into();
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MatchError::InvalidThreshold { name, threshold });
        }
        Ok(Self {
            name,
            template: template.to_luma8(),
            threshold,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.template.width(), self.template.height())
    }
}
