use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Local;
use image::{DynamicImage, Rgba};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use super::Region;

/// `{dir}/{prefix}_{YYYYMMDD_HHMMSS}.{ext}`, creating `dir` if missing
pub fn timestamped_path(dir: impl AsRef<Path>, prefix: &str, ext: &str) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("{prefix}_{timestamp}.{ext}")))
}

/// Save `image` as a timestamped png under `dir`
pub fn save_timestamped(
    image: &DynamicImage,
    dir: impl AsRef<Path>,
    prefix: &str,
) -> anyhow::Result<PathBuf> {
    let path = timestamped_path(dir, prefix, "png")?;
    image
        .save(&path)
        .with_context(|| format!("failed to save {path:?}"))?;
    Ok(path)
}

/// Draw a red box around `region`
pub fn draw_box(image: &mut DynamicImage, region: Region) {
    if region.width == 0 || region.height == 0 {
        return;
    }
    let rect = Rect::at(region.x as i32, region.y as i32).of_size(region.width, region.height);
    draw_hollow_rect_mut(image, rect, Rgba([255, 0, 0, 255]));
}
