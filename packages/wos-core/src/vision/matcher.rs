use std::{collections::HashMap, path::PathBuf};

use image::DynamicImage;
use log::{debug, warn};
use thiserror::Error;
use wos_cv::{MatchTemplateMethod, TemplateMatcher};

use super::{utils::save_timestamped, ImageSignature, MatchResult, Region};

/// A query that could not be evaluated, as opposed to a query that found
/// nothing (`Ok(None)`)
#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("invalid region {region} for {signature}: {reason}")]
    InvalidRegion {
        signature: String,
        region: Region,
        reason: String,
    },
    #[error("unknown signature: {0}")]
    UnknownSignature(String),
    #[error("threshold of {name} must be in [0, 1], got {threshold}")]
    InvalidThreshold { name: String, threshold: f32 },
}

/// All the image signatures known by name
#[derive(Debug, Clone, Default)]
pub struct SignatureSet(HashMap<String, ImageSignature>);

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signature: ImageSignature) {
        self.0.insert(signature.name.clone(), signature);
    }

    pub fn get(&self, name: &str) -> Result<&ImageSignature, MatchError> {
        self.0
            .get(name)
            .ok_or_else(|| MatchError::UnknownSignature(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.0.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ImageSignature> for SignatureSet {
    fn from_iter<I: IntoIterator<Item = ImageSignature>>(iter: I) -> Self {
        let mut set = Self::new();
        for signature in iter {
            set.insert(signature);
        }
        set
    }
}

/// The name of the `index`th (1-based) frame of an animated signature
pub fn variant_name(base_name: &str, index: u32) -> String {
    format!("{base_name}_{index}")
}

/// Evaluates [`ImageSignature`]s against screenshots with a [`TemplateMatcher`]
pub struct Matcher<P: TemplateMatcher = MatchTemplateMethod> {
    primitive: P,
    /// Where to dump the searched area of every region query
    debug_crop_dir: Option<PathBuf>,
}

impl<P: TemplateMatcher> Matcher<P> {
    pub fn new(primitive: P) -> Self {
        Self {
            primitive,
            debug_crop_dir: None,
        }
    }

    pub fn with_debug_crop_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_crop_dir = Some(dir.into());
        self
    }

    /// Match `signature` against `snapshot`, only looking inside `region` if
    /// given.
    ///
    /// Fails with [`MatchError::InvalidRegion`] when the region does not lie
    /// inside the snapshot or the template does not fit into the region.
    pub fn match_region(
        &self,
        signature: &ImageSignature,
        snapshot: &DynamicImage,
        region: Option<Region>,
    ) -> Result<Option<MatchResult>, MatchError> {
        let invalid = |region: Region, reason: String| MatchError::InvalidRegion {
            signature: signature.name.clone(),
            region,
            reason,
        };

        let region = match region {
            Some(region) => {
                if !region.fits_in(snapshot.width(), snapshot.height()) {
                    return Err(invalid(
                        region,
                        format!(
                            "exceeds the {}x{} snapshot",
                            snapshot.width(),
                            snapshot.height()
                        ),
                    ));
                }
                region
            }
            None => Region::of(snapshot),
        };
        let (tw, th) = signature.size();
        if tw == 0 || th == 0 || tw > region.width || th > region.height {
            return Err(invalid(
                region,
                format!("template {tw}x{th} does not fit into the search area"),
            ));
        }

        let search_area = snapshot.crop_imm(region.x, region.y, region.width, region.height);
        if let Some(dir) = &self.debug_crop_dir {
            if let Err(err) = save_timestamped(&search_area, dir, &signature.name) {
                warn!("[Matcher]: failed to save search area: {err:#}");
            }
        }

        let best = self
            .primitive
            .best_match(&search_area.to_luma8(), &signature.template);
        let score = if best.score.is_nan() {
            0.0
        } else {
            best.score.clamp(0.0, 1.0)
        };
        debug!(
            "[Matcher]: {} in {region}: best {score:.4} at {:?} (threshold {})",
            signature.name, best.location, signature.threshold
        );

        if score <= signature.threshold {
            return Ok(None);
        }

        let area = Region::new(
            region.x + best.location.0,
            region.y + best.location.1,
            tw,
            th,
        );
        Ok(Some(MatchResult {
            name: signature.name.clone(),
            confidence: score,
            location: area.center(),
            area,
        }))
    }

    /// Look up `name` in `signatures` and match it
    pub fn find(
        &self,
        signatures: &SignatureSet,
        name: &str,
        snapshot: &DynamicImage,
        region: Option<Region>,
    ) -> Result<Option<MatchResult>, MatchError> {
        let signature = signatures.get(name)?;
        self.match_region(signature, snapshot, region)
    }

    /// Try `{base_name}_1` to `{base_name}_{variant_count}` in order and
    /// return the first hit, for elements that cycle through animation
    /// frames. Variants after the hit are not evaluated.
    pub fn find_animated(
        &self,
        signatures: &SignatureSet,
        base_name: &str,
        snapshot: &DynamicImage,
        region: Option<Region>,
        variant_count: u32,
    ) -> Result<Option<MatchResult>, MatchError> {
        for index in 1..=variant_count {
            let name = variant_name(base_name, index);
            if let Some(hit) = self.find(signatures, &name, snapshot, region)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}
