//! Template matching primitives.
//!
//! Everything here works on [`GrayImage`]s and answers a single question:
//! where does the template fit best, and how well. Thresholds, regions and
//! naming live in `wos-core`.

#![deny(clippy::all)]

pub mod ccoeff_normed;

use image::GrayImage;
use imageproc::template_matching::{
    find_extremes, match_template_parallel, MatchTemplateMethod as ImageprocMethod,
};
use serde::{Deserialize, Serialize};

/// The best location of a template in an image.
///
/// `location` is the top-left corner of the template, `score` is the raw
/// output of the method (in `[-1, 1]` for correlation coefficients).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub location: (u32, u32),
    pub score: f32,
}

impl BestMatch {
    pub fn none() -> Self {
        Self {
            location: (0, 0),
            score: 0.0,
        }
    }
}

/// The opaque matching primitive: `match(image, template) -> (location, score)`
pub trait TemplateMatcher {
    fn best_match(&self, image: &GrayImage, template: &GrayImage) -> BestMatch;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTemplateMethod {
    /// Normalized correlation coefficient (mean subtracted), a.k.a. `TM_CCOEFF_NORMED`
    #[default]
    CcoeffNormed,
    /// Normalized cross correlation, a.k.a. `TM_CCORR_NORMED`
    CcorrNormed,
}

impl TemplateMatcher for MatchTemplateMethod {
    fn best_match(&self, image: &GrayImage, template: &GrayImage) -> BestMatch {
        if template.width() > image.width()
            || template.height() > image.height()
            || template.width() == 0
            || template.height() == 0
        {
            return BestMatch::none();
        }
        match self {
            MatchTemplateMethod::CcoeffNormed => ccoeff_normed::best_match(image, template),
            MatchTemplateMethod::CcorrNormed => {
                let res = match_template_parallel(
                    image,
                    template,
                    ImageprocMethod::CrossCorrelationNormalized,
                );
                let extremes = find_extremes(&res);
                BestMatch {
                    location: extremes.max_value_location,
                    score: extremes.max_value,
                }
            }
        }
    }
}
