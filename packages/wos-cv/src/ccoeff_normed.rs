//! Normalized correlation coefficient on the CPU.
//!
//! CCoeff(I', T') = CCorr(I, T) - sum(T) * sum_window(I) / n
//! norm(I') = sqrt(sum_window(I^2) - sum_window(I)^2 / n)
//! norm(T') = sqrt(sum(T^2) - sum(T)^2 / n)
//!
//! `CCorr(I, T)` comes from imageproc, the window sums from integral images.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::template_matching::{match_template_parallel, MatchTemplateMethod};

use crate::BestMatch;

const EPS: f64 = 1e-9;

/// Summed area table with one row/column of zero padding
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let width = image.width() as usize + 1;
        let height = image.height() as usize + 1;
        let mut sum = vec![0.0; width * height];
        let mut sq_sum = vec![0.0; width * height];
        for (x, y, Luma([v])) in image.enumerate_pixels() {
            let (x, y) = (x as usize + 1, y as usize + 1);
            let v = *v as f64;
            sum[y * width + x] =
                v + sum[(y - 1) * width + x] + sum[y * width + x - 1] - sum[(y - 1) * width + x - 1];
            sq_sum[y * width + x] = v * v + sq_sum[(y - 1) * width + x] + sq_sum[y * width + x - 1]
                - sq_sum[(y - 1) * width + x - 1];
        }
        Self { width, sum, sq_sum }
    }

    /// (sum, squared sum) of the `w`x`h` window whose top-left is (`x`, `y`)
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let at = |table: &[f64], x: usize, y: usize| table[y * self.width + x];
        let rect = |table: &[f64]| {
            at(table, x + w, y + h) - at(table, x, y + h) - at(table, x + w, y) + at(table, x, y)
        };
        (rect(&self.sum), rect(&self.sq_sum))
    }
}

/// Score map of the normalized correlation coefficient, one value per
/// template placement. Placements over a flat window (or a flat template)
/// score `0`.
pub fn ccoeff_normed(image: &GrayImage, template: &GrayImage) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let (tw, th) = (template.width() as usize, template.height() as usize);
    let n = (tw * th) as f64;

    let (t_sum, t_sq_sum) = template.pixels().fold((0.0, 0.0), |(s, sq), Luma([v])| {
        let v = *v as f64;
        (s + v, sq + v * v)
    });
    let t_norm = (t_sq_sum - t_sum * t_sum / n).max(0.0).sqrt();

    let ccorr = match_template_parallel(image, template, MatchTemplateMethod::CrossCorrelation);
    let integral = Integral::new(image);

    ImageBuffer::from_fn(ccorr.width(), ccorr.height(), |x, y| {
        let (i_sum, i_sq_sum) = integral.window(x as usize, y as usize, tw, th);
        let i_norm = (i_sq_sum - i_sum * i_sum / n).max(0.0).sqrt();
        let denom = i_norm * t_norm;
        if denom < EPS {
            return Luma([0.0]);
        }
        let numer = ccorr.get_pixel(x, y).0[0] as f64 - t_sum * i_sum / n;
        Luma([(numer / denom).clamp(-1.0, 1.0) as f32])
    })
}

pub fn best_match(image: &GrayImage, template: &GrayImage) -> BestMatch {
    let res = ccoeff_normed(image, template);
    let mut best = BestMatch {
        location: (0, 0),
        score: f32::MIN,
    };
    for (x, y, Luma([score])) in res.enumerate_pixels() {
        if *score > best.score {
            best = BestMatch {
                location: (x, y),
                score: *score,
            };
        }
    }
    if best.score == f32::MIN {
        BestMatch::none()
    } else {
        best
    }
}

#[cfg(test)]
mod test {
    use image::{imageops::crop_imm, GrayImage, Luma};

    use super::*;
    use crate::test_utils::noise_image;

    #[test]
    fn test_finds_crop() {
        let image = noise_image(48, 32);
        let template = crop_imm(&image, 30, 11, 10, 8).to_image();

        let res = best_match(&image, &template);
        assert_eq!(res.location, (30, 11));
        assert!(res.score > 0.999, "{res:?}");
    }

    #[test]
    fn test_brightness_invariant() {
        let image = noise_image(32, 32);
        let template = crop_imm(&image, 5, 9, 8, 8).to_image();
        // darker copy of the template still fits perfectly
        let template = GrayImage::from_fn(8, 8, |x, y| Luma([template.get_pixel(x, y).0[0] / 2]));

        let res = best_match(&image, &template);
        assert_eq!(res.location, (5, 9));
        assert!(res.score > 0.99, "{res:?}");
    }

    #[test]
    fn test_flat_template_scores_zero() {
        let image = noise_image(16, 16);
        let template = GrayImage::from_pixel(4, 4, Luma([128]));

        let res = ccoeff_normed(&image, &template);
        assert_eq!((res.width(), res.height()), (13, 13));
        assert!(res.pixels().all(|p| p.0[0] == 0.0));
    }

    #[test]
    fn test_integral_window() {
        let image = GrayImage::from_fn(4, 3, |x, y| Luma([(x + y * 4) as u8]));
        let integral = Integral::new(&image);
        // 5 + 6 + 9 + 10
        assert_eq!(integral.window(1, 1, 2, 2).0, 30.0);
        assert_eq!(integral.window(0, 0, 4, 3).0, (0..12).sum::<u32>() as f64);
    }
}
