// IntelliPest 🌿 AGPL-3.0 License

//! Advisory crop-image quality heuristics.
//!
//! Four independent checks over a subsampled pixel grid estimate whether a
//! photo plausibly shows sugarcane crop. The verdict is advisory only:
//! callers warn the user or suggest a retake, but detection always runs
//! regardless — the model, not these heuristics, decides what is usable.

#![allow(clippy::cast_precision_loss)]

use image::RgbImage;

/// Grid step for pixel subsampling. Keeps the checks cheap on large photos
/// while still sampling ~100+ pixels at typical capture sizes.
const SAMPLE_STRIDE: u32 = 16;

/// Minimum fraction of sampled pixels that must read as green.
const GREEN_RATIO_FLOOR: f32 = 0.20;

/// Minimum brightness-standard-deviation for the texture check.
const TEXTURE_STDDEV_FLOOR: f64 = 15.0;

/// Checks that must pass for the image to be considered valid.
const PASSING_CHECKS: usize = 3;

/// Result of validating an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    /// Whether at least 3 of the 4 checks passed.
    pub is_valid: bool,
    /// Fraction of checks passed, in [0, 1].
    pub confidence: f32,
    /// Number of checks passed (0..=4).
    pub checks_passed: usize,
}

/// Run all four heuristic checks against an image.
#[must_use]
pub fn validate(image: &RgbImage) -> QualityReport {
    let checks = [
        check_green_content(image),
        check_color_distribution(image),
        check_texture_variation(image),
        check_basic_quality(image),
    ];

    let checks_passed = checks.iter().filter(|&&c| c).count();
    QualityReport {
        is_valid: checks_passed >= PASSING_CHECKS,
        confidence: checks_passed as f32 / checks.len() as f32,
        checks_passed,
    }
}

/// Iterate the subsampled grid.
fn samples(image: &RgbImage) -> impl Iterator<Item = [u8; 3]> + '_ {
    let (w, h) = image.dimensions();
    (0..h)
        .step_by(SAMPLE_STRIDE as usize)
        .flat_map(move |y| {
            (0..w)
                .step_by(SAMPLE_STRIDE as usize)
                .map(move |x| image.get_pixel(x, y).0)
        })
}

/// Check 1: at least 20% of sampled pixels are distinctly green
/// (`G > R`, `G > B`, `G > 40`).
fn check_green_content(image: &RgbImage) -> bool {
    let mut green = 0usize;
    let mut total = 0usize;

    for [r, g, b] in samples(image) {
        if g > r && g > b && g > 40 {
            green += 1;
        }
        total += 1;
    }

    total > 0 && green as f32 / total as f32 >= GREEN_RATIO_FLOOR
}

/// Check 2: average green channel exceeds 50 and dominates red
/// (avg G > 0.7 × avg R).
fn check_color_distribution(image: &RgbImage) -> bool {
    let mut red_sum = 0u64;
    let mut green_sum = 0u64;
    let mut total = 0u64;

    for [r, g, _] in samples(image) {
        red_sum += u64::from(r);
        green_sum += u64::from(g);
        total += 1;
    }

    if total == 0 {
        return false;
    }
    let avg_red = red_sum as f64 / total as f64;
    let avg_green = green_sum as f64 / total as f64;

    avg_green > 50.0 && avg_green > 0.7 * avg_red
}

/// Check 3: brightness varies across the image (standard deviation of
/// per-sample brightness > 15). Rejects flat or blank frames.
fn check_texture_variation(image: &RgbImage) -> bool {
    let brightness: Vec<f64> = samples(image)
        .map(|[r, g, b]| f64::from(u32::from(r) + u32::from(g) + u32::from(b)) / 3.0)
        .collect();

    if brightness.len() < 2 {
        return false;
    }

    let mean = brightness.iter().sum::<f64>() / brightness.len() as f64;
    let variance = brightness
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / brightness.len() as f64;

    variance.sqrt() > TEXTURE_STDDEV_FLOOR
}

/// Check 4: resolution floor (both dimensions ≥ 100 px) and a
/// center-pixel brightness inside [20, 235].
fn check_basic_quality(image: &RgbImage) -> bool {
    let (w, h) = image.dimensions();
    if w < 100 || h < 100 {
        return false;
    }

    let [r, g, b] = image.get_pixel(w / 2, h / 2).0;
    let brightness = (u32::from(r) + u32::from(g) + u32::from(b)) / 3;
    (20..=235).contains(&brightness)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    #[test]
    fn test_uniform_green_is_valid() {
        // Passes green content, color balance, and basic quality; fails
        // texture variation on the flat color. 3 of 4 still validates.
        let report = validate(&uniform(200, 200, [50, 150, 50]));
        assert_eq!(report.checks_passed, 3);
        assert!(report.is_valid);
        assert!((report.confidence - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_flat_gray_is_invalid() {
        // Gray fails green content and texture; color balance and basic
        // quality still pass, which is only 2 of 4.
        let report = validate(&uniform(200, 200, [120, 120, 120]));
        assert!(!report.is_valid);
        assert_eq!(report.checks_passed, 2);
    }

    #[test]
    fn test_black_frame_is_invalid() {
        let report = validate(&uniform(300, 300, [0, 0, 0]));
        assert!(!report.is_valid);
        assert_eq!(report.checks_passed, 0);
    }

    #[test]
    fn test_textured_green_passes_all() {
        // Alternate two green shades so brightness stddev clears 15.
        let mut img = uniform(200, 200, [40, 160, 40]);
        for y in 0..200 {
            for x in 0..200 {
                if (x / 16 + y / 16) % 2 == 0 {
                    img.put_pixel(x, y, image::Rgb([20, 80, 20]));
                }
            }
        }
        let report = validate(&img);
        assert_eq!(report.checks_passed, 4);
        assert!((report.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_small_image_fails_basic_quality() {
        let report = validate(&uniform(50, 50, [50, 150, 50]));
        // Green checks still pass, but texture and basic quality cannot.
        assert_eq!(report.checks_passed, 2);
        assert!(!report.is_valid);
    }
}
