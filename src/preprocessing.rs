// IntelliPest 🌿 AGPL-3.0 License

//! Image preprocessing for classification inference.
//!
//! This module turns a canonical RGB pixel buffer into the fixed-shape
//! float tensor the model was trained on: shorter-side resize (never
//! distorting, never letterboxing), center crop to a square, and ImageNet
//! mean/std normalization. The canonical internal layout is channel-first;
//! channel-last is produced by a pure index remap for runtimes that want it.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use image::RgbImage;
use ndarray::Array4;

// ================================================================================================
// Constants
// ================================================================================================

/// Default model input size when the model declares no usable shape.
pub const DEFAULT_INPUT_SIZE: usize = 224;

/// ImageNet per-channel mean (R, G, B), matching training normalization.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation (R, G, B).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Minimum acceptable width/height for the advisory quality gate.
const MIN_QUALITY_DIM: u32 = 100;

/// Acceptable mean-luminance band for the advisory quality gate.
const LUMINANCE_RANGE: std::ops::RangeInclusive<f64> = 20.0..=235.0;

// ================================================================================================
// Types
// ================================================================================================

/// Memory layout of an [`ImageTensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Channel-first (1, 3, H, W). The canonical internal layout.
    Chw,
    /// Channel-last (1, H, W, 3).
    Hwc,
}

/// A flat float32 tensor with a square spatial shape and a layout tag.
///
/// Invariant: `data.len() == 3 * size * size`. Built fresh per detection
/// and consumed once by the backend; never reused across calls.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    /// Flat tensor values.
    pub data: Vec<f32>,
    /// Spatial size (height == width).
    pub size: usize,
    /// Layout of `data`.
    pub order: ChannelOrder,
}

impl ImageTensor {
    /// Tensor shape including the batch dimension.
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        match self.order {
            ChannelOrder::Chw => [1, 3, self.size, self.size],
            ChannelOrder::Hwc => [1, self.size, self.size, 3],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Re-interleave into the requested layout.
    ///
    /// A pure index remap: values are untouched, only their order changes.
    /// Returns a clone when the layout already matches.
    #[must_use]
    pub fn to_order(&self, order: ChannelOrder) -> Self {
        if self.order == order {
            return self.clone();
        }

        let s = self.size;
        let plane = s * s;
        let mut data = vec![0.0f32; self.data.len()];

        match (self.order, order) {
            (ChannelOrder::Chw, ChannelOrder::Hwc) => {
                for c in 0..3 {
                    for p in 0..plane {
                        data[p * 3 + c] = self.data[c * plane + p];
                    }
                }
            }
            (ChannelOrder::Hwc, ChannelOrder::Chw) => {
                for c in 0..3 {
                    for p in 0..plane {
                        data[c * plane + p] = self.data[p * 3 + c];
                    }
                }
            }
            _ => unreachable!("layouts differ"),
        }

        Self {
            data,
            size: s,
            order,
        }
    }

    /// View as an owned NCHW `Array4`, re-interleaving first if needed.
    #[must_use]
    pub fn to_chw_array4(&self) -> Array4<f32> {
        let chw = match self.order {
            ChannelOrder::Chw => self.clone(),
            ChannelOrder::Hwc => self.to_order(ChannelOrder::Chw),
        };
        Array4::from_shape_vec((1, 3, chw.size, chw.size), chw.data)
            .expect("tensor length matches declared shape")
    }
}

// ================================================================================================
// Preprocessing
// ================================================================================================

/// Preprocess an RGB image into a normalized channel-first tensor.
///
/// Scales the shorter side up (or down) to `target_size` while preserving
/// aspect ratio, center-crops the longer side to `target_size`, then maps
/// each channel through `(v/255 - mean) / std` with ImageNet constants.
/// Sources smaller than the target are upscaled, never rejected.
///
/// # Arguments
///
/// * `image` - Canonical RGB pixel buffer (see [`crate::normalizer`]).
/// * `target_size` - Square model input size (e.g. 224).
///
/// # Returns
///
/// A CHW [`ImageTensor`] of exactly `3 * target_size * target_size` floats.
#[must_use]
pub fn preprocess(image: &RgbImage, target_size: usize) -> ImageTensor {
    let cropped = center_crop_resize(image, target_size);
    let plane = target_size * target_size;
    let mut data = vec![0.0f32; 3 * plane];

    let (r_plane, rest) = data.split_at_mut(plane);
    let (g_plane, b_plane) = rest.split_at_mut(plane);

    for (i, px) in cropped.pixels().enumerate() {
        r_plane[i] = (f32::from(px.0[0]) / 255.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        g_plane[i] = (f32::from(px.0[1]) / 255.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        b_plane[i] = (f32::from(px.0[2]) / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
    }

    ImageTensor {
        data,
        size: target_size,
        order: ChannelOrder::Chw,
    }
}

/// Resize so the shorter side covers the target, then center crop.
///
/// Guarantees the output is exactly `target x target` with no padding and
/// a consistent field-of-view crop across any input aspect ratio.
fn center_crop_resize(image: &RgbImage, target_size: usize) -> RgbImage {
    use fast_image_resize::{images::Image, PixelType, ResizeAlg, ResizeOptions, Resizer};

    let (src_w, src_h) = image.dimensions();
    let target = target_size.max(1) as u32;

    // Cover scale: the shorter relative side matches the target exactly.
    let scale_x = target as f32 / src_w.max(1) as f32;
    let scale_y = target as f32 / src_h.max(1) as f32;

    let (new_w, new_h) = if scale_x >= scale_y {
        (target, ((src_h as f32 * scale_x) as u32).max(target))
    } else {
        (((src_w as f32 * scale_y) as u32).max(target), target)
    };

    let src_image = Image::from_vec_u8(
        src_w.max(1),
        src_h.max(1),
        image.as_raw().clone(),
        PixelType::U8x3,
    )
    .expect("source buffer matches dimensions");

    let mut dst_image = Image::new(new_w, new_h, PixelType::U8x3);
    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(
        fast_image_resize::FilterType::Bilinear,
    ));
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .expect("resize to non-zero target");

    let resized = RgbImage::from_raw(new_w, new_h, dst_image.into_vec())
        .expect("resized buffer matches dimensions");

    // Center crop offsets, rounding half to even to match Python's round().
    let crop_x = bankers_round((new_w - target) as f32 / 2.0) as u32;
    let crop_y = bankers_round((new_h - target) as f32 / 2.0) as u32;

    image::imageops::crop_imm(&resized, crop_x, crop_y, target, target).to_image()
}

/// Round float to nearest integer, rounding half to even (Banker's Rounding).
fn bankers_round(v: f32) -> f32 {
    let n = v.floor();
    let d = v - n;
    if (d - 0.5).abs() < 1e-6 {
        if n % 2.0 == 0.0 { n } else { n + 1.0 }
    } else {
        v.round()
    }
}

/// Advisory check that an image is worth running detection on.
///
/// Requires both dimensions to be at least 100 px and the mean luminance
/// `(R+G+B)/3` over all pixels to fall within [20, 235]. Callers must
/// treat a `false` here as a warning, never as a reason to skip detection.
#[must_use]
pub fn is_quality_sufficient(image: &RgbImage) -> bool {
    let (w, h) = image.dimensions();
    if w < MIN_QUALITY_DIM || h < MIN_QUALITY_DIM {
        return false;
    }

    let mut total: u64 = 0;
    for px in image.pixels() {
        total += u64::from(px.0[0]) + u64::from(px.0[1]) + u64::from(px.0[2]);
    }
    let mean = total as f64 / (3.0 * f64::from(w) * f64::from(h));

    LUMINANCE_RANGE.contains(&mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    #[test]
    fn test_tensor_length_any_aspect() {
        for (w, h) in [(224, 224), (640, 480), (480, 640), (50, 300), (37, 41)] {
            let t = preprocess(&uniform(w, h, [100, 100, 100]), 224);
            assert_eq!(t.len(), 3 * 224 * 224, "{w}x{h}");
            assert_eq!(t.shape(), [1, 3, 224, 224]);
        }
    }

    #[test]
    fn test_small_source_upscaled() {
        let t = preprocess(&uniform(16, 16, [0, 255, 0]), 224);
        assert_eq!(t.len(), 150_528);
    }

    #[test]
    fn test_gray_normalization_range() {
        // Mid-gray 224x224 yields exactly 150,528 values within the
        // ImageNet normalization bounds.
        let t = preprocess(&uniform(224, 224, [128, 128, 128]), 224);
        assert_eq!(t.len(), 150_528);
        assert!(t.data.iter().all(|v| (-3.0..=3.0).contains(v)));

        // Channel planes hold the exact per-channel normalized value.
        let expected_r = (128.0 / 255.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((t.data[0] - expected_r).abs() < 1e-6);
    }

    #[test]
    fn test_order_round_trip() {
        let chw = preprocess(&uniform(120, 90, [200, 30, 90]), 32);
        let hwc = chw.to_order(ChannelOrder::Hwc);
        assert_eq!(hwc.shape(), [1, 32, 32, 3]);
        let back = hwc.to_order(ChannelOrder::Chw);
        assert_eq!(back.data, chw.data);
    }

    #[test]
    fn test_hwc_interleave() {
        let chw = ImageTensor {
            data: vec![
                1.0, 2.0, 3.0, 4.0, // R plane (2x2)
                5.0, 6.0, 7.0, 8.0, // G plane
                9.0, 10.0, 11.0, 12.0, // B plane
            ],
            size: 2,
            order: ChannelOrder::Chw,
        };
        let hwc = chw.to_order(ChannelOrder::Hwc);
        assert_eq!(hwc.data[0..3], [1.0, 5.0, 9.0]);
        assert_eq!(hwc.data[3..6], [2.0, 6.0, 10.0]);
    }

    #[test]
    fn test_chw_array4() {
        let t = preprocess(&uniform(64, 64, [10, 20, 30]), 8);
        let arr = t.to_chw_array4();
        assert_eq!(arr.shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn test_quality_resolution_floor() {
        // Below 100px in either dimension fails regardless of content.
        assert!(!is_quality_sufficient(&uniform(30, 30, [128, 128, 128])));
        assert!(!is_quality_sufficient(&uniform(99, 500, [128, 128, 128])));
        assert!(is_quality_sufficient(&uniform(100, 100, [128, 128, 128])));
    }

    #[test]
    fn test_quality_luminance_bounds() {
        assert!(!is_quality_sufficient(&uniform(128, 128, [0, 0, 0])));
        assert!(!is_quality_sufficient(&uniform(128, 128, [255, 255, 255])));
        assert!(is_quality_sufficient(&uniform(128, 128, [60, 120, 60])));
    }
}
