// IntelliPest 🌿 AGPL-3.0 License

//! Image normalization.
//!
//! Inputs arrive in whatever form the capture path produced: a decoded
//! [`DynamicImage`], or a raw frame buffer read back from a camera or GPU
//! surface in a non-canonical pixel layout. Everything is rendered into a
//! CPU-addressable 8-bit RGB buffer before any pixel math happens, and
//! conversion failure is never fatal: malformed buffers degrade to a
//! best-effort gray-padded image rather than an error.

use image::{DynamicImage, RgbImage};

/// Neutral gray used to pad truncated raw buffers.
const NEUTRAL_GRAY: [u8; 3] = [128, 128, 128];

/// Pixel layout of a raw (non-decoded) frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// 8-bit RGBA, 4 bytes per pixel. Alpha is dropped.
    Rgba8888,
    /// Packed 16-bit RGB (5-6-5), little-endian, 2 bytes per pixel.
    Rgb565,
    /// 8-bit grayscale, 1 byte per pixel.
    Gray8,
}

impl RawFormat {
    /// Bytes per pixel for this layout.
    #[must_use]
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8888 => 4,
            Self::Rgb565 => 2,
            Self::Gray8 => 1,
        }
    }
}

/// A raw pixel buffer with explicit dimensions and layout.
///
/// This is the shape a frame takes when it was not decoded by the `image`
/// crate: a readback from a hardware surface, a camera preview plane, or a
/// buffer handed over FFI.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout of `data`.
    pub format: RawFormat,
    /// Tightly packed pixel rows, `width * height * bytes_per_pixel` bytes.
    pub data: Vec<u8>,
}

/// Any image the pipeline accepts.
#[derive(Debug, Clone)]
pub enum FrameBuffer {
    /// A decoded image in any of the `image` crate's color types.
    Image(DynamicImage),
    /// A raw buffer that must be unpacked before pixel access.
    Raw(RawFrame),
}

impl FrameBuffer {
    /// Frame dimensions as (width, height).
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Image(img) => (img.width(), img.height()),
            Self::Raw(raw) => (raw.width, raw.height),
        }
    }
}

impl From<DynamicImage> for FrameBuffer {
    fn from(img: DynamicImage) -> Self {
        Self::Image(img)
    }
}

/// Render any input frame into a canonical 8-bit RGB buffer.
///
/// Decoded images are converted with the `image` crate (a no-op copy when
/// the source is already RGB8). Raw frames are unpacked per their declared
/// layout; if the buffer is shorter than the declared dimensions require,
/// the missing pixels are filled with neutral gray instead of failing.
///
/// This function never errors: downstream code always receives a usable
/// buffer and the model remains the final arbiter of image usability.
#[must_use]
pub fn normalize(frame: &FrameBuffer) -> RgbImage {
    match frame {
        FrameBuffer::Image(img) => img.to_rgb8(),
        FrameBuffer::Raw(raw) => unpack_raw(raw),
    }
}

/// Unpack a raw frame into RGB8, padding truncated data with gray.
fn unpack_raw(raw: &RawFrame) -> RgbImage {
    let (w, h) = (raw.width.max(1), raw.height.max(1));
    let bpp = raw.format.bytes_per_pixel();
    let mut out = RgbImage::from_pixel(w, h, image::Rgb(NEUTRAL_GRAY));

    let total = (w as usize) * (h as usize);
    let available = raw.data.len() / bpp;
    let n = total.min(available);

    for i in 0..n {
        let src = &raw.data[i * bpp..(i + 1) * bpp];
        let rgb = match raw.format {
            RawFormat::Rgba8888 => [src[0], src[1], src[2]],
            RawFormat::Rgb565 => unpack_565(u16::from_le_bytes([src[0], src[1]])),
            RawFormat::Gray8 => [src[0], src[0], src[0]],
        };
        #[allow(clippy::cast_possible_truncation)]
        let (x, y) = ((i % w as usize) as u32, (i / w as usize) as u32);
        out.put_pixel(x, y, image::Rgb(rgb));
    }

    out
}

/// Expand packed 5-6-5 RGB to 8 bits per channel.
fn unpack_565(v: u16) -> [u8; 3] {
    let r5 = (v >> 11) & 0x1F;
    let g6 = (v >> 5) & 0x3F;
    let b5 = v & 0x1F;
    // Scale with rounding so 0x1F -> 255 and 0x3F -> 255 exactly.
    #[allow(clippy::cast_possible_truncation)]
    let scale = |val: u16, max: u16| ((u32::from(val) * 255 + u32::from(max) / 2) / u32::from(max)) as u8;
    [scale(r5, 31), scale(g6, 63), scale(b5, 31)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb8_passthrough() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30])));
        let rgb = normalize(&FrameBuffer::Image(img));
        assert_eq!(rgb.dimensions(), (4, 4));
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_grayscale_converted() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(3, 3, image::Luma([77])));
        let rgb = normalize(&FrameBuffer::Image(img));
        assert_eq!(rgb.get_pixel(1, 1).0, [77, 77, 77]);
    }

    #[test]
    fn test_rgb565_unpack() {
        // Pure red in 565: r=31, g=0, b=0 -> 0xF800
        let data = 0xF800u16.to_le_bytes().repeat(4);
        let raw = RawFrame {
            width: 2,
            height: 2,
            format: RawFormat::Rgb565,
            data,
        };
        let rgb = normalize(&FrameBuffer::Raw(raw));
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 1).0, [255, 0, 0]);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let raw = RawFrame {
            width: 1,
            height: 1,
            format: RawFormat::Rgba8888,
            data: vec![5, 6, 7, 200],
        };
        let rgb = normalize(&FrameBuffer::Raw(raw));
        assert_eq!(rgb.get_pixel(0, 0).0, [5, 6, 7]);
    }

    #[test]
    fn test_truncated_buffer_padded() {
        // Declares 2x2 gray pixels but only supplies one byte.
        let raw = RawFrame {
            width: 2,
            height: 2,
            format: RawFormat::Gray8,
            data: vec![9],
        };
        let rgb = normalize(&FrameBuffer::Raw(raw));
        assert_eq!(rgb.get_pixel(0, 0).0, [9, 9, 9]);
        assert_eq!(rgb.get_pixel(1, 1).0, NEUTRAL_GRAY);
    }
}
