//! Pixel formats and buffer usage bits

use serde::{Deserialize, Serialize};

/// Pixel layout of a graphics buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8888,
    Rgbx8888,
    Rgb888,
    Rgb565,
    Bgra8888,
    RgbaFp16,
    Rgba1010102,
    /// Opaque byte payload, height is expected to be 1
    Blob,
    /// 8-bit Y plane followed by interleaved chroma
    Ycbcr420,
}

impl PixelFormat {
    /// Numeric format identifier as seen by the broker
    pub fn raw(self) -> i32 {
        match self {
            PixelFormat::Rgba8888 => 1,
            PixelFormat::Rgbx8888 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb565 => 4,
            PixelFormat::Bgra8888 => 5,
            PixelFormat::RgbaFp16 => 0x16,
            PixelFormat::Blob => 0x21,
            PixelFormat::Ycbcr420 => 0x23,
            PixelFormat::Rgba1010102 => 0x2B,
        }
    }

    /// Parse a numeric format identifier
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => PixelFormat::Rgba8888,
            2 => PixelFormat::Rgbx8888,
            3 => PixelFormat::Rgb888,
            4 => PixelFormat::Rgb565,
            5 => PixelFormat::Bgra8888,
            0x16 => PixelFormat::RgbaFp16,
            0x21 => PixelFormat::Blob,
            0x23 => PixelFormat::Ycbcr420,
            0x2B => PixelFormat::Rgba1010102,
            _ => return None,
        })
    }

    /// Storage size of one row of `stride` pixels, in bytes
    ///
    /// Returns `None` when the size does not fit in `usize`.
    pub fn row_bytes(self, stride: u32) -> Option<usize> {
        let stride = usize::try_from(stride).ok()?;
        match self {
            PixelFormat::Rgba8888
            | PixelFormat::Rgbx8888
            | PixelFormat::Bgra8888
            | PixelFormat::Rgba1010102 => stride.checked_mul(4),
            PixelFormat::Rgb888 => stride.checked_mul(3),
            PixelFormat::Rgb565 => stride.checked_mul(2),
            PixelFormat::RgbaFp16 => stride.checked_mul(8),
            PixelFormat::Blob => Some(stride),
            // 4:2:0 subsampling, 1.5 bytes per pixel
            PixelFormat::Ycbcr420 => stride.checked_add(stride / 2),
        }
    }

    /// Total storage of a `stride` x `height` buffer, in bytes
    pub fn buffer_bytes(self, stride: u32, height: u32) -> Option<usize> {
        self.row_bytes(stride)?
            .checked_mul(usize::try_from(height).ok()?)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgba8888 => "RGBA_8888",
            PixelFormat::Rgbx8888 => "RGBX_8888",
            PixelFormat::Rgb888 => "RGB_888",
            PixelFormat::Rgb565 => "RGB_565",
            PixelFormat::Bgra8888 => "BGRA_8888",
            PixelFormat::RgbaFp16 => "RGBA_FP16",
            PixelFormat::Rgba1010102 => "RGBA_1010102",
            PixelFormat::Blob => "BLOB",
            PixelFormat::Ycbcr420 => "YCbCr_420_888",
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Rgba8888
    }
}

/// Buffer usage bits, passed through to the broker untouched
pub mod usage {
    pub const CPU_READ_RARELY: u64 = 0x2;
    pub const CPU_READ_OFTEN: u64 = 0x3;
    pub const CPU_WRITE_RARELY: u64 = 0x2 << 4;
    pub const CPU_WRITE_OFTEN: u64 = 0x3 << 4;
    pub const GPU_TEXTURE: u64 = 1 << 8;
    pub const GPU_RENDER_TARGET: u64 = 1 << 9;
    pub const COMPOSER_OVERLAY: u64 = 1 << 11;
    pub const VIDEO_ENCODER: u64 = 1 << 16;
    pub const CAMERA_OUTPUT: u64 = 1 << 17;

    /// Usage applied when a client does not ask for anything specific
    pub const DEFAULT: u64 = CPU_READ_OFTEN | CPU_WRITE_OFTEN;
}
