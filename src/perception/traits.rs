use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};

/// Borrowed view over a contiguous pixel buffer with a known row stride.
#[derive(Debug, Clone, Copy)]
pub struct PackedPixels<'a> {
    pub data: &'a [u8],
    /// Bytes per row.
    pub stride: usize,
    /// Bytes per pixel; RGB channels come first.
    pub channels: usize,
}

impl<'a> PackedPixels<'a> {
    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let off = y as usize * self.stride + x as usize * self.channels;
        [self.data[off], self.data[off + 1], self.data[off + 2]]
    }
}

/// A decoded raster image as the template matcher sees it.
///
/// Every implementation answers per-pixel reads normalized to 8-bit RGB.
/// Implementations that can hand out a stable buffer + stride do so through
/// [`RasterImage::packed`], which enables the matcher's fast path.
pub trait RasterImage {
    fn dimensions(&self) -> (u32, u32);

    fn rgb(&self, x: u32, y: u32) -> [u8; 3];

    fn packed(&self) -> Option<PackedPixels<'_>> {
        None
    }
}

impl RasterImage for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbaImage::dimensions(self)
    }

    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let p = self.get_pixel(x, y).0;
        [p[0], p[1], p[2]]
    }

    fn packed(&self) -> Option<PackedPixels<'_>> {
        Some(PackedPixels {
            data: self.as_raw(),
            stride: self.width() as usize * 4,
            channels: 4,
        })
    }
}

impl RasterImage for RgbImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbImage::dimensions(self)
    }

    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.get_pixel(x, y).0
    }

    fn packed(&self) -> Option<PackedPixels<'_>> {
        Some(PackedPixels {
            data: self.as_raw(),
            stride: self.width() as usize * 3,
            channels: 3,
        })
    }
}

/// 8-bit RGB(A) variants are packed; every other variant (grey, 16-bit, float)
/// is only reachable through `get_pixel`, which down-converts to 8 bits.
impl RasterImage for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        GenericImageView::dimensions(self)
    }

    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let p = self.get_pixel(x, y).0;
        [p[0], p[1], p[2]]
    }

    fn packed(&self) -> Option<PackedPixels<'_>> {
        match self {
            DynamicImage::ImageRgba8(buf) => RasterImage::packed(buf),
            DynamicImage::ImageRgb8(buf) => RasterImage::packed(buf),
            _ => None,
        }
    }
}
