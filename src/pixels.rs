use ndarray::{s, Array3, ArrayView2, Zip};

use crate::parallel::prelude::*;

pub type SubPixel = f32;
pub type Pixel = [SubPixel; CHANNELS_PER_PIXEL];

pub const CHANNELS_PER_PIXEL: usize = 3;
pub const R_RELATIVE_LUMINANCE: SubPixel = 0.2126;
pub const G_RELATIVE_LUMINANCE: SubPixel = 0.7152;
pub const B_RELATIVE_LUMINANCE: SubPixel = 0.0722;
pub const MIDDLE_GRAY: SubPixel = 0.185;

pub trait PixelOps {
    fn luminance(self) -> SubPixel;
    fn saturation(self) -> SubPixel;
}

impl PixelOps for Pixel {
    fn luminance(self) -> SubPixel {
        let [r, g, b] = self;
        R_RELATIVE_LUMINANCE * r + G_RELATIVE_LUMINANCE * g + B_RELATIVE_LUMINANCE * b
    }

    fn saturation(self) -> SubPixel {
        let [r, g, b] = self;
        let sum = r + g + b;
        if sum <= 0.0 {
            return 0.0;
        }
        1.0 - (3.0 * r.min(g).min(b)) / sum
    }
}

/// Three planes R, G, B of shape `(3, width, height)`, indexed `[[c, x, y]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DevelopedImage {
    pub data: Array3<f32>,
}

impl DevelopedImage {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((CHANNELS_PER_PIXEL, width, height)),
        }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().2
    }

    pub fn plane(&self, channel: usize) -> ArrayView2<'_, f32> {
        self.data.slice(s![channel, .., ..])
    }

    pub fn pixel(&self, x: usize, y: usize) -> Pixel {
        [self.data[[0, x, y]], self.data[[1, x, y]], self.data[[2, x, y]]]
    }

    /// Replaces every pixel by `f(pixel)`.
    pub fn map_pixels(&mut self, f: impl Fn(Pixel) -> Pixel + Sync + Send) {
        let (r, g, b) = self
            .data
            .multi_slice_mut((s![0, .., ..], s![1, .., ..], s![2, .., ..]));
        Zip::from(r).and(g).and(b).par_for_each(|r, g, b| {
            let [nr, ng, nb] = f([*r, *g, *b]);
            *r = nr;
            *g = ng;
            *b = nb;
        });
    }

    /// All pixels, row-major.
    pub fn pixels(&self) -> Vec<Pixel> {
        let (width, height) = (self.width(), self.height());
        let mut out = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                out.push(self.pixel(x, y));
            }
        }
        out
    }

    /// Row-major interleaved 8 bit samples, clamped to `[0, 1]`.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels()
            .par_iter()
            .map(|p| p.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect::<Vec<[u8; CHANNELS_PER_PIXEL]>>()
            .concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminance() {
        assert!((([1.0, 1.0, 1.0] as Pixel).luminance() - 1.0).abs() < 1e-6);
        assert_eq!(([0.0, 0.0, 1.0] as Pixel).luminance(), B_RELATIVE_LUMINANCE);
        assert_eq!(([0.0, 0.0, 0.0] as Pixel).saturation(), 0.0);
    }

    #[test]
    fn test_layout_and_export() {
        let mut image = DevelopedImage::zeros(3, 2);
        image.data[[0, 2, 0]] = 1.0;
        image.data[[2, 0, 1]] = 2.0;
        assert_eq!((image.width(), image.height()), (3, 2));
        let bytes = image.to_rgb8();
        assert_eq!(bytes.len(), 18);
        // row 0, column 2, red
        assert_eq!(bytes[6], 255);
        // row 1, column 0, blue saturates
        assert_eq!(bytes[11], 255);
    }

    #[test]
    fn test_map_pixels() {
        let mut image = DevelopedImage::zeros(2, 2);
        image.map_pixels(|[r, g, b]| [r + 1.0, g + 2.0, b + 3.0]);
        assert_eq!(image.pixel(1, 1), [1.0, 2.0, 3.0]);
    }
}
