//! Bayer demosaicing: Hamilton–Adams green, bilinear red and blue.

use ndarray::{s, ArrayView2, Zip};

use crate::cfa::CfaColor;
use crate::error::Result;
use crate::extract::Mosaic;
use crate::pixels::DevelopedImage;

/// Outer rows and columns left at zero on every plane.
pub const BORDER: usize = 2;
/// Outside this margin green falls back to the plain 4-neighbour mean.
pub const HAMILTON_ADAMS_MARGIN: usize = 4;

pub fn demosaic(mosaic: &Mosaic) -> Result<DevelopedImage> {
    let (width, height) = mosaic.data.dim();
    let mut image = DevelopedImage::zeros(width, height);
    if width <= 2 * BORDER || height <= 2 * BORDER {
        return Ok(image);
    }

    let src = mosaic.data.view();
    let cfa = mosaic.cfa;
    let red = cfa.red_offset();
    let blue = (1 - red.0, 1 - red.1);

    let (r, g, b) = image
        .data
        .multi_slice_mut((s![0, .., ..], s![1, .., ..], s![2, .., ..]));
    Zip::indexed(r).and(g).and(b).par_for_each(|(x, y), r, g, b| {
        if x < BORDER || y < BORDER || x >= width - BORDER || y >= height - BORDER {
            return;
        }
        *g = match cfa.color_at(x, y) {
            CfaColor::Green => src[[x, y]],
            _ => green_at(&src, x, y, width, height),
        };
        *r = bilinear(&src, x, y, red);
        *b = bilinear(&src, x, y, blue);
    });

    Ok(image)
}

#[inline]
fn green_at(src: &ArrayView2<f32>, x: usize, y: usize, width: usize, height: usize) -> f32 {
    let c = src[[x, y]];
    let (n, s) = (src[[x, y - 1]], src[[x, y + 1]]);
    let (w, e) = (src[[x - 1, y]], src[[x + 1, y]]);

    let m = HAMILTON_ADAMS_MARGIN;
    if x < m || y < m || x >= width - m || y >= height - m {
        return (n + s + w + e) / 4.0;
    }

    let vertical_laplacian = 2.0 * c - (src[[x, y - 2]] + src[[x, y + 2]]);
    let horizontal_laplacian = 2.0 * c - (src[[x - 2, y]] + src[[x + 2, y]]);
    let ev = 0.5 * (n + s) + 0.25 * vertical_laplacian;
    let eh = 0.5 * (w + e) + 0.25 * horizontal_laplacian;
    0.5 * (ev + eh)
}

/// Bilinear estimate of the colour whose native samples sit at `native` parity.
#[inline]
fn bilinear(src: &ArrayView2<f32>, x: usize, y: usize, native: (usize, usize)) -> f32 {
    match (x % 2 == native.0, y % 2 == native.1) {
        (true, true) => src[[x, y]],
        (false, true) => 0.5 * (src[[x - 1, y]] + src[[x + 1, y]]),
        (true, false) => 0.5 * (src[[x, y - 1]] + src[[x, y + 1]]),
        (false, false) => {
            0.25 * ((src[[x - 1, y - 1]] + src[[x + 1, y + 1]]) + (src[[x + 1, y - 1]] + src[[x - 1, y + 1]]))
        }
    }
}
