//! CFA extraction: crop, orient and transpose the sensor buffer into the
//! dense mosaic every later stage works on.

use ndarray::{s, Array2, ArrayView2, Zip};
use tracing::warn;

use crate::cfa::{CfaColor, CfaPattern};
use crate::error::{DevelopError, Result};
use crate::frame::RawFrame;
use crate::orientation::{Orientation, Rect};

/// Single-channel mosaic in transposed layout: shape `(width, height)`,
/// indexed `[[x, y]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mosaic {
    pub data: Array2<f32>,
    /// Pattern as seen from the top-left of the oriented, cropped mosaic.
    pub cfa: CfaPattern,
    pub orientation: Orientation,
    /// Active area in sensor coordinates.
    pub crop: Rect,
}

impl Mosaic {
    /// Mosaic that is already cropped and oriented.
    pub fn new(data: Array2<f32>, cfa: CfaPattern) -> Self {
        let (width, height) = data.dim();
        Self {
            data,
            cfa,
            orientation: Orientation::Normal,
            crop: Rect {
                top: 0,
                left: 0,
                bottom: height,
                right: width,
            },
        }
    }

    pub fn width(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    #[inline]
    pub fn color_at(&self, x: usize, y: usize) -> CfaColor {
        self.cfa.color_at(x, y)
    }
}

/// Row-major index of the 2×2 phase a pixel belongs to.
#[inline]
pub fn phase_index(x: usize, y: usize) -> usize {
    (y % 2) * 2 + x % 2
}

pub fn extract(frame: &RawFrame) -> Result<Mosaic> {
    let crop = frame.crop_rect();
    if crop.top >= crop.bottom
        || crop.left >= crop.right
        || crop.bottom > frame.height
        || crop.right > frame.width
    {
        return Err(DevelopError::InvalidActiveArea {
            top: crop.top,
            left: crop.left,
            bottom: crop.bottom,
            right: crop.right,
            width: frame.width,
            height: frame.height,
        });
    }

    let view = ArrayView2::from_shape((frame.height, frame.width), frame.data).map_err(|_| {
        DevelopError::BufferSize {
            width: frame.width,
            height: frame.height,
            actual: frame.data.len(),
        }
    })?;
    let cropped = view.slice_move(s![crop.top..crop.bottom, crop.left..crop.right]);

    if let Orientation::Unsupported(code) = frame.orientation {
        warn!("orientation {} is not supported, leaving the image unrotated", code);
    }
    let oriented = frame.orientation.apply_view(cropped);

    // (height, width) -> (width, height)
    let transposed = oriented.reversed_axes();
    let mut data = Array2::<f32>::zeros(transposed.raw_dim());
    Zip::from(&mut data)
        .and(&transposed)
        .par_for_each(|out, &sample| *out = sample as f32);

    let (width, height) = data.dim();
    let cfa = frame
        .cfa
        .shift(crop.left, crop.top)
        .oriented(frame.orientation, width, height);

    Ok(Mosaic {
        data,
        cfa,
        orientation: frame.orientation,
        crop,
    })
}
