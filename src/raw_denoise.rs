//! Bayer-domain non-local means.
//!
//! Samples are first moved into a variance-stabilised domain derived from a
//! signal-dependent noise model (`variance ≈ a·signal + b`), obviously dead
//! photosites are replaced by their same-colour neighbours, and each sample
//! is then averaged with a fixed set of same-colour neighbours weighted by a
//! sparse patch distance.

use ndarray::{Array2, ArrayView2, Zip};
use tracing::debug;

use crate::cfa::CfaColor;
use crate::error::{DevelopError, Result};
use crate::extract::Mosaic;

const MIN_GAIN: f32 = 1e-6;
const DEAD_PIXEL_DEVIATION: f32 = 0.1;
const DEAD_PIXEL_BORDER: usize = 2;
const NLM_BORDER: usize = 4;

const GREEN_NEIGHBOURS: [(isize, isize); 12] = [
    (-1, -1), (1, -1), (-1, 1), (1, 1),
    (-2, 0), (2, 0), (0, -2), (0, 2),
    (-2, -2), (2, -2), (-2, 2), (2, 2),
];
const RED_BLUE_NEIGHBOURS: [(isize, isize); 8] = [
    (-2, 0), (2, 0), (0, -2), (0, 2),
    (-2, -2), (2, -2), (-2, 2), (2, 2),
];
const GREEN_STENCIL: [(isize, isize); 5] = [(0, 0), (-1, -1), (1, -1), (-1, 1), (1, 1)];
const RED_BLUE_STENCIL: [(isize, isize); 5] = [(0, 0), (-2, 0), (2, 0), (0, -2), (0, 2)];

/// Piecewise-linear `(gain, a, b)` noise model.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    rows: Vec<(f32, f32, f32)>,
}

impl Default for NoiseProfile {
    fn default() -> Self {
        let rows = [1.0f32, 2.0, 4.0, 8.0, 16.0, 32.0]
            .iter()
            .map(|g| (*g, 1e-4 * g, 1e-7 * g * g))
            .collect();
        Self { rows }
    }
}

impl NoiseProfile {
    pub fn from_rows(mut rows: Vec<(f32, f32, f32)>) -> Result<Self> {
        if rows.is_empty() {
            return Err(DevelopError::InvalidField {
                field: "NoiseProfile",
                reason: "no rows".to_string(),
            });
        }
        rows.sort_by(|l, r| l.0.total_cmp(&r.0));
        Ok(Self { rows })
    }

    pub fn analog_gain(iso: f32) -> f32 {
        4.0 / 15.0 + 11.0 / 750.0 * iso
    }

    /// `(a, b)` at `gain`, held constant outside the table.
    pub fn at_gain(&self, gain: f32) -> (f32, f32) {
        let first = self.rows[0];
        let last = self.rows[self.rows.len() - 1];
        if gain <= first.0 {
            return (first.1, first.2);
        }
        if gain >= last.0 {
            return (last.1, last.2);
        }
        let upper = self.rows.partition_point(|r| r.0 <= gain).min(self.rows.len() - 1);
        let (g0, a0, b0) = self.rows[upper - 1];
        let (g1, a1, b1) = self.rows[upper];
        let t = if g1 > g0 { (gain - g0) / (g1 - g0) } else { 1.0 };
        (a0 + (a1 - a0) * t, b0 + (b1 - b0) * t)
    }

    pub fn for_iso(&self, iso: f32) -> (f32, f32) {
        self.at_gain(Self::analog_gain(iso))
    }
}

/// Variance stabilising transform for a noise model `(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stabilizer {
    gain: f32,
    offset: f32,
}

impl Stabilizer {
    pub fn new(a: f32, b: f32) -> Self {
        let gain = a.max(MIN_GAIN);
        Self {
            gain,
            offset: b / (gain * gain),
        }
    }

    #[inline]
    pub fn forward(&self, p: f32) -> f32 {
        (p.max(0.0) / self.gain + self.offset).max(0.0).sqrt()
    }

    #[inline]
    pub fn inverse(&self, y: f32) -> f32 {
        ((y * y - self.offset) * self.gain).max(0.0)
    }
}

#[inline]
fn at(src: &ArrayView2<f32>, x: usize, y: usize, dx: isize, dy: isize) -> f32 {
    src[[(x as isize + dx) as usize, (y as isize + dy) as usize]]
}

/// Replaces samples deviating more than 10% from the mean of their four
/// same-colour axial neighbours.
pub fn fix_dead_pixels(data: &mut Array2<f32>) -> usize {
    let (width, height) = data.dim();
    if width <= 2 * DEAD_PIXEL_BORDER || height <= 2 * DEAD_PIXEL_BORDER {
        return 0;
    }
    let source = data.clone();
    let src = source.view();
    let b = DEAD_PIXEL_BORDER;

    Zip::indexed(&mut *data).par_for_each(|(x, y), p| {
        if x < b || y < b || x >= width - b || y >= height - b {
            return;
        }
        let mean = (at(&src, x, y, -2, 0) + at(&src, x, y, 2, 0) + at(&src, x, y, 0, -2) + at(&src, x, y, 0, 2)) / 4.0;
        if mean > 0.0 && (*p - mean).abs() / mean > DEAD_PIXEL_DEVIATION {
            *p = mean;
        }
    });

    data.iter().zip(source.iter()).filter(|(a, b)| a != b).count()
}

/// Non-local means over same-colour neighbours; `h` is the inverse strength.
pub fn bayer_nlm(mosaic: &Mosaic, h: f32) -> Array2<f32> {
    let (width, height) = mosaic.data.dim();
    let mut out = mosaic.data.clone();
    if width <= 2 * NLM_BORDER || height <= 2 * NLM_BORDER {
        return out;
    }
    let src = mosaic.data.view();
    let cfa = mosaic.cfa;
    let b = NLM_BORDER;

    Zip::indexed(&mut out).par_for_each(|(x, y), p| {
        if x < b || y < b || x >= width - b || y >= height - b {
            return;
        }
        let (neighbours, stencil): (&[(isize, isize)], &[(isize, isize)]) = match cfa.color_at(x, y) {
            CfaColor::Green => (&GREEN_NEIGHBOURS[..], &GREEN_STENCIL[..]),
            CfaColor::Red | CfaColor::Blue => (&RED_BLUE_NEIGHBOURS[..], &RED_BLUE_STENCIL[..]),
        };

        let mut weight_sum = 1.0;
        let mut value_sum = at(&src, x, y, 0, 0);
        for &(nx, ny) in neighbours {
            let distance: f32 = stencil
                .iter()
                .map(|&(sx, sy)| (at(&src, x, y, sx, sy) - at(&src, x, y, nx + sx, ny + sy)).abs())
                .sum();
            let w = (-distance * h).exp();
            weight_sum += w;
            value_sum += w * at(&src, x, y, nx, ny);
        }
        *p = value_sum / weight_sum;
    });
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDenoise {
    pub strength: f32,
    pub iso: f32,
    pub profile: NoiseProfile,
}

impl RawDenoise {
    pub fn new(strength: f32, iso: f32) -> Self {
        Self {
            strength,
            iso,
            profile: NoiseProfile::default(),
        }
    }

    pub fn run(&self, mosaic: &mut Mosaic) -> Result<()> {
        if !(self.strength > 0.0) {
            return Err(DevelopError::InvalidOption {
                name: "RawDenoiseStrength",
                reason: format!("{} is not positive", self.strength),
            });
        }
        let (a, b) = self.profile.for_iso(self.iso);
        let vst = Stabilizer::new(a, b);
        debug!("noise model at ISO {}: a={:e} b={:e}", self.iso, a, b);

        mosaic.data.par_mapv_inplace(|p| vst.forward(p));
        let fixed = fix_dead_pixels(&mut mosaic.data);
        debug!("replaced {} dead photosites", fixed);

        let mut denoised = bayer_nlm(mosaic, 1.0 / self.strength);
        denoised.par_mapv_inplace(|y| vst.inverse(y));
        mosaic.data = denoised;
        Ok(())
    }
}
