//! Lookup tables for linearization, tone curves and gamma encoding.

use ndarray::{ArrayBase, DataMut, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::{DevelopError, Result};

/// Number of entries used for the float tables built from curves.
pub const CURVE_RESOLUTION: usize = 65536;

/// Steepness of the default tone curve.
const TONE_CURVE_C: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutIndex {
    /// `round(v)`, for sensor code tables.
    Integer,
    /// `floor(v * R)` over the `[0, 1]` domain.
    Float,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GammaCurve {
    #[default]
    #[serde(rename = "sRGB")]
    Srgb,
    #[serde(rename = "REC709")]
    Rec709,
}

impl GammaCurve {
    pub fn encode(&self, x: f32) -> f32 {
        match self {
            GammaCurve::Srgb => {
                if x < 0.0031308 {
                    12.92 * x
                } else {
                    1.055 * x.powf(1.0 / 2.4) - 0.055
                }
            }
            GammaCurve::Rec709 => {
                if x < 0.018 {
                    4.5 * x
                } else {
                    1.099 * x.powf(0.45) - 0.099
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lut {
    table: Vec<f32>,
    index: LutIndex,
}

impl Lut {
    pub fn from_table(table: Vec<f32>, index: LutIndex) -> Result<Self> {
        if table.is_empty() {
            return Err(DevelopError::EmptyLut);
        }
        Ok(Self { table, index })
    }

    /// `table[i] = i / R`, float indexed.
    pub fn identity(size: usize) -> Result<Self> {
        let table = (0..size).map(|i| i as f32 / size as f32).collect();
        Self::from_table(table, LutIndex::Float)
    }

    pub fn gamma(curve: GammaCurve, size: usize) -> Result<Self> {
        Self::from_fn(size, |x| curve.encode(x))
    }

    /// Piecewise-linear curve through `(x, y)` control points, flat outside them.
    pub fn from_curve_points(points: &[(f32, f32)], size: usize) -> Result<Self> {
        if points.is_empty() {
            return Err(DevelopError::EmptyLut);
        }
        let mut points = points.to_vec();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self::from_fn(size, |x| interpolate_points(&points, x))
    }

    /// Sigmoid S-curve normalised so that `f(0) = 0` and `f(1) = 1`.
    pub fn default_tone_curve(size: usize) -> Result<Self> {
        let sigmoid = |x: f32| {
            if x <= 0.0 {
                0.0
            } else {
                (1.0 / (1.0 + 1.0 / (TONE_CURVE_C * x))).powi(2)
            }
        };
        let top = sigmoid(1.0);
        Self::from_fn(size, |x| sigmoid(x) / top)
    }

    fn from_fn(size: usize, f: impl Fn(f32) -> f32) -> Result<Self> {
        let last = size.saturating_sub(1).max(1) as f32;
        let table = (0..size).map(|i| f(i as f32 / last)).collect();
        Self::from_table(table, LutIndex::Float)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn index_mode(&self) -> LutIndex {
        self.index
    }

    #[inline]
    pub fn lookup(&self, value: f32) -> f32 {
        let last = self.table.len() as isize - 1;
        // float to int casts saturate and map NaN to 0
        let index = match self.index {
            LutIndex::Integer => value.round() as isize,
            LutIndex::Float => (value * self.table.len() as f32).floor() as isize,
        };
        self.table[index.clamp(0, last) as usize]
    }

    pub fn apply<S, D>(&self, data: &mut ArrayBase<S, D>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        data.par_mapv_inplace(|v| self.lookup(v));
    }
}

fn interpolate_points(points: &[(f32, f32)], x: f32) -> f32 {
    let first = points[0];
    let last = points[points.len() - 1];
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    let upper = points.partition_point(|p| p.0 <= x).min(points.len() - 1);
    let (x0, y0) = points[upper - 1];
    let (x1, y1) = points[upper];
    if x1 <= x0 {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
