use color::ColorSpaceTag::{self, Oklch};
use convolve_image::kernel::SeparableKernel;
use itertools::Itertools;
use nalgebra::Matrix3;
use ndarray::{s, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DevelopError, Result};
use crate::lut::{GammaCurve, Lut, LutIndex, CURVE_RESOLUTION};
use crate::pixels::{DevelopedImage, Pixel, PixelOps, MIDDLE_GRAY};
use crate::tags::Tags;
use crate::wavelets::{B3SplineKernel, Convolution};

pub const HISTOGRAM_BINS: usize = 4096;
const WHITE_BALANCE_RANGE: (f32, f32) = (0.01, 0.95);

pub trait PipelineModule {
    fn process(&self, image: DevelopedImage) -> Result<DevelopedImage>;
    fn get_name(&self) -> String;
}

fn to_f32(matrix: &Matrix3<f64>) -> [[f32; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = matrix[(i, j)] as f32;
        }
    }
    out
}

#[inline]
fn mul(m: &[[f32; 3]; 3], [r, g, b]: Pixel) -> Pixel {
    m.map(|row| row[0] * r + row[1] * g + row[2] * b)
}

/// Camera RGB → linear ProPhoto.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTransform {
    pub matrix: Matrix3<f64>,
}

impl PipelineModule for ColorTransform {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        let m = to_f32(&self.matrix);
        image.map_pixels(|p| mul(&m, p));
        Ok(image)
    }

    fn get_name(&self) -> String {
        "ColorTransform".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ToneCurve {
    pub lut: Lut,
}

impl ToneCurve {
    /// `ProfileToneCurve` when tagged, the default S-curve otherwise.
    pub fn from_tags(tags: &Tags) -> Result<Self> {
        let lut = match tags.f64s("ProfileToneCurve")? {
            Some(values) if values.len() >= 2 && values.len() % 2 == 0 => {
                let points: Vec<(f32, f32)> = values.into_iter().map(|v| v as f32).tuples().collect();
                Lut::from_curve_points(&points, CURVE_RESOLUTION)?
            }
            Some(values) => {
                return Err(DevelopError::InvalidField {
                    field: "ProfileToneCurve",
                    reason: format!("expected (x, y) pairs, got {} values", values.len()),
                })
            }
            None => Lut::default_tone_curve(CURVE_RESOLUTION)?,
        };
        Ok(Self { lut })
    }
}

impl PipelineModule for ToneCurve {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        self.lut.apply(&mut image.data);
        Ok(image)
    }

    fn get_name(&self) -> String {
        "ToneCurve".to_string()
    }
}

/// Linear ProPhoto → linear output primaries, negatives clipped.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTransform {
    pub matrix: Matrix3<f64>,
}

impl PipelineModule for OutputTransform {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        let m = to_f32(&self.matrix);
        image.map_pixels(|p| mul(&m, p).map(|v| v.max(0.0)));
        Ok(image)
    }

    fn get_name(&self) -> String {
        "OutputTransform".to_string()
    }
}

fn rgb_to_hsv([r, g, b]: Pixel) -> [f32; 3] {
    let max = r.max(g).max(b);
    let delta = max - r.min(g).min(b);
    let hue = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max > 0.0 { delta / max } else { 0.0 };
    [hue, saturation, max]
}

fn hsv_to_rgb([hue, saturation, value]: [f32; 3]) -> Pixel {
    let sector = hue.rem_euclid(360.0) / 60.0;
    let c = value * saturation;
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let m = value - c;
    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// DNG hue/saturation/value map: hue shift in degrees, saturation and
/// value scales, stored value-major then hue then saturation.
#[derive(Debug, Clone, PartialEq)]
pub struct HueSatMap {
    pub hue_divisions: usize,
    pub sat_divisions: usize,
    pub val_divisions: usize,
    pub entries: Vec<[f32; 3]>,
}

impl HueSatMap {
    pub fn from_tags(tags: &Tags) -> Result<Option<Self>> {
        let Some(dims) = tags.f64s("ProfileHueSatMapDims")? else {
            return Ok(None);
        };
        let data = match tags.f64s("ProfileHueSatMapData2")? {
            Some(data) => data,
            None => match tags.f64s("ProfileHueSatMapData1")? {
                Some(data) => data,
                None => return Ok(None),
            },
        };
        if dims.len() != 3 || dims.iter().any(|d| *d < 1.0 || d.fract() != 0.0) {
            return Err(DevelopError::InvalidField {
                field: "ProfileHueSatMapDims",
                reason: format!("expected three positive counts, got {:?}", dims),
            });
        }
        let (hue_divisions, sat_divisions, val_divisions) = (dims[0] as usize, dims[1] as usize, dims[2] as usize);
        let expected = hue_divisions
            .checked_mul(sat_divisions)
            .and_then(|n| n.checked_mul(val_divisions))
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| DevelopError::InvalidField {
                field: "ProfileHueSatMapDims",
                reason: format!("{:?} divisions overflow the table size", dims),
            })?;
        if data.len() != expected {
            return Err(DevelopError::InvalidField {
                field: "ProfileHueSatMapData",
                reason: format!("expected {} values, got {}", expected, data.len()),
            });
        }
        let entries = data
            .into_iter()
            .map(|v| v as f32)
            .tuples()
            .map(|(h, s, v)| [h, s, v])
            .collect();
        Ok(Some(Self {
            hue_divisions,
            sat_divisions,
            val_divisions,
            entries,
        }))
    }

    fn entry(&self, hue: usize, sat: usize, val: usize) -> [f32; 3] {
        self.entries[val * self.hue_divisions * self.sat_divisions + hue * self.sat_divisions + sat]
    }

    /// Bilinear in hue (wrapping) and saturation, nearest in value.
    pub fn lookup(&self, hue: f32, saturation: f32, value: f32) -> [f32; 3] {
        let hue_pos = hue.rem_euclid(360.0) * self.hue_divisions as f32 / 360.0;
        let h0 = (hue_pos.floor() as usize).min(self.hue_divisions - 1);
        let h1 = (h0 + 1) % self.hue_divisions;
        let hf = hue_pos - h0 as f32;

        let sat_pos = saturation.clamp(0.0, 1.0) * (self.sat_divisions - 1) as f32;
        let s0 = sat_pos.floor() as usize;
        let s1 = (s0 + 1).min(self.sat_divisions - 1);
        let sf = sat_pos - s0 as f32;

        let v = (value.clamp(0.0, 1.0) * (self.val_divisions - 1) as f32).round() as usize;

        let blend = |a: [f32; 3], b: [f32; 3], t: f32| [0, 1, 2].map(|i| a[i] + (b[i] - a[i]) * t);
        let low = blend(self.entry(h0, s0, v), self.entry(h0, s1, v), sf);
        let high = blend(self.entry(h1, s0, v), self.entry(h1, s1, v), sf);
        blend(low, high, hf)
    }
}

impl PipelineModule for HueSatMap {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        image.map_pixels(|p| {
            let [hue, saturation, value] = rgb_to_hsv(p);
            let [shift, sat_scale, val_scale] = self.lookup(hue, saturation, value);
            hsv_to_rgb([
                hue + shift,
                (saturation * sat_scale).clamp(0.0, 1.0),
                value * val_scale,
            ])
        });
        Ok(image)
    }

    fn get_name(&self) -> String {
        "HueSatMap".to_string()
    }
}

/// Grey-world white balance over the well exposed pixels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AutoWhiteBalance {}

impl AutoWhiteBalance {
    pub fn gains(image: &DevelopedImage) -> [f32; 3] {
        let (low, high) = WHITE_BALANCE_RANGE;
        let (sums, count) = image
            .pixels()
            .into_iter()
            .filter(|p| p.iter().all(|v| *v > low && *v < high))
            .fold(([0.0f64; 3], 0usize), |(mut sums, count), p| {
                for (sum, v) in sums.iter_mut().zip(p) {
                    *sum += v as f64;
                }
                (sums, count + 1)
            });
        if count == 0 {
            warn!("no pixels usable for automatic white balance");
            return [1.0; 3];
        }
        let means = sums.map(|s| s / count as f64);
        means.map(|mean| {
            if mean <= 0.0 || means[1] <= 0.0 {
                warn!("channel mean is zero, skipping its white balance gain");
                1.0
            } else {
                (means[1] / mean) as f32
            }
        })
    }
}

impl PipelineModule for AutoWhiteBalance {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        let gains = Self::gains(&image);
        debug!("white balance gains {:?}", gains);
        image.map_pixels(|p| [p[0] * gains[0], p[1] * gains[1], p[2] * gains[2]]);
        Ok(image)
    }

    fn get_name(&self) -> String {
        "AutoWhiteBalance".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Gamma {
    pub curve: GammaCurve,
    lut: Lut,
}

impl Gamma {
    pub fn new(curve: GammaCurve) -> Result<Self> {
        Ok(Self {
            curve,
            lut: Lut::gamma(curve, CURVE_RESOLUTION)?,
        })
    }
}

impl PipelineModule for Gamma {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        image
            .data
            .par_mapv_inplace(|v| self.lut.lookup(v.clamp(0.0, 1.0)));
        Ok(image)
    }

    fn get_name(&self) -> String {
        "Gamma".to_string()
    }
}

/// Unsharp mask against a B3-spline blur.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sharpen {
    pub amount: f32,
}

impl PipelineModule for Sharpen {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        let kernel: SeparableKernel<5> = B3SplineKernel::new().into();
        for c in 0..3 {
            let blurred = image.plane(c).convolve(kernel, 1);
            let amount = self.amount;
            Zip::from(image.data.slice_mut(s![c, .., ..]))
                .and(&blurred)
                .par_for_each(|v, b| *v += amount * (*v - b));
        }
        Ok(image)
    }

    fn get_name(&self) -> String {
        "Sharpen".to_string()
    }
}

/// Middle-grey contrast then Oklch chroma scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorEnhancement {
    pub saturation: f32,
    pub contrast: f32,
    pub color_space: ColorSpaceTag,
}

impl ColorEnhancement {
    pub fn new(saturation: f32, contrast: f32) -> Self {
        Self {
            saturation,
            contrast,
            color_space: ColorSpaceTag::Srgb,
        }
    }
}

impl PipelineModule for ColorEnhancement {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        let contrast = |x: f32| {
            if x <= 0.0 {
                0.0
            } else {
                MIDDLE_GRAY * (x / MIDDLE_GRAY).powf(self.contrast)
            }
        };
        let source_cs = self.color_space;
        image.map_pixels(|p| {
            let [l, c, h] = source_cs.convert(Oklch, p.map(contrast));
            Oklch
                .convert(source_cs, [l, c * self.saturation, h])
                .map(|v| v.clamp(0.0, 1.0))
        });
        Ok(image)
    }

    fn get_name(&self) -> String {
        "ColorEnhancement".to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistogramEqualization {
    pub fraction: f32,
}

impl HistogramEqualization {
    /// Cumulative luminance histogram, normalised to `[0, 1]`.
    pub fn lut(image: &DevelopedImage) -> Result<Option<Lut>> {
        let mut histogram = vec![0u64; HISTOGRAM_BINS];
        let pixels = image.pixels();
        if pixels.is_empty() {
            return Ok(None);
        }
        for p in &pixels {
            let l = p.luminance().clamp(0.0, 1.0);
            histogram[((l * HISTOGRAM_BINS as f32) as usize).min(HISTOGRAM_BINS - 1)] += 1;
        }
        let total = pixels.len() as f32;
        let table = histogram
            .iter()
            .scan(0u64, |acc, n| {
                *acc += n;
                Some(*acc as f32 / total)
            })
            .collect();
        Lut::from_table(table, LutIndex::Float).map(Some)
    }
}

impl PipelineModule for HistogramEqualization {
    fn process(&self, mut image: DevelopedImage) -> Result<DevelopedImage> {
        let Some(lut) = Self::lut(&image)? else {
            return Ok(image);
        };
        let f = self.fraction;
        image
            .data
            .par_mapv_inplace(|v| (1.0 - f) * v + f * lut.lookup(v.clamp(0.0, 1.0)));
        Ok(image)
    }

    fn get_name(&self) -> String {
        "HistogramEqualization".to_string()
    }
}
