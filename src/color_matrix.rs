//! Camera colour calibration: resolves the DNG matrices for a target
//! illuminant (or the as-shot neutral) into one camera → ProPhoto matrix.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DevelopError, Result};
use crate::tags::Tags;

pub const D50_XYZ: [f64; 3] = [0.96422, 1.0, 0.82521];
pub const D65_XYZ: [f64; 3] = [0.95047, 1.0, 1.08883];

const AS_SHOT_WEIGHT_1: f64 = 0.35;
const AS_SHOT_WEIGHT_2: f64 = 0.55;

#[rustfmt::skip]
const BRADFORD: [f64; 9] = [
     0.8951,  0.2664, -0.1614,
    -0.7502,  1.7135,  0.0367,
     0.0389, -0.0685,  1.0296,
];

#[rustfmt::skip]
const PROPHOTO_TO_XYZ_D50: [f64; 9] = [
    0.7976749, 0.1351917, 0.0313534,
    0.2880402, 0.7118741, 0.0000857,
    0.0,       0.0,       0.8252100,
];

#[rustfmt::skip]
const XYZ_D65_TO_LINEAR_SRGB: [f64; 9] = [
     3.2404542, -1.5371385, -0.4985314,
    -0.9692660,  1.8760108,  0.0415560,
     0.0556434, -0.2040259,  1.0572252,
];

/// EXIF `LightSource` values usable as calibration or target illuminants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Illuminant {
    Daylight,
    Fluorescent,
    Tungsten,
    Flash,
    FineWeather,
    CloudyWeather,
    Shade,
    DaylightFluorescent,
    DayWhiteFluorescent,
    CoolWhiteFluorescent,
    WhiteFluorescent,
    WarmWhiteFluorescent,
    StandardA,
    StandardB,
    StandardC,
    #[default]
    D55,
    D65,
    D75,
    D50,
    IsoStudioTungsten,
}

impl Illuminant {
    /// Unknown codes fall back to D65.
    pub fn from_exif(code: u32) -> Self {
        match code {
            1 => Illuminant::Daylight,
            2 => Illuminant::Fluorescent,
            3 => Illuminant::Tungsten,
            4 => Illuminant::Flash,
            9 => Illuminant::FineWeather,
            10 => Illuminant::CloudyWeather,
            11 => Illuminant::Shade,
            12 => Illuminant::DaylightFluorescent,
            13 => Illuminant::DayWhiteFluorescent,
            14 => Illuminant::CoolWhiteFluorescent,
            15 => Illuminant::WhiteFluorescent,
            16 => Illuminant::WarmWhiteFluorescent,
            17 => Illuminant::StandardA,
            18 => Illuminant::StandardB,
            19 => Illuminant::StandardC,
            20 => Illuminant::D55,
            21 => Illuminant::D65,
            22 => Illuminant::D75,
            23 => Illuminant::D50,
            24 => Illuminant::IsoStudioTungsten,
            other => {
                warn!("illuminant {} is not supported, assuming D65", other);
                Illuminant::D65
            }
        }
    }

    pub fn cct(&self) -> f64 {
        match self {
            Illuminant::Daylight => 5500.0,
            Illuminant::Fluorescent => 4150.0,
            Illuminant::Tungsten => 2850.0,
            Illuminant::Flash => 5500.0,
            Illuminant::FineWeather => 5500.0,
            Illuminant::CloudyWeather => 6500.0,
            Illuminant::Shade => 7500.0,
            Illuminant::DaylightFluorescent => 6400.0,
            Illuminant::DayWhiteFluorescent => 5000.0,
            Illuminant::CoolWhiteFluorescent => 4150.0,
            Illuminant::WhiteFluorescent => 3450.0,
            Illuminant::WarmWhiteFluorescent => 2940.0,
            Illuminant::StandardA => 2856.0,
            Illuminant::StandardB => 4874.0,
            Illuminant::StandardC => 6774.0,
            Illuminant::D55 => 5503.0,
            Illuminant::D65 => 6504.0,
            Illuminant::D75 => 7504.0,
            Illuminant::D50 => 5003.0,
            Illuminant::IsoStudioTungsten => 3200.0,
        }
    }
}

/// Chromaticity of a colour temperature: Kim et al. Planckian locus below
/// 4000 K, CIE daylight locus above.
pub fn cct_to_xy(cct: f64) -> (f64, f64) {
    let t = cct.clamp(1667.0, 25000.0);
    let (t2, t3) = (t * t, t * t * t);
    if t < 4000.0 {
        let x = -0.2661239e9 / t3 - 0.2343589e6 / t2 + 0.8776956e3 / t + 0.179910;
        let y = if t < 2222.0 {
            -1.1063814 * x.powi(3) - 1.34811020 * x * x + 2.18555832 * x - 0.20219683
        } else {
            -0.9549476 * x.powi(3) - 1.37418593 * x * x + 2.09137015 * x - 0.16748867
        };
        (x, y)
    } else {
        let x = if t <= 7000.0 {
            -4.6070e9 / t3 + 2.9678e6 / t2 + 0.09911e3 / t + 0.244063
        } else {
            -2.0064e9 / t3 + 1.9018e6 / t2 + 0.24748e3 / t + 0.237040
        };
        (x, -3.0 * x * x + 2.87 * x - 0.275)
    }
}

pub fn xy_to_xyz((x, y): (f64, f64)) -> Vector3<f64> {
    Vector3::new(x / y, 1.0, (1.0 - x - y) / y)
}

/// Bradford chromatic adaptation from `src` white to `dst` white (XYZ).
pub fn bradford(src: &Vector3<f64>, dst: &Vector3<f64>) -> Result<Matrix3<f64>> {
    let b = Matrix3::from_row_slice(&BRADFORD);
    let b_inv = invert(&b, "Bradford")?;
    let src_cone = b * src;
    let dst_cone = b * dst;
    if src_cone.iter().any(|v| v.abs() < f64::EPSILON) {
        return Err(DevelopError::Numeric(format!("degenerate source white {:?}", src)));
    }
    let scale = Matrix3::from_diagonal(&dst_cone.component_div(&src_cone));
    Ok(b_inv * scale * b)
}

fn invert(m: &Matrix3<f64>, what: &str) -> Result<Matrix3<f64>> {
    m.try_inverse()
        .ok_or_else(|| DevelopError::Numeric(format!("{} matrix is singular", what)))
}

/// Weight of the first calibration for a target temperature. Pinned to 0 at
/// or below `cct2` and to 1 at or above `cct1`, reciprocal-linear between.
pub fn interpolation_coefficient(target: f64, cct1: f64, cct2: f64) -> f64 {
    if target <= cct2 {
        0.0
    } else if target >= cct1 {
        1.0
    } else {
        ((1.0 / target - 1.0 / cct1) / (1.0 / cct2 - 1.0 / cct1)).clamp(0.0, 1.0)
    }
}

pub fn prophoto_to_xyz_d50() -> Matrix3<f64> {
    Matrix3::from_row_slice(&PROPHOTO_TO_XYZ_D50)
}

/// Linear ProPhoto (D50) → linear sRGB / Rec.709 primaries (D65).
pub fn prophoto_to_linear_srgb() -> Result<Matrix3<f64>> {
    let adapt = bradford(&Vector3::from(D50_XYZ), &Vector3::from(D65_XYZ))?;
    Ok(Matrix3::from_row_slice(&XYZ_D65_TO_LINEAR_SRGB) * adapt * prophoto_to_xyz_d50())
}

/// Scales the two chroma axes of an opponent basis by `a` and `b`.
pub fn saturation_matrix(a: f64, b: f64) -> Result<Matrix3<f64>> {
    #[rustfmt::skip]
    let opponent = Matrix3::new(
        1.0 / 3.0, 1.0 / 3.0,  1.0 / 3.0,
        0.5,       -0.5,       0.0,
        0.25,      0.25,       -0.5,
    );
    let back = invert(&opponent, "opponent basis")?;
    Ok(back * Matrix3::from_diagonal(&Vector3::new(1.0, a, b)) * opponent)
}

/// Builds a 3×3 matrix from nested rows, rejecting any other shape.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<Matrix3<f64>> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
        return Err(DevelopError::InvalidColorMatrix { rows: rows.len(), cols });
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(Matrix3::from_row_slice(&flat))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorCalibration {
    pub camera_calibration: [Matrix3<f64>; 2],
    pub color_matrix: [Matrix3<f64>; 2],
    pub analog_balance: Matrix3<f64>,
    pub illuminant: [Illuminant; 2],
    pub as_shot_neutral: Option<Vector3<f64>>,
}

fn color_matrix_tag(tags: &Tags, name: &'static str) -> Result<Option<Matrix3<f64>>> {
    match tags.f64s(name)? {
        None => Ok(None),
        Some(values) if values.len() == 9 => Ok(Some(Matrix3::from_row_slice(&values))),
        Some(values) => {
            let (rows, cols) = if values.len() % 3 == 0 { (values.len() / 3, 3) } else { (1, values.len()) };
            Err(DevelopError::InvalidColorMatrix { rows, cols })
        }
    }
}

impl ColorCalibration {
    pub fn from_tags(tags: &Tags) -> Result<Self> {
        let cm1 = color_matrix_tag(tags, "ColorMatrix1")?.ok_or(DevelopError::MissingField("ColorMatrix1"))?;
        let illuminant1 = Illuminant::from_exif(tags.u32("CalibrationIlluminant1")?.unwrap_or(21));

        let (cm2, illuminant2) = match color_matrix_tag(tags, "ColorMatrix2")? {
            Some(cm2) => {
                let code = tags.u32("CalibrationIlluminant2")?.unwrap_or(21);
                (cm2, Illuminant::from_exif(code))
            }
            None => (cm1, illuminant1),
        };

        let cc1 = tags.matrix3("CameraCalibration1")?.unwrap_or_else(Matrix3::identity);
        let cc2 = tags.matrix3("CameraCalibration2")?.unwrap_or_else(Matrix3::identity);
        let analog_balance = tags
            .vector3("AnalogBalance")?
            .map(|ab| Matrix3::from_diagonal(&ab))
            .unwrap_or_else(Matrix3::identity);

        Ok(Self {
            camera_calibration: [cc1, cc2],
            color_matrix: [cm1, cm2],
            analog_balance,
            illuminant: [illuminant1, illuminant2],
            as_shot_neutral: tags.vector3("AsShotNeutral")?,
        })
    }

    fn xyz_to_camera(&self, k: usize) -> Matrix3<f64> {
        self.analog_balance * self.camera_calibration[k] * self.color_matrix[k]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColor {
    /// XYZ (D50) → camera.
    pub xyz_to_camera: Matrix3<f64>,
    pub prophoto_to_camera: Matrix3<f64>,
    pub camera_to_prophoto: Matrix3<f64>,
    /// Weight of the first calibration when interpolating by temperature.
    pub coefficient: Option<f64>,
}

pub fn resolve(calibration: &ColorCalibration, target: Illuminant) -> Result<ResolvedColor> {
    let d50 = Vector3::from(D50_XYZ);

    let (xyz_to_camera, coefficient) = match calibration.as_shot_neutral {
        Some(neutral) => {
            let cam_to_xyz_1 = invert(&calibration.xyz_to_camera(0), "XYZ to camera 1")?;
            let cam_to_xyz_2 = invert(&calibration.xyz_to_camera(1), "XYZ to camera 2")?;
            let cam_to_xyz = cam_to_xyz_1 * AS_SHOT_WEIGHT_1 + cam_to_xyz_2 * AS_SHOT_WEIGHT_2;
            let white = cam_to_xyz * neutral;
            if !white.iter().all(|v| v.is_finite()) {
                return Err(DevelopError::Numeric(format!("as-shot white {:?} is not finite", white)));
            }
            let adapted = bradford(&white, &d50)? * cam_to_xyz;
            (invert(&adapted, "camera to XYZ")?, None)
        }
        None => {
            let [cct1, cct2] = calibration.illuminant.map(|i| i.cct());
            if cct1 < cct2 {
                warn!(
                    "calibration illuminant 1 ({} K) is cooler than illuminant 2 ({} K), this ordering is not supported",
                    cct1, cct2
                );
            }
            let coef = interpolation_coefficient(target.cct(), cct1, cct2);
            let cc = calibration.camera_calibration[0] * coef + calibration.camera_calibration[1] * (1.0 - coef);
            let cm = calibration.color_matrix[0] * coef + calibration.color_matrix[1] * (1.0 - coef);
            let xyz_to_camera = calibration.analog_balance * cc * cm;

            let target_white = xy_to_xyz(cct_to_xy(target.cct()));
            let adapted = xyz_to_camera * bradford(&d50, &target_white)?;
            let peak = (adapted * d50).max();
            if !(peak > 0.0) || !peak.is_finite() {
                return Err(DevelopError::Numeric(format!("D50 maps to non-positive camera peak {}", peak)));
            }
            (adapted / peak, Some(coef))
        }
    };

    let prophoto_to_camera = xyz_to_camera * prophoto_to_xyz_d50();
    let camera_to_prophoto = invert(&prophoto_to_camera, "ProPhoto to camera")?;
    debug!("camera to ProPhoto: {:?}", camera_to_prophoto);

    Ok(ResolvedColor {
        xyz_to_camera,
        prophoto_to_camera,
        camera_to_prophoto,
        coefficient,
    })
}
