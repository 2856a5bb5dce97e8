use ndarray::Zip;

use crate::error::{DevelopError, Result};
use crate::extract::{phase_index, Mosaic};
use crate::orientation::Orientation;
use crate::tags::{TagValue, Tags};

/// Per-phase black levels (row-major `[p00, p01, p10, p11]`) and one white level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlackWhiteLevels {
    pub black: [f32; 4],
    pub white: f32,
}

impl BlackWhiteLevels {
    pub fn from_tags(tags: &Tags, bits_per_sample: u32) -> Result<Self> {
        let (rows, cols) = match tags.f64s("BlackLevelRepeatDim")? {
            None => (1, 1),
            Some(dims) if dims.len() == 2 => (dims[0] as u32, dims[1] as u32),
            Some(dims) => {
                return Err(DevelopError::InvalidField {
                    field: "BlackLevelRepeatDim",
                    reason: format!("expected two values, got {}", dims.len()),
                })
            }
        };

        let values = tags.f64s("BlackLevel")?.unwrap_or_else(|| vec![0.0]);
        let black = match (rows, cols) {
            (1, 1) => [first(&values)? as f32; 4],
            (2, 2) if values.len() >= 4 => {
                [values[0] as f32, values[1] as f32, values[2] as f32, values[3] as f32]
            }
            (2, 2) => {
                return Err(DevelopError::InvalidField {
                    field: "BlackLevel",
                    reason: format!("2x2 repeat needs four values, got {}", values.len()),
                })
            }
            (rows, cols) => return Err(DevelopError::UnsupportedBlackLevelRepeatDim { rows, cols }),
        };

        let white = match tags.get("WhiteLevel") {
            None => (2f64.powi(bits_per_sample as i32) - 1.0) as f32,
            Some(TagValue::Text(text)) => return Err(DevelopError::NonNumericWhiteLevel(text.clone())),
            Some(_) => tags.f64("WhiteLevel")?.unwrap_or_default() as f32,
        };

        Self::new(black, white)
    }

    pub fn new(black: [f32; 4], white: f32) -> Result<Self> {
        if let Some(black) = black.iter().copied().find(|b| *b > white) {
            return Err(DevelopError::BlackAboveWhite { black, white });
        }
        Ok(Self { black, white })
    }

    pub fn max_black(&self) -> f32 {
        self.black.iter().copied().fold(f32::MIN, f32::max)
    }

    /// Re-phases the black levels for `orientation` over a `width × height`
    /// mosaic. The pattern is anchored at the active area, so a crop never
    /// moves it.
    pub fn oriented(&self, orientation: Orientation, width: usize, height: usize) -> Self {
        Self {
            black: orientation.rotate_phases(self.black, width, height),
            white: self.white,
        }
    }

    /// Same as [`BlackWhiteLevels::oriented`] using the geometry recorded on the mosaic.
    pub fn for_mosaic(&self, mosaic: &Mosaic) -> Self {
        self.oriented(mosaic.orientation, mosaic.width(), mosaic.height())
    }

    /// `out = max(0, in − black[phase]) / (white − max(black))`, saturated at 1.
    ///
    /// Levels must already be phased for the mosaic's layout.
    pub fn normalize(&self, mosaic: &mut Mosaic) -> Result<()> {
        let range = self.white - self.max_black();
        if !(range > 0.0) || !range.is_finite() {
            return Err(DevelopError::Numeric(format!(
                "white level {} leaves no range above black level {}",
                self.white,
                self.max_black()
            )));
        }
        let black = self.black;
        Zip::indexed(&mut mosaic.data).par_for_each(|(x, y), v| {
            *v = ((*v - black[phase_index(x, y)]).max(0.0) / range).min(1.0);
        });
        Ok(())
    }
}

fn first(values: &[f64]) -> Result<f64> {
    values.first().copied().ok_or_else(|| DevelopError::InvalidField {
        field: "BlackLevel",
        reason: "empty list".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfa::CfaPattern;
    use crate::orientation::Rect;
    use ndarray::Array2;

    #[test]
    fn test_scalar_black_is_broadcast() {
        let tags = Tags::new().with("BlackLevel", 512u32).with("WhiteLevel", 16383u32);
        let levels = BlackWhiteLevels::from_tags(&tags, 14).unwrap();
        assert_eq!(levels.black, [512.0; 4]);
        assert_eq!(levels.white, 16383.0);
    }

    #[test]
    fn test_missing_white_uses_bit_depth() {
        let tags = Tags::new();
        let levels = BlackWhiteLevels::from_tags(&tags, 12).unwrap();
        assert_eq!(levels.white, 4095.0);
        assert_eq!(levels.black, [0.0; 4]);
    }

    #[test]
    fn test_repeat_dims() {
        let tags = Tags::new()
            .with("BlackLevelRepeatDim", vec![2u32, 2])
            .with("BlackLevel", vec![1u32, 2, 3, 4]);
        let levels = BlackWhiteLevels::from_tags(&tags, 16).unwrap();
        assert_eq!(levels.black, [1.0, 2.0, 3.0, 4.0]);

        let bad = Tags::new().with("BlackLevelRepeatDim", vec![3u32, 1]);
        assert!(matches!(
            BlackWhiteLevels::from_tags(&bad, 16),
            Err(DevelopError::UnsupportedBlackLevelRepeatDim { rows: 3, cols: 1 })
        ));
    }

    #[test]
    fn test_invalid_white() {
        let text = Tags::new().with("WhiteLevel", "max");
        assert!(matches!(
            BlackWhiteLevels::from_tags(&text, 16),
            Err(DevelopError::NonNumericWhiteLevel(_))
        ));
        let low = Tags::new().with("BlackLevel", 600u32).with("WhiteLevel", 500u32);
        assert!(matches!(
            BlackWhiteLevels::from_tags(&low, 16),
            Err(DevelopError::BlackAboveWhite { .. })
        ));
    }

    #[test]
    fn test_normalize_extremes() {
        let levels = BlackWhiteLevels::new([60.0, 64.0, 62.0, 61.0], 1000.0).unwrap();

        let mut dark = Mosaic::new(Array2::from_elem((4, 4), 60.0), CfaPattern::Rggb);
        levels.normalize(&mut dark).unwrap();
        assert!(dark.data.iter().all(|v| *v == 0.0));

        let mut bright = Mosaic::new(Array2::from_elem((4, 4), 1000.0), CfaPattern::Rggb);
        levels.normalize(&mut bright).unwrap();
        assert!(bright.data.iter().all(|v| *v <= 1.0));
        assert_eq!(bright.data[[1, 0]], 1.0);
    }

    #[test]
    fn test_per_phase_subtraction() {
        let levels = BlackWhiteLevels::new([0.0, 10.0, 20.0, 30.0], 130.0).unwrap();
        let mut mosaic = Mosaic::new(Array2::from_elem((2, 2), 50.0), CfaPattern::Rggb);
        levels.normalize(&mut mosaic).unwrap();
        assert_eq!(mosaic.data[[0, 0]], 0.5);
        assert_eq!(mosaic.data[[1, 0]], 0.4);
        assert_eq!(mosaic.data[[0, 1]], 0.3);
        assert_eq!(mosaic.data[[1, 1]], 0.2);
    }

    #[test]
    fn test_zero_range_is_numeric_error() {
        let levels = BlackWhiteLevels::new([100.0; 4], 100.0).unwrap();
        let mut mosaic = Mosaic::new(Array2::zeros((2, 2)), CfaPattern::Rggb);
        let err = levels.normalize(&mut mosaic).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Numeric);
    }

    #[test]
    fn test_rephasing() {
        let levels = BlackWhiteLevels::new([1.0, 2.0, 3.0, 4.0], 100.0).unwrap();
        let rotated = levels.oriented(Orientation::Rotate180, 4, 4);
        assert_eq!(rotated.black, [4.0, 3.0, 2.0, 1.0]);
        assert_eq!(levels.oriented(Orientation::Normal, 4, 4), levels);
    }

    #[test]
    fn test_crop_keeps_black_phases() {
        let levels = BlackWhiteLevels::new([1.0, 2.0, 3.0, 4.0], 100.0).unwrap();
        let mut mosaic = Mosaic::new(Array2::zeros((4, 4)), CfaPattern::Grbg);
        mosaic.crop = Rect {
            top: 1,
            left: 1,
            bottom: 5,
            right: 5,
        };
        assert_eq!(levels.for_mosaic(&mosaic).black, [1.0, 2.0, 3.0, 4.0]);
    }
}
