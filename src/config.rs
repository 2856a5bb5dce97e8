use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color_matrix::Illuminant;
use crate::error::{DevelopError, Result};
use crate::gain_map::GainMapMode;
use crate::lut::GammaCurve;

/// Every switch and parameter of a develop call. Keys are PascalCase in
/// TOML and every key is optional.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PipelineOptions {
    pub linearization_skip: bool,
    pub raw_denoise_enabled: bool,
    pub raw_denoise_strength: f32,
    pub wavelet_denoise_enabled: bool,
    pub noise_threshold: f32,
    pub gain_map_enabled: bool,
    pub gain_map_percent: f32,
    pub gain_map_mode: GainMapMode,
    pub linear_gain: f32,
    pub sharpen_enabled: bool,
    pub sharpen_amount: f32,
    pub hist_eq_enabled: bool,
    pub hist_eq_fraction: f32,
    pub color_enhancement_enabled: bool,
    pub saturation: f32,
    pub contrast: f32,
    pub auto_white_balance_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_color_matrix: Option<Vec<Vec<f64>>>,
    pub tone_curve_enabled: bool,
    pub hue_sat_map_enabled: bool,
    pub target_illuminant: Illuminant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_scale: Option<[f64; 2]>,
    pub gamma_curve: GammaCurve,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            linearization_skip: false,
            raw_denoise_enabled: false,
            raw_denoise_strength: 1.0,
            wavelet_denoise_enabled: false,
            noise_threshold: 1.0,
            gain_map_enabled: true,
            gain_map_percent: 1.0,
            gain_map_mode: GainMapMode::Multiply,
            linear_gain: 1.0,
            sharpen_enabled: false,
            sharpen_amount: 0.5,
            hist_eq_enabled: false,
            hist_eq_fraction: 0.5,
            color_enhancement_enabled: false,
            saturation: 1.2,
            contrast: 1.1,
            auto_white_balance_enabled: false,
            custom_color_matrix: None,
            tone_curve_enabled: true,
            hue_sat_map_enabled: true,
            target_illuminant: Illuminant::D55,
            chroma_scale: None,
            gamma_curve: GammaCurve::Srgb,
        }
    }
}

fn invalid(name: &'static str, reason: String) -> DevelopError {
    DevelopError::InvalidOption { name, reason }
}

impl PipelineOptions {
    pub fn from_toml_str(data: &str) -> Result<Self> {
        let options: Self = toml::from_str(data)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("GainMapPercent", self.gain_map_percent),
            ("HistEqFraction", self.hist_eq_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("{} is outside [0, 1]", value)));
            }
        }
        if !(self.raw_denoise_strength > 0.0) {
            return Err(invalid(
                "RawDenoiseStrength",
                format!("{} must be positive", self.raw_denoise_strength),
            ));
        }
        for (name, value) in [
            ("NoiseThreshold", self.noise_threshold),
            ("SharpenAmount", self.sharpen_amount),
            ("Saturation", self.saturation),
            ("Contrast", self.contrast),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, format!("{} must be finite and non-negative", value)));
            }
        }
        if !self.linear_gain.is_finite() {
            return Err(invalid("LinearGain", format!("{} is not finite", self.linear_gain)));
        }
        if let Some(rows) = &self.custom_color_matrix {
            if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
                let cols = rows.first().map(|r| r.len()).unwrap_or(0);
                return Err(DevelopError::InvalidColorMatrix { rows: rows.len(), cols });
            }
        }
        Ok(())
    }
}
