//! Calibration stages run on the mosaic before demosaicing.

use serde::{Deserialize, Serialize};

use crate::error::{DevelopError, Result};
use crate::extract::Mosaic;
use crate::gain_map::{parse_opcode_list, GainMap, GainMapMode};
use crate::levels::BlackWhiteLevels;
use crate::lut::{Lut, LutIndex};
use crate::raw_denoise::RawDenoise;
use crate::tags::Tags;
use crate::wavelets;

pub trait MosaicModule {
    fn process(&self, mosaic: Mosaic) -> Result<Mosaic>;
    fn get_name(&self) -> String;
}

/// Sensor code → linear value table, indexed by rounded sample value.
#[derive(Debug, Clone)]
pub struct Linearize {
    pub lut: Lut,
}

impl Linearize {
    pub fn from_tags(tags: &Tags) -> Result<Option<Self>> {
        let Some(table) = tags.f64s("LinearizationTable")? else {
            return Ok(None);
        };
        let lut = Lut::from_table(table.into_iter().map(|v| v as f32).collect(), LutIndex::Integer)?;
        Ok(Some(Self { lut }))
    }
}

impl MosaicModule for Linearize {
    fn process(&self, mut mosaic: Mosaic) -> Result<Mosaic> {
        self.lut.apply(&mut mosaic.data);
        Ok(mosaic)
    }

    fn get_name(&self) -> String {
        "Linearize".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Levels {
    /// Phased for the uncropped, unrotated sensor.
    pub levels: BlackWhiteLevels,
}

impl MosaicModule for Levels {
    fn process(&self, mut mosaic: Mosaic) -> Result<Mosaic> {
        self.levels.for_mosaic(&mosaic).normalize(&mut mosaic)?;
        Ok(mosaic)
    }

    fn get_name(&self) -> String {
        "BlackWhiteLevels".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RawNlm {
    pub denoise: RawDenoise,
}

impl MosaicModule for RawNlm {
    fn process(&self, mut mosaic: Mosaic) -> Result<Mosaic> {
        self.denoise.run(&mut mosaic)?;
        Ok(mosaic)
    }

    fn get_name(&self) -> String {
        "RawNlm".to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WaveletDenoise {
    pub noise_threshold: f32,
}

impl MosaicModule for WaveletDenoise {
    fn process(&self, mut mosaic: Mosaic) -> Result<Mosaic> {
        wavelets::denoise_mosaic(&mut mosaic, self.noise_threshold);
        Ok(mosaic)
    }

    fn get_name(&self) -> String {
        "WaveletDenoise".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct GainMaps {
    /// In sensor orientation, relative to the active area.
    pub maps: Vec<GainMap>,
    pub percent: f32,
    pub mode: GainMapMode,
}

impl GainMaps {
    pub fn from_tags(tags: &Tags, percent: f32, mode: GainMapMode) -> Result<Option<Self>> {
        let Some(bytes) = tags.bytes("OpcodeList2")? else {
            return Ok(None);
        };
        let maps = parse_opcode_list(bytes)?;
        if maps.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { maps, percent, mode }))
    }
}

impl MosaicModule for GainMaps {
    fn process(&self, mut mosaic: Mosaic) -> Result<Mosaic> {
        let (width, height) = mosaic.data.dim();
        for map in &self.maps {
            map.oriented(mosaic.orientation, width, height)
                .apply(&mut mosaic, self.percent, self.mode);
        }
        Ok(mosaic)
    }

    fn get_name(&self) -> String {
        "GainMap".to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinearGain {
    pub gain: f32,
}

impl MosaicModule for LinearGain {
    fn process(&self, mut mosaic: Mosaic) -> Result<Mosaic> {
        if !self.gain.is_finite() {
            return Err(DevelopError::Numeric(format!("linear gain {} is not finite", self.gain)));
        }
        let gain = self.gain;
        mosaic.data.par_mapv_inplace(|v| v * gain);
        Ok(mosaic)
    }

    fn get_name(&self) -> String {
        "LinearGain".to_string()
    }
}
