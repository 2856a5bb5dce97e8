use std::time::Instant;

use nalgebra::Matrix3;
use tracing::{debug, info, instrument};

use crate::color_matrix::{self, ColorCalibration};
use crate::config::PipelineOptions;
use crate::demosaic::demosaic;
use crate::error::Result;
use crate::extract::{extract, Mosaic};
use crate::frame::RawFrame;
use crate::imops::*;
use crate::levels::BlackWhiteLevels;
use crate::normalize::*;
use crate::pixels::DevelopedImage;
use crate::raw_denoise::RawDenoise;
use crate::tags::Tags;

const DEFAULT_ISO: f32 = 100.0;

/// Modules of one develop call, in execution order.
pub struct Pipeline {
    pub mosaic_modules: Vec<Box<dyn MosaicModule>>,
    pub image_modules: Vec<Box<dyn PipelineModule>>,
}

fn camera_to_prophoto(tags: &Tags, options: &PipelineOptions) -> Result<Matrix3<f64>> {
    let matrix = match &options.custom_color_matrix {
        Some(rows) => color_matrix::matrix_from_rows(rows)?,
        None => {
            let calibration = ColorCalibration::from_tags(tags)?;
            color_matrix::resolve(&calibration, options.target_illuminant)?.camera_to_prophoto
        }
    };
    match options.chroma_scale {
        Some([a, b]) => Ok(color_matrix::saturation_matrix(a, b)? * matrix),
        None => Ok(matrix),
    }
}

impl Pipeline {
    pub fn new(tags: &Tags, bits_per_sample: u32, options: &PipelineOptions) -> Result<Self> {
        let mut mosaic_modules: Vec<Box<dyn MosaicModule>> = vec![];
        if !options.linearization_skip {
            if let Some(linearize) = Linearize::from_tags(tags)? {
                mosaic_modules.push(Box::new(linearize));
            }
        }
        mosaic_modules.push(Box::new(Levels {
            levels: BlackWhiteLevels::from_tags(tags, bits_per_sample)?,
        }));
        if options.raw_denoise_enabled {
            let iso = tags.f64("ISOSpeedRatings")?.map(|v| v as f32).unwrap_or(DEFAULT_ISO);
            mosaic_modules.push(Box::new(RawNlm {
                denoise: RawDenoise::new(options.raw_denoise_strength, iso),
            }));
        }
        if options.wavelet_denoise_enabled {
            mosaic_modules.push(Box::new(WaveletDenoise {
                noise_threshold: options.noise_threshold,
            }));
        }
        if options.gain_map_enabled {
            if let Some(gain_maps) = GainMaps::from_tags(tags, options.gain_map_percent, options.gain_map_mode)? {
                mosaic_modules.push(Box::new(gain_maps));
            }
        }
        if options.linear_gain != 1.0 {
            mosaic_modules.push(Box::new(LinearGain {
                gain: options.linear_gain,
            }));
        }

        let mut image_modules: Vec<Box<dyn PipelineModule>> = vec![Box::new(ColorTransform {
            matrix: camera_to_prophoto(tags, options)?,
        })];
        if options.tone_curve_enabled {
            image_modules.push(Box::new(ToneCurve::from_tags(tags)?));
        }
        image_modules.push(Box::new(OutputTransform {
            matrix: color_matrix::prophoto_to_linear_srgb()?,
        }));
        if options.hue_sat_map_enabled {
            if let Some(map) = HueSatMap::from_tags(tags)? {
                image_modules.push(Box::new(map));
            }
        }
        if options.auto_white_balance_enabled {
            image_modules.push(Box::new(AutoWhiteBalance {}));
        }
        image_modules.push(Box::new(Gamma::new(options.gamma_curve)?));
        if options.sharpen_enabled {
            image_modules.push(Box::new(Sharpen {
                amount: options.sharpen_amount,
            }));
        }
        if options.color_enhancement_enabled {
            image_modules.push(Box::new(ColorEnhancement::new(options.saturation, options.contrast)));
        }
        if options.hist_eq_enabled {
            image_modules.push(Box::new(HistogramEqualization {
                fraction: options.hist_eq_fraction,
            }));
        }

        Ok(Self {
            mosaic_modules,
            image_modules,
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mosaic = self.mosaic_modules.iter().map(|m| m.get_name());
        let image = self.image_modules.iter().map(|m| m.get_name());
        mosaic.chain(std::iter::once("Demosaic".to_string())).chain(image).collect()
    }

    pub fn run(&self, mut mosaic: Mosaic) -> Result<DevelopedImage> {
        for module in &self.mosaic_modules {
            let now = Instant::now();
            mosaic = module.process(mosaic)?;
            info!("{:} execution time: {:.2?}", module.get_name(), now.elapsed());
        }

        let now = Instant::now();
        let mut image = demosaic(&mosaic)?;
        info!("Demosaic execution time: {:.2?}", now.elapsed());

        for module in &self.image_modules {
            let now = Instant::now();
            image = module.process(image)?;
            info!("{:} execution time: {:.2?}", module.get_name(), now.elapsed());
        }
        Ok(image)
    }
}

/// Develops one CFA frame described by `tags` into display-referred RGB.
#[instrument(skip_all)]
pub fn develop(tags: &Tags, data: &[u16], options: &PipelineOptions) -> Result<DevelopedImage> {
    options.validate()?;
    let frame = RawFrame::from_tags(tags, data)?;
    debug!(
        "{}x{} frame, {} bits, {} pattern, orientation {}",
        frame.width,
        frame.height,
        frame.bits_per_sample,
        frame.cfa,
        frame.orientation.code()
    );

    let pipeline = Pipeline::new(tags, frame.bits_per_sample, options)?;

    let now = Instant::now();
    let mosaic = extract(&frame)?;
    info!("Extract execution time: {:.2?}", now.elapsed());

    pipeline.run(mosaic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Tags {
        Tags::new()
            .with("ImageWidth", 8u32)
            .with("ImageLength", 8u32)
            .with("CFAPattern", "RGGB")
            .with("WhiteLevel", 1000u32)
            .with("ColorMatrix1", vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn test_default_module_order() {
        let pipeline = Pipeline::new(&tags(), 16, &PipelineOptions::default()).unwrap();
        assert_eq!(
            pipeline.names(),
            vec!["BlackWhiteLevels", "Demosaic", "ColorTransform", "ToneCurve", "OutputTransform", "Gamma"]
        );
    }

    #[test]
    fn test_everything_enabled() {
        let options = PipelineOptions {
            raw_denoise_enabled: true,
            wavelet_denoise_enabled: true,
            linear_gain: 2.0,
            sharpen_enabled: true,
            hist_eq_enabled: true,
            color_enhancement_enabled: true,
            auto_white_balance_enabled: true,
            ..Default::default()
        };
        let tags = tags()
            .with("LinearizationTable", vec![0u16, 1, 2])
            .with("ProfileHueSatMapDims", vec![1u32, 1, 1])
            .with("ProfileHueSatMapData1", vec![0.0, 1.0, 1.0]);
        let pipeline = Pipeline::new(&tags, 16, &options).unwrap();
        assert_eq!(
            pipeline.names(),
            vec![
                "Linearize",
                "BlackWhiteLevels",
                "RawNlm",
                "WaveletDenoise",
                "LinearGain",
                "Demosaic",
                "ColorTransform",
                "ToneCurve",
                "OutputTransform",
                "HueSatMap",
                "AutoWhiteBalance",
                "Gamma",
                "Sharpen",
                "ColorEnhancement",
                "HistogramEqualization",
            ]
        );

        let skipped = PipelineOptions {
            linearization_skip: true,
            tone_curve_enabled: false,
            hue_sat_map_enabled: false,
            ..Default::default()
        };
        let names = Pipeline::new(&tags, 16, &skipped).unwrap().names();
        assert!(!names.contains(&"Linearize".to_string()));
        assert!(!names.contains(&"ToneCurve".to_string()));
        assert!(!names.contains(&"HueSatMap".to_string()));
    }

    #[test]
    fn test_custom_matrix_and_chroma_scale() {
        let options = PipelineOptions {
            custom_color_matrix: Some(vec![vec![2.0, 0.0, 0.0], vec![0.0, 2.0, 0.0], vec![0.0, 0.0, 2.0]]),
            chroma_scale: Some([1.0, 1.0]),
            ..Default::default()
        };
        // no ColorMatrix1 needed once a custom matrix is given
        let tags = Tags::new();
        let matrix = camera_to_prophoto(&tags, &options).unwrap();
        assert!((matrix - Matrix3::identity() * 2.0).norm() < 1e-9);
    }
}
