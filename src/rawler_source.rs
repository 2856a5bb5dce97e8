//! Container decoding: turns a `rawler` image into the tag set and sample
//! buffer a develop call consumes.

use std::path::Path;

use rawler::imgop::xyz::Illuminant;
use rawler::{RawImage, RawImageData};
use tracing::{debug, warn};

use crate::error::{DevelopError, Result};
use crate::tags::Tags;

/// EXIF light source codes for the calibrations rawler exposes.
const CALIBRATIONS: [(Illuminant, u32); 2] = [(Illuminant::A, 17), (Illuminant::D65, 21)];

pub fn decode_file(path: impl AsRef<Path>) -> Result<(Tags, Vec<u16>)> {
    let raw_image = rawler::decode_file(path.as_ref()).map_err(|e| DevelopError::Decode(e.to_string()))?;
    from_raw_image(raw_image)
}

fn orientation_code(orientation: rawler::Orientation) -> u32 {
    match orientation {
        rawler::Orientation::Rotate180 => 3,
        rawler::Orientation::Rotate90 => 6,
        rawler::Orientation::Rotate270 => 8,
        _ => 1,
    }
}

pub fn from_raw_image(raw_image: RawImage) -> Result<(Tags, Vec<u16>)> {
    let dim = raw_image.dim();
    let mut tags = Tags::new()
        .with("ImageWidth", dim.w)
        .with("ImageLength", dim.h)
        .with("SamplesPerPixel", raw_image.cpp)
        .with("Orientation", orientation_code(raw_image.orientation))
        .with("CFAPattern", raw_image.camera.cfa.to_string())
        .with("BlackLevelRepeatDim", vec![2u32, 2])
        .with("BlackLevel", raw_image.blacklevel.as_bayer_array().to_vec())
        .with("WhiteLevel", raw_image.whitelevel.as_bayer_array()[0]);

    if let Some(crop) = raw_image.crop_area {
        tags.insert(
            "ActiveArea",
            vec![crop.p.y, crop.p.x, crop.p.y + crop.d.h, crop.p.x + crop.d.w]
                .into_iter()
                .map(|v| v as u32)
                .collect::<Vec<u32>>(),
        );
    }

    let mut slot = 1;
    for (illuminant, code) in CALIBRATIONS {
        if let Some(matrix) = raw_image.camera.color_matrix.get(&illuminant) {
            if matrix.len() < 9 {
                warn!("skipping {:?} colour matrix with {} values", illuminant, matrix.len());
                continue;
            }
            let (matrix_tag, illuminant_tag) = if slot == 1 {
                ("ColorMatrix1", "CalibrationIlluminant1")
            } else {
                ("ColorMatrix2", "CalibrationIlluminant2")
            };
            tags.insert(matrix_tag, matrix[..9].to_vec());
            tags.insert(illuminant_tag, code);
            slot += 1;
        }
    }

    // rawler reports white balance multipliers, the reciprocal of the neutral
    let [r, g, b, _] = raw_image.wb_coeffs;
    if [r, g, b].iter().all(|c| c.is_finite() && *c > 0.0) {
        tags.insert("AsShotNeutral", vec![g / r, 1.0, g / b]);
    }

    let data = match raw_image.data {
        RawImageData::Integer(data) => data,
        _ => return Err(DevelopError::Decode("floating point raw data is not supported".to_string())),
    };
    debug!("decoded {}x{} raw with {} samples", dim.w, dim.h, data.len());
    Ok((tags, data))
}
